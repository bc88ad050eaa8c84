//! Append-only audit record operations for the repository.

use crate::domain::{AuditKind, AuditRecord, TimeMs};
use sqlx::Row;

use super::{decode_err, parse_enum, Repository};

impl Repository {
    /// Append an audit record.
    pub async fn insert_audit(&self, audit: &AuditRecord) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_audit_in(&mut conn, audit).await
    }

    /// All audit records for a subject, oldest first.
    pub async fn query_audit(&self, subject_id: &str) -> Result<Vec<AuditRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, kind, subject_id, actor_id, payload, created_at
            FROM audit_records
            WHERE subject_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let payload: String = row.get("payload");
                Ok(AuditRecord {
                    id: row.get("id"),
                    kind: parse_enum(row.get::<&str, _>("kind"))?,
                    subject_id: row.get("subject_id"),
                    actor_id: row.get("actor_id"),
                    payload: serde_json::from_str(&payload)
                        .map_err(|e| decode_err(format!("payload: {}", e)))?,
                    created_at: TimeMs::new(row.get("created_at")),
                })
            })
            .collect()
    }

    /// Number of audit records of a kind for a subject.
    pub async fn count_audit(
        &self,
        subject_id: &str,
        kind: AuditKind,
    ) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM audit_records WHERE subject_id = ? AND kind = ?",
        )
        .bind(subject_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }
}
