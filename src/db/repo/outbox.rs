//! Notification outbox operations for the repository.

use crate::domain::{Notification, TimeMs};
use sqlx::Row;

use super::{parse_enum, Repository};

/// An undelivered outbox row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxRow {
    pub notification: Notification,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: TimeMs,
}

impl Repository {
    pub async fn insert_notification(
        &self,
        notification: &Notification,
        now: TimeMs,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO outbox (id, user_id, title, message, kind, link, attempts, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(notification.id.as_str())
        .bind(notification.user_id.as_str())
        .bind(notification.title.as_str())
        .bind(notification.message.as_str())
        .bind(notification.kind.as_str())
        .bind(notification.link.as_deref())
        .bind(now.as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Undelivered rows with fewer than `max_attempts` attempts, oldest first.
    pub async fn pending_notifications(
        &self,
        limit: u32,
        max_attempts: u32,
    ) -> Result<Vec<OutboxRow>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, message, kind, link, attempts, last_error, created_at
            FROM outbox
            WHERE delivered_at IS NULL AND attempts < ?
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(i64::from(max_attempts))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let attempts: i64 = row.get("attempts");
                Ok(OutboxRow {
                    notification: Notification {
                        id: row.get("id"),
                        user_id: row.get("user_id"),
                        title: row.get("title"),
                        message: row.get("message"),
                        kind: parse_enum(row.get::<&str, _>("kind"))?,
                        link: row.get("link"),
                    },
                    attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
                    last_error: row.get("last_error"),
                    created_at: TimeMs::new(row.get("created_at")),
                })
            })
            .collect()
    }

    pub async fn mark_delivered(&self, id: &str, now: TimeMs) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE outbox SET delivered_at = ?, attempts = attempts + 1, last_error = NULL
            WHERE id = ? AND delivered_at IS NULL
            "#,
        )
        .bind(now.as_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_delivery_failure(&self, id: &str, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE outbox SET attempts = attempts + 1, last_error = ? WHERE id = ?")
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of rows for a user that have not been delivered yet.
    pub async fn count_undelivered(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM outbox WHERE user_id = ? AND delivered_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }
}
