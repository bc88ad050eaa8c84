//! Settlement operations for the repository.

use crate::domain::{AuditRecord, Settlement, TimeMs};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{parse_decimal, parse_enum, Repository};

const SETTLEMENT_COLUMNS: &str = r#"
    transaction_id, amount, platform_fee, seller_payout, add_ons_total, tracking_key, status,
    created_at, updated_at
"#;

fn settlement_from_row(row: &SqliteRow) -> Result<Settlement, sqlx::Error> {
    Ok(Settlement {
        transaction_id: row.get("transaction_id"),
        amount: parse_decimal(row.get("amount"), "amount")?,
        platform_fee: parse_decimal(row.get("platform_fee"), "platform_fee")?,
        seller_payout: parse_decimal(row.get("seller_payout"), "seller_payout")?,
        add_ons_total: parse_decimal(row.get("add_ons_total"), "add_ons_total")?,
        tracking_key: row.get("tracking_key"),
        status: parse_enum(row.get::<&str, _>("status"))?,
        created_at: TimeMs::new(row.get("created_at")),
        updated_at: TimeMs::new(row.get("updated_at")),
    })
}

impl Repository {
    /// Move a transaction `PENDING → IN_VAULT` and record its deposit in one
    /// SQL transaction.
    ///
    /// Returns `None` and writes nothing unless the transaction is `PENDING`
    /// with compliance `APPROVED`. A settlement left over from an earlier
    /// funding is kept as is and returned; the audit record is only written
    /// with a new settlement.
    pub async fn fund_transaction(
        &self,
        settlement: &Settlement,
        audit: &AuditRecord,
    ) -> Result<Option<Settlement>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'IN_VAULT', updated_at = ?
            WHERE id = ? AND status = 'PENDING' AND compliance_status = 'APPROVED'
            "#,
        )
        .bind(settlement.created_at.as_ms())
        .bind(settlement.transaction_id.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO settlements (
                transaction_id, amount, platform_fee, seller_payout, add_ons_total,
                tracking_key, status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(transaction_id) DO NOTHING
            "#,
        )
        .bind(settlement.transaction_id.as_str())
        .bind(settlement.amount.to_canonical_string())
        .bind(settlement.platform_fee.to_canonical_string())
        .bind(settlement.seller_payout.to_canonical_string())
        .bind(settlement.add_ons_total.to_canonical_string())
        .bind(settlement.tracking_key.as_str())
        .bind(settlement.status.as_str())
        .bind(settlement.created_at.as_ms())
        .bind(settlement.updated_at.as_ms())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() > 0 {
            Self::insert_audit_in(&mut tx, audit).await?;
        }

        let sql = format!(
            "SELECT {} FROM settlements WHERE transaction_id = ?",
            SETTLEMENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(settlement.transaction_id.as_str())
            .fetch_one(&mut *tx)
            .await?;
        let stored = settlement_from_row(&row)?;

        tx.commit().await?;
        Ok(Some(stored))
    }

    pub async fn get_settlement(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Settlement>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM settlements WHERE transaction_id = ?",
            SETTLEMENT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(settlement_from_row).transpose()
    }
}
