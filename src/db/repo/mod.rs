//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `mod.rs` - Transactions, add-on orders and vehicles
//! - `profiles.rs` - Risk profile cache and KYC state
//! - `settlements.rs` - Escrow deposits and splits
//! - `audit.rs` - Append-only audit records
//! - `tickets.rs` - Service tickets and their payment ledger
//! - `outbox.rs` - Notification outbox

mod audit;
mod outbox;
mod profiles;
mod settlements;
mod tickets;

pub use outbox::OutboxRow;

use crate::domain::{
    AddOnCosts, AddOnKind, AddOnOrder, AuditRecord, ComplianceStatus, Decimal, TimeMs,
    Transaction, TransactionStatus, Vehicle, VehicleState,
};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

/// Repository for database operations.
#[derive(Debug)]
pub struct Repository {
    pool: SqlitePool,
}

/// Minimal projection used for the global rollups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalStatsRow {
    pub status: TransactionStatus,
    pub price: Decimal,
}

pub(crate) fn decode_err(message: String) -> sqlx::Error {
    sqlx::Error::Decode(message.into())
}

pub(crate) fn parse_decimal(raw: &str, column: &str) -> Result<Decimal, sqlx::Error> {
    Decimal::from_str(raw).map_err(|e| decode_err(format!("{}: {}", column, e)))
}

pub(crate) fn parse_enum<T: FromStr<Err = String>>(raw: &str) -> Result<T, sqlx::Error> {
    T::from_str(raw).map_err(decode_err)
}

const TRANSACTION_COLUMNS: &str = r#"
    id, vehicle_id, vehicle_vin, buyer_id, seller_id, seller_tax_regime, price,
    insurance_cost, logistics_cost, warranty_cost, gestoria_cost,
    status, compliance_status, requires_regulatory_notice, risk_snapshot,
    checkout_session_id, handover_token_digest, handover_consumed_at,
    created_at, updated_at
"#;

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction, sqlx::Error> {
    let snapshot_json: String = row.get("risk_snapshot");
    let risk_snapshot = serde_json::from_str(&snapshot_json)
        .map_err(|e| decode_err(format!("risk_snapshot: {}", e)))?;

    Ok(Transaction {
        id: row.get("id"),
        vehicle_id: row.get("vehicle_id"),
        vehicle_vin: row.get("vehicle_vin"),
        buyer_id: row.get("buyer_id"),
        seller_id: row.get("seller_id"),
        seller_tax_regime: parse_enum(row.get::<&str, _>("seller_tax_regime"))?,
        price: parse_decimal(row.get("price"), "price")?,
        add_ons: AddOnCosts {
            insurance: parse_decimal(row.get("insurance_cost"), "insurance_cost")?,
            logistics: parse_decimal(row.get("logistics_cost"), "logistics_cost")?,
            warranty: parse_decimal(row.get("warranty_cost"), "warranty_cost")?,
            gestoria: parse_decimal(row.get("gestoria_cost"), "gestoria_cost")?,
        },
        status: parse_enum(row.get::<&str, _>("status"))?,
        compliance_status: parse_enum(row.get::<&str, _>("compliance_status"))?,
        requires_regulatory_notice: row.get::<i64, _>("requires_regulatory_notice") != 0,
        risk_snapshot,
        checkout_session_id: row.get("checkout_session_id"),
        handover_token_digest: row.get("handover_token_digest"),
        handover_consumed_at: row
            .get::<Option<i64>, _>("handover_consumed_at")
            .map(TimeMs::new),
        created_at: TimeMs::new(row.get("created_at")),
        updated_at: TimeMs::new(row.get("updated_at")),
    })
}

async fn upsert_add_on_orders(
    conn: &mut sqlx::SqliteConnection,
    transaction_id: &str,
    add_ons: &AddOnCosts,
    now: TimeMs,
) -> Result<(), sqlx::Error> {
    for (kind, amount) in add_ons.entries() {
        if amount.is_zero() {
            sqlx::query("DELETE FROM addon_orders WHERE transaction_id = ? AND kind = ?")
                .bind(transaction_id)
                .bind(kind.as_str())
                .execute(&mut *conn)
                .await?;
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO addon_orders (transaction_id, kind, amount, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(transaction_id, kind) DO UPDATE SET
                amount = excluded.amount,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(transaction_id)
        .bind(kind.as_str())
        .bind(amount.to_canonical_string())
        .bind(now.as_ms())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // =========================================================================
    // Transaction operations
    // =========================================================================

    /// Persist a new transaction together with its add-on orders, vehicle
    /// reservation and creation audit record, all or nothing.
    ///
    /// # Errors
    /// Returns an error if any statement fails; nothing is written then.
    pub async fn insert_transaction(
        &self,
        transaction: &Transaction,
        audit: &AuditRecord,
    ) -> Result<(), sqlx::Error> {
        let snapshot = serde_json::to_string(&transaction.risk_snapshot)
            .map_err(|e| decode_err(format!("risk_snapshot: {}", e)))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, vehicle_id, vehicle_vin, buyer_id, seller_id, seller_tax_regime, price,
                insurance_cost, logistics_cost, warranty_cost, gestoria_cost,
                status, compliance_status, requires_regulatory_notice, risk_snapshot,
                checkout_session_id, handover_token_digest, handover_consumed_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.as_str())
        .bind(transaction.vehicle_id.as_str())
        .bind(transaction.vehicle_vin.as_str())
        .bind(transaction.buyer_id.as_str())
        .bind(transaction.seller_id.as_str())
        .bind(transaction.seller_tax_regime.as_str())
        .bind(transaction.price.to_canonical_string())
        .bind(transaction.add_ons.insurance.to_canonical_string())
        .bind(transaction.add_ons.logistics.to_canonical_string())
        .bind(transaction.add_ons.warranty.to_canonical_string())
        .bind(transaction.add_ons.gestoria.to_canonical_string())
        .bind(transaction.status.as_str())
        .bind(transaction.compliance_status.as_str())
        .bind(i64::from(transaction.requires_regulatory_notice))
        .bind(snapshot)
        .bind(transaction.checkout_session_id.as_deref())
        .bind(transaction.handover_token_digest.as_deref())
        .bind(transaction.handover_consumed_at.map(|t| t.as_ms()))
        .bind(transaction.created_at.as_ms())
        .bind(transaction.updated_at.as_ms())
        .execute(&mut *tx)
        .await?;

        upsert_add_on_orders(
            &mut tx,
            &transaction.id,
            &transaction.add_ons,
            transaction.created_at,
        )
        .await?;

        sqlx::query(
            r#"
            INSERT INTO vehicles (id, vin, owner_id, state, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                vin = excluded.vin,
                state = excluded.state,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(transaction.vehicle_id.as_str())
        .bind(transaction.vehicle_vin.as_str())
        .bind(transaction.seller_id.as_str())
        .bind(VehicleState::Reserved.as_str())
        .bind(transaction.created_at.as_ms())
        .execute(&mut *tx)
        .await?;

        Self::insert_audit_in(&mut tx, audit).await?;

        tx.commit().await
    }

    pub async fn get_transaction(&self, id: &str) -> Result<Option<Transaction>, sqlx::Error> {
        let sql = format!("SELECT {} FROM transactions WHERE id = ?", TRANSACTION_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    pub async fn find_by_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<Transaction>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE checkout_session_id = ?",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    /// Correlate a card checkout session with a pending transaction.
    pub async fn set_checkout_session(
        &self,
        id: &str,
        session_id: &str,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET checkout_session_id = ?, updated_at = ?
            WHERE id = ? AND status = 'PENDING'
            "#,
        )
        .bind(session_id)
        .bind(now.as_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the add-on cost fields and resync the linked orders.
    ///
    /// Returns false unless the transaction is `PENDING`; once funded the
    /// deposit is fixed.
    pub async fn update_add_ons(
        &self,
        id: &str,
        add_ons: &AddOnCosts,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET insurance_cost = ?, logistics_cost = ?, warranty_cost = ?, gestoria_cost = ?,
                updated_at = ?
            WHERE id = ? AND status = 'PENDING'
            "#,
        )
        .bind(add_ons.insurance.to_canonical_string())
        .bind(add_ons.logistics.to_canonical_string())
        .bind(add_ons.warranty.to_canonical_string())
        .bind(add_ons.gestoria.to_canonical_string())
        .bind(now.as_ms())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        upsert_add_on_orders(&mut tx, id, add_ons, now).await?;
        tx.commit().await?;
        Ok(true)
    }

    pub async fn list_add_on_orders(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<AddOnOrder>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT transaction_id, kind, amount, updated_at
            FROM addon_orders
            WHERE transaction_id = ?
            ORDER BY kind ASC
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let kind = match row.get::<&str, _>("kind") {
                    "INSURANCE" => AddOnKind::Insurance,
                    "LOGISTICS" => AddOnKind::Logistics,
                    "WARRANTY" => AddOnKind::Warranty,
                    "GESTORIA" => AddOnKind::Gestoria,
                    other => return Err(decode_err(format!("unknown add-on kind: {}", other))),
                };
                Ok(AddOnOrder {
                    transaction_id: row.get("transaction_id"),
                    kind,
                    amount: parse_decimal(row.get("amount"), "amount")?,
                    updated_at: TimeMs::new(row.get("updated_at")),
                })
            })
            .collect()
    }

    /// Set the compliance sub-state, optionally with an audit record.
    pub async fn set_compliance_status(
        &self,
        id: &str,
        status: ComplianceStatus,
        now: TimeMs,
        audit: Option<&AuditRecord>,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE transactions SET compliance_status = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(now.as_ms())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        if let Some(audit) = audit {
            Self::insert_audit_in(&mut tx, audit).await?;
        }
        tx.commit().await?;
        Ok(true)
    }

    /// Store the digest of a freshly issued handover token.
    pub async fn set_handover_token(
        &self,
        id: &str,
        digest: &str,
        now: TimeMs,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET handover_token_digest = ?, updated_at = ?
            WHERE id = ? AND status = 'IN_VAULT' AND handover_consumed_at IS NULL
            "#,
        )
        .bind(digest)
        .bind(now.as_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Consume a handover token and release the escrow in one step.
    ///
    /// Returns false (and writes nothing) unless the transaction is
    /// `IN_VAULT`, the digest matches, and the token was never consumed.
    pub async fn release_with_token(
        &self,
        id: &str,
        digest: &str,
        now: TimeMs,
        audit: &AuditRecord,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = 'RELEASED', handover_consumed_at = ?, updated_at = ?
            WHERE id = ?
              AND status = 'IN_VAULT'
              AND handover_token_digest = ?
              AND handover_consumed_at IS NULL
            "#,
        )
        .bind(now.as_ms())
        .bind(now.as_ms())
        .bind(id)
        .bind(digest)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE settlements SET status = 'DISBURSED', updated_at = ?
            WHERE transaction_id = ? AND status = 'HELD'
            "#,
        )
        .bind(now.as_ms())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE vehicles
            SET state = 'SOLD',
                owner_id = (SELECT buyer_id FROM transactions WHERE id = ?),
                updated_at = ?
            WHERE id = (SELECT vehicle_id FROM transactions WHERE id = ?)
            "#,
        )
        .bind(id)
        .bind(now.as_ms())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        Self::insert_audit_in(&mut tx, audit).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Cancel a non-terminal transaction, refunding any held deposit and
    /// returning the vehicle to the listing.
    pub async fn cancel_transaction(
        &self,
        id: &str,
        now: TimeMs,
        audit: &AuditRecord,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE transactions SET status = 'CANCELLED', updated_at = ?
            WHERE id = ? AND status IN ('PENDING', 'IN_VAULT')
            "#,
        )
        .bind(now.as_ms())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE settlements SET status = 'REFUNDED', updated_at = ?
            WHERE transaction_id = ? AND status = 'HELD'
            "#,
        )
        .bind(now.as_ms())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE vehicles SET state = 'LISTED', updated_at = ?
            WHERE id = (SELECT vehicle_id FROM transactions WHERE id = ?) AND state = 'RESERVED'
            "#,
        )
        .bind(now.as_ms())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        Self::insert_audit_in(&mut tx, audit).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Unguarded administrative status change.
    pub async fn override_status(
        &self,
        id: &str,
        status: TransactionStatus,
        now: TimeMs,
        audit: &AuditRecord,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let result =
            sqlx::query("UPDATE transactions SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status.as_str())
                .bind(now.as_ms())
                .bind(id)
                .execute(&mut *tx)
                .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        Self::insert_audit_in(&mut tx, audit).await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Status and price of every transaction, for the global rollups.
    pub async fn query_stats_rows(&self) -> Result<Vec<GlobalStatsRow>, sqlx::Error> {
        let rows = sqlx::query("SELECT status, price FROM transactions ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(GlobalStatsRow {
                    status: parse_enum(row.get::<&str, _>("status"))?,
                    price: parse_decimal(row.get("price"), "price")?,
                })
            })
            .collect()
    }

    // =========================================================================
    // Vehicle operations
    // =========================================================================

    pub async fn get_vehicle(&self, id: &str) -> Result<Option<Vehicle>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, vin, owner_id, state, updated_at FROM vehicles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            Ok(Vehicle {
                id: row.get("id"),
                vin: row.get("vin"),
                owner_id: row.get("owner_id"),
                state: parse_enum(row.get::<&str, _>("state"))?,
                updated_at: TimeMs::new(row.get("updated_at")),
            })
        })
        .transpose()
    }

    pub(crate) async fn insert_audit_in(
        conn: &mut sqlx::SqliteConnection,
        audit: &AuditRecord,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_records (id, kind, subject_id, actor_id, payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(audit.id.as_str())
        .bind(audit.kind.as_str())
        .bind(audit.subject_id.as_str())
        .bind(audit.actor_id.as_str())
        .bind(audit.payload.to_string())
        .bind(audit.created_at.as_ms())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{sample_transaction, seed_transaction, setup_repo};
    use super::*;
    use crate::domain::{AuditKind, Settlement, SettlementStatus};

    fn audit(kind: AuditKind, subject: &str) -> AuditRecord {
        AuditRecord::new(kind, subject, "tester", serde_json::json!({}))
    }

    #[tokio::test]
    async fn test_insert_and_get_transaction() {
        let (repo, _temp) = setup_repo().await;
        let mut transaction = sample_transaction("tx-1");
        transaction.add_ons.logistics = Decimal::from_parts(320050, 2);
        repo.insert_transaction(&transaction, &audit(AuditKind::TransactionCreated, "tx-1"))
            .await
            .unwrap();

        let loaded = repo.get_transaction("tx-1").await.unwrap().unwrap();
        assert_eq!(loaded, transaction);

        let orders = repo.list_add_on_orders("tx-1").await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].kind, AddOnKind::Logistics);

        let vehicle = repo.get_vehicle("veh-tx-1").await.unwrap().unwrap();
        assert_eq!(vehicle.state, VehicleState::Reserved);
        assert_eq!(vehicle.owner_id, "seller-1");
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_nothing_behind() {
        let (repo, _temp) = setup_repo().await;
        seed_transaction(&repo, "tx-1").await;

        // Same audit id twice violates the primary key and aborts the batch.
        let first = audit(AuditKind::TransactionCreated, "tx-2");
        let second = sample_transaction("tx-2");
        repo.insert_audit(&first).await.unwrap();
        assert!(repo.insert_transaction(&second, &first).await.is_err());
        assert!(repo.get_transaction("tx-2").await.unwrap().is_none());
        assert!(repo.get_vehicle("veh-tx-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_add_ons_removes_zeroed_orders() {
        let (repo, _temp) = setup_repo().await;
        seed_transaction(&repo, "tx-1").await;

        let mut add_ons = AddOnCosts {
            warranty: Decimal::whole(4_500),
            insurance: Decimal::whole(1_200),
            ..AddOnCosts::default()
        };
        assert!(repo
            .update_add_ons("tx-1", &add_ons, TimeMs::new(2_000))
            .await
            .unwrap());
        assert_eq!(repo.list_add_on_orders("tx-1").await.unwrap().len(), 2);

        add_ons.insurance = Decimal::zero();
        assert!(repo
            .update_add_ons("tx-1", &add_ons, TimeMs::new(3_000))
            .await
            .unwrap());
        let orders = repo.list_add_on_orders("tx-1").await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].kind, AddOnKind::Warranty);
    }

    fn split_audit() -> AuditRecord {
        audit(AuditKind::SettlementSplit, "tx-1")
    }

    fn held_settlement(id: &str, at: i64) -> Settlement {
        Settlement {
            transaction_id: id.to_string(),
            amount: Decimal::whole(110_000),
            platform_fee: Decimal::whole(4_000),
            seller_payout: Decimal::whole(96_000),
            add_ons_total: Decimal::whole(10_000),
            tracking_key: format!("ESC-TEST-{}", at),
            status: SettlementStatus::Held,
            created_at: TimeMs::new(at),
            updated_at: TimeMs::new(at),
        }
    }

    #[tokio::test]
    async fn test_fund_requires_approved_compliance() {
        let (repo, _temp) = setup_repo().await;
        seed_transaction(&repo, "tx-1").await;
        repo.set_compliance_status("tx-1", ComplianceStatus::BlockedRisk, TimeMs::new(2), None)
            .await
            .unwrap();

        let funded = repo
            .fund_transaction(&held_settlement("tx-1", 3), &split_audit())
            .await
            .unwrap();
        assert!(funded.is_none());
        let loaded = repo.get_transaction("tx-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, TransactionStatus::Pending);
        assert!(repo.get_settlement("tx-1").await.unwrap().is_none());
        assert_eq!(repo.count_audit("tx-1", AuditKind::SettlementSplit).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fund_moves_to_vault_with_settlement() {
        let (repo, _temp) = setup_repo().await;
        seed_transaction(&repo, "tx-1").await;

        let stored = repo
            .fund_transaction(&held_settlement("tx-1", 2), &split_audit())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, held_settlement("tx-1", 2));
        assert_eq!(
            stored.platform_fee + stored.seller_payout + stored.add_ons_total,
            stored.amount
        );
        let loaded = repo.get_transaction("tx-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, TransactionStatus::InVault);
        assert_eq!(repo.get_settlement("tx-1").await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn test_fund_after_cancel_writes_nothing() {
        let (repo, _temp) = setup_repo().await;
        seed_transaction(&repo, "tx-1").await;
        assert!(repo
            .cancel_transaction(
                "tx-1",
                TimeMs::new(2),
                &audit(AuditKind::TransactionCancelled, "tx-1"),
            )
            .await
            .unwrap());

        let funded = repo
            .fund_transaction(&held_settlement("tx-1", 3), &split_audit())
            .await
            .unwrap();
        assert!(funded.is_none());
        let loaded = repo.get_transaction("tx-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, TransactionStatus::Cancelled);
        assert!(repo.get_settlement("tx-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_funding_keeps_first_settlement() {
        let (repo, _temp) = setup_repo().await;
        seed_transaction(&repo, "tx-1").await;
        let first = repo
            .fund_transaction(&held_settlement("tx-1", 2), &split_audit())
            .await
            .unwrap()
            .unwrap();
        assert!(repo
            .override_status(
                "tx-1",
                TransactionStatus::Pending,
                TimeMs::new(3),
                &audit(AuditKind::ManualOverride, "tx-1"),
            )
            .await
            .unwrap());

        let second = repo
            .fund_transaction(&held_settlement("tx-1", 4), &split_audit())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, first);
        assert_eq!(repo.count_audit("tx-1", AuditKind::SettlementSplit).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_add_ons_frozen_once_funded() {
        let (repo, _temp) = setup_repo().await;
        seed_transaction(&repo, "tx-1").await;
        repo.fund_transaction(&held_settlement("tx-1", 2), &split_audit())
            .await
            .unwrap()
            .unwrap();

        let add_ons = AddOnCosts {
            logistics: Decimal::whole(50_000),
            ..AddOnCosts::default()
        };
        assert!(!repo
            .update_add_ons("tx-1", &add_ons, TimeMs::new(3))
            .await
            .unwrap());
        let loaded = repo.get_transaction("tx-1").await.unwrap().unwrap();
        assert_eq!(loaded.add_ons, AddOnCosts::default());
    }

    #[tokio::test]
    async fn test_release_consumes_token_once() {
        let (repo, _temp) = setup_repo().await;
        seed_transaction(&repo, "tx-1").await;
        repo.fund_transaction(&held_settlement("tx-1", 2), &split_audit())
            .await
            .unwrap()
            .unwrap();
        assert!(repo
            .set_handover_token("tx-1", "digest-a", TimeMs::new(3))
            .await
            .unwrap());

        let released = audit(AuditKind::FundsReleased, "tx-1");
        assert!(!repo
            .release_with_token("tx-1", "digest-b", TimeMs::new(4), &released)
            .await
            .unwrap());
        assert!(repo
            .release_with_token("tx-1", "digest-a", TimeMs::new(5), &released)
            .await
            .unwrap());
        let again = audit(AuditKind::FundsReleased, "tx-1");
        assert!(!repo
            .release_with_token("tx-1", "digest-a", TimeMs::new(6), &again)
            .await
            .unwrap());

        let loaded = repo.get_transaction("tx-1").await.unwrap().unwrap();
        assert_eq!(loaded.status, TransactionStatus::Released);
        assert_eq!(loaded.handover_consumed_at, Some(TimeMs::new(5)));
        let stored = repo.get_settlement("tx-1").await.unwrap().unwrap();
        assert_eq!(stored.status, SettlementStatus::Disbursed);
        let vehicle = repo.get_vehicle("veh-tx-1").await.unwrap().unwrap();
        assert_eq!(vehicle.state, VehicleState::Sold);
        assert_eq!(vehicle.owner_id, "buyer-1");
        assert_eq!(repo.count_audit("tx-1", AuditKind::FundsReleased).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancel_relists_vehicle_and_is_terminal() {
        let (repo, _temp) = setup_repo().await;
        seed_transaction(&repo, "tx-1").await;

        let cancelled = audit(AuditKind::TransactionCancelled, "tx-1");
        assert!(repo
            .cancel_transaction("tx-1", TimeMs::new(2), &cancelled)
            .await
            .unwrap());
        let again = audit(AuditKind::TransactionCancelled, "tx-1");
        assert!(!repo
            .cancel_transaction("tx-1", TimeMs::new(3), &again)
            .await
            .unwrap());

        let vehicle = repo.get_vehicle("veh-tx-1").await.unwrap().unwrap();
        assert_eq!(vehicle.state, VehicleState::Listed);
        assert!(!repo
            .update_add_ons("tx-1", &AddOnCosts::default(), TimeMs::new(4))
            .await
            .unwrap());
    }
}
