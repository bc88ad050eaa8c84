//! Simulated escrow deposits and the platform fee / seller payout split.

use crate::db::Repository;
use crate::domain::{
    Actor, AuditKind, AuditRecord, Decimal, Settlement, SettlementStatus, TimeMs, Transaction,
};
use crate::theft::sha256_hex;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("sale price must be positive, got {0}")]
    InvalidAmount(Decimal),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// The two halves of a sale price. `platform_fee + seller_payout` equals the
/// price exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split {
    pub platform_fee: Decimal,
    pub seller_payout: Decimal,
}

/// Fee rounded to cents; the payout takes the remainder so no cent is lost.
pub fn split(price: Decimal, fee_rate: Decimal) -> Split {
    let platform_fee = price.percent_of(fee_rate);
    Split {
        platform_fee,
        seller_payout: price - platform_fee,
    }
}

/// Interbank-style tracking key, stable per transaction.
pub fn tracking_key(transaction_id: &str, at: TimeMs) -> String {
    let date = Utc
        .timestamp_millis_opt(at.as_ms())
        .single()
        .map(|dt| dt.format("%Y%m%d").to_string())
        .unwrap_or_else(|| "00000000".to_string());
    let digest = sha256_hex(transaction_id);
    format!("ESC{}{}", date, digest[..12].to_ascii_uppercase())
}

#[derive(Debug, Clone)]
pub struct SettlementService {
    repo: Arc<Repository>,
    fee_rate: Decimal,
}

impl SettlementService {
    pub fn new(repo: Arc<Repository>, fee_rate: Decimal) -> Self {
        Self { repo, fee_rate }
    }

    /// Record the buyer's deposit and move the transaction into the vault,
    /// together or not at all.
    ///
    /// The deposit is the price plus add-ons. Only the price is split
    /// between fee and payout. Returns `None` when the transaction is no
    /// longer fundable; a settlement already on file is returned unchanged.
    pub async fn simulate_incoming_deposit(
        &self,
        transaction: &Transaction,
    ) -> Result<Option<Settlement>, SettlementError> {
        if !transaction.price.is_positive() {
            return Err(SettlementError::InvalidAmount(transaction.price));
        }

        let now = TimeMs::now();
        let add_ons_total = transaction.add_ons.total();
        let Split {
            platform_fee,
            seller_payout,
        } = split(transaction.price, self.fee_rate);
        let settlement = Settlement {
            transaction_id: transaction.id.clone(),
            amount: transaction.deposit_amount(),
            platform_fee,
            seller_payout,
            add_ons_total,
            tracking_key: tracking_key(&transaction.id, now),
            status: SettlementStatus::Held,
            created_at: now,
            updated_at: now,
        };

        let audit = AuditRecord::new(
            AuditKind::SettlementSplit,
            transaction.id.as_str(),
            Actor::system().id,
            serde_json::json!({
                "amount": settlement.amount,
                "platformFee": platform_fee,
                "sellerPayout": seller_payout,
                "addOnsTotal": add_ons_total,
                "feeRate": self.fee_rate,
                "trackingKey": settlement.tracking_key,
            }),
        );

        let stored = match self.repo.fund_transaction(&settlement, &audit).await? {
            Some(stored) => stored,
            None => return Ok(None),
        };
        info!(
            "Deposit held for tx={} amount={} fee={} payout={} add_ons={} key={}",
            transaction.id,
            stored.amount,
            stored.platform_fee,
            stored.seller_payout,
            stored.add_ons_total,
            stored.tracking_key
        );
        Ok(Some(stored))
    }

    pub async fn get(&self, transaction_id: &str) -> Result<Option<Settlement>, SettlementError> {
        Ok(self.repo.get_settlement(transaction_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::{sample_transaction, seed_transaction, setup_repo};
    use crate::domain::{AddOnCosts, TransactionStatus};

    #[test]
    fn test_split_four_percent() {
        let parts = split(Decimal::whole(100_000), Decimal::from_parts(4, 2));
        assert_eq!(parts.platform_fee, Decimal::whole(4_000));
        assert_eq!(parts.seller_payout, Decimal::whole(96_000));
    }

    #[test]
    fn test_split_sums_exactly_with_rounding() {
        let amount = Decimal::from_parts(1_234_567, 2);
        let parts = split(amount, Decimal::from_parts(4, 2));
        assert_eq!(parts.platform_fee, Decimal::from_parts(49_383, 2));
        assert_eq!(parts.platform_fee + parts.seller_payout, amount);
    }

    #[test]
    fn test_tracking_key_shape() {
        let key = tracking_key("tx-1", TimeMs::new(1_700_000_000_000));
        assert!(key.starts_with("ESC20231114"));
        assert_eq!(key.len(), 3 + 8 + 12);
        assert_eq!(key, tracking_key("tx-1", TimeMs::new(1_700_000_000_000)));
    }

    #[tokio::test]
    async fn test_deposit_is_audited_once() {
        let (repo, _temp) = setup_repo().await;
        let transaction = seed_transaction(&repo, "tx-1").await;
        let service = SettlementService::new(repo.clone(), Decimal::from_parts(4, 2));

        let first = service
            .simulate_incoming_deposit(&transaction)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.amount, Decimal::whole(100_000));
        assert_eq!(first.status, SettlementStatus::Held);

        // Already in the vault: nothing new is written.
        assert!(service
            .simulate_incoming_deposit(&transaction)
            .await
            .unwrap()
            .is_none());
        assert_eq!(service.get("tx-1").await.unwrap(), Some(first));
        assert_eq!(
            repo.count_audit("tx-1", AuditKind::SettlementSplit)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_add_ons_are_held_outside_the_split() {
        let (repo, _temp) = setup_repo().await;
        let mut transaction = sample_transaction("tx-1");
        transaction.add_ons = AddOnCosts {
            logistics: Decimal::whole(10_000),
            ..AddOnCosts::default()
        };
        repo.insert_transaction(
            &transaction,
            &AuditRecord::new(
                AuditKind::TransactionCreated,
                "tx-1",
                "buyer-1",
                serde_json::json!({}),
            ),
        )
        .await
        .unwrap();
        let service = SettlementService::new(repo.clone(), Decimal::from_parts(4, 2));

        let settlement = service
            .simulate_incoming_deposit(&transaction)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(settlement.amount, Decimal::whole(110_000));
        assert_eq!(settlement.platform_fee, Decimal::whole(4_000));
        assert_eq!(settlement.seller_payout, Decimal::whole(96_000));
        assert_eq!(settlement.add_ons_total, Decimal::whole(10_000));
        assert_eq!(
            settlement.platform_fee + settlement.seller_payout + settlement.add_ons_total,
            settlement.amount
        );
    }

    #[tokio::test]
    async fn test_non_positive_price_rejected() {
        let (repo, _temp) = setup_repo().await;
        let mut transaction = seed_transaction(&repo, "tx-1").await;
        transaction.price = Decimal::zero();
        let service = SettlementService::new(repo.clone(), Decimal::from_parts(4, 2));
        let err = service
            .simulate_incoming_deposit(&transaction)
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::InvalidAmount(_)));
        assert!(repo.get_settlement("tx-1").await.unwrap().is_none());
        let stored = repo.get_transaction("tx-1").await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
    }
}
