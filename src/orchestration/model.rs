//! Inputs and read models of the transaction orchestrator.

use crate::calc::TransactionTotals;
use crate::domain::{
    AddOnCosts, AddOnOrder, Decimal, PartyIdentity, Settlement, TaxRegime, Transaction,
    TransactionStatus,
};
use crate::settlement::split;
use crate::theft::TheftCertificate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A negotiated deal ready to be opened.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub vehicle_id: String,
    pub vehicle_vin: String,
    pub buyer_id: String,
    pub seller: PartyIdentity,
    #[serde(default)]
    pub seller_tax_regime: TaxRegime,
    pub price: Decimal,
    #[serde(default)]
    pub add_ons: AddOnCosts,
}

/// How a funding confirmation locates its transaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FundingReference {
    Transaction(String),
    /// Card checkout session correlated earlier via `attach_checkout_session`.
    CheckoutSession(String),
}

impl FundingReference {
    pub fn as_str(&self) -> &str {
        match self {
            FundingReference::Transaction(id) | FundingReference::CheckoutSession(id) => id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingReceipt {
    pub transaction: Transaction,
    pub settlement: Settlement,
    pub certificate: TheftCertificate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoverReceipt {
    pub transaction: Transaction,
    pub seller_payout: Decimal,
}

/// A transaction with everything derived at read time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub totals: TransactionTotals,
    pub add_on_orders: Vec<AddOnOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement: Option<Settlement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    /// Sum of prices of non-cancelled transactions.
    pub gmv: Decimal,
    /// Sum of prices currently held in escrow.
    pub vault_value: Decimal,
    /// Platform fee of each non-cancelled transaction, split from the price
    /// exactly as the settlement does. Add-ons carry no fee.
    pub commission: Decimal,
    pub transaction_count: u64,
    pub by_status: BTreeMap<String, u64>,
}

impl GlobalStats {
    /// Roll up `(status, price)` pairs.
    pub fn from_rows<I>(rows: I, fee_rate: Decimal) -> Self
    where
        I: IntoIterator<Item = (TransactionStatus, Decimal)>,
    {
        let mut stats = GlobalStats {
            gmv: Decimal::zero(),
            vault_value: Decimal::zero(),
            commission: Decimal::zero(),
            transaction_count: 0,
            by_status: BTreeMap::new(),
        };
        for (status, price) in rows {
            stats.transaction_count += 1;
            *stats
                .by_status
                .entry(status.as_str().to_string())
                .or_insert(0) += 1;
            if status == TransactionStatus::Cancelled {
                continue;
            }
            stats.gmv += price;
            stats.commission += split(price, fee_rate).platform_fee;
            if status == TransactionStatus::InVault {
                stats.vault_value += price;
            }
        }
        stats
    }
}
