//! Read-time totals of a transaction. Never persisted.

use crate::calc::fiscal::{calculate_fiscal_impact, AssetCategory, FiscalImpact, FiscalRules};
use crate::domain::{Decimal, Transaction};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionTotals {
    pub base_price: Decimal,
    pub add_ons_total: Decimal,
    /// What the buyer pays into the vault.
    pub grand_total: Decimal,
    pub fiscal: FiscalImpact,
}

pub fn compute_totals(transaction: &Transaction, rules: &FiscalRules) -> TransactionTotals {
    let add_ons_total = transaction.add_ons.total();
    TransactionTotals {
        base_price: transaction.price,
        add_ons_total,
        grand_total: transaction.price + add_ons_total,
        fiscal: calculate_fiscal_impact(
            transaction.price,
            transaction.seller_tax_regime,
            AssetCategory::Vehicle,
            true,
            rules,
        ),
    }
}
