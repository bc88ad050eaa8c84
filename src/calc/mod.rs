//! Pure pricing calculators: fiscal impact, shipping, warranty and totals.
//!
//! None of these touch storage; the orchestrator persists a chosen option.

pub mod fiscal;
pub mod shipping;
pub mod totals;
pub mod warranty;

pub use fiscal::{calculate_fiscal_impact, AssetCategory, FiscalImpact, FiscalRules, PldAlerts};
pub use shipping::{quote_shipping, ShippingOption, ShippingQuote, ShippingTier};
pub use totals::{compute_totals, TransactionTotals};
pub use warranty::{quote_warranty, WarrantyOption, WarrantyPlan, WarrantyQuote};
