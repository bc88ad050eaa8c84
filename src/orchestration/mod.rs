//! Transaction lifecycle orchestration.
//!
//! The orchestrator composes screening, theft verification, settlement and
//! the notification outbox into the escrow state machine.

pub mod error;
pub mod model;
pub mod orchestrator;

pub use error::GatewayError;
pub use model::{
    FundingReceipt, FundingReference, GlobalStats, HandoverReceipt, NewTransaction,
    TransactionView,
};
pub use orchestrator::{TransactionOrchestrator, OVERRIDE_LOG_TARGET};
