pub mod api;
pub mod calc;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod orchestration;
pub mod screening;
pub mod settlement;
pub mod theft;

pub use config::{ComplianceThresholds, Config};
pub use db::{init_db, Repository};
pub use domain::{
    Actor, AddOnCosts, ComplianceStatus, Decimal, PartyIdentity, Role, TimeMs, Transaction,
    TransactionStatus,
};
pub use error::AppError;
pub use orchestration::{GatewayError, TransactionOrchestrator};
