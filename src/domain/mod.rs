//! Domain types for the escrow transaction gateway.
//!
//! This module provides:
//! - Lossless money handling via the Decimal wrapper
//! - Domain primitives: TimeMs, Actor, Role
//! - The Transaction aggregate and its status machines
//! - Risk verdicts/profiles, service tickets, settlements and audit records
//! - Notifications queued through the outbox

pub mod audit;
pub mod decimal;
pub mod notification;
pub mod party;
pub mod primitives;
pub mod risk;
pub mod settlement;
pub mod ticket;
pub mod transaction;

pub use audit::{AuditKind, AuditRecord};
pub use decimal::Decimal;
pub use notification::{Notification, NotificationKind};
pub use party::{PartyIdentity, TaxRegime};
pub use primitives::{new_id, Actor, Role, TimeMs};
pub use risk::{KycStatus, ListKind, ListMatch, RiskLevel, RiskProfile, Verdict};
pub use settlement::{Settlement, SettlementStatus, Vehicle, VehicleState};
pub use ticket::{
    LedgerEntry, LedgerEntryKind, PayoutStatus, ServiceTicket, TicketKind, TicketStatus,
};
pub use transaction::{
    AddOnCosts, AddOnKind, AddOnOrder, ComplianceStatus, Transaction, TransactionStatus,
};
