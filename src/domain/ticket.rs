//! Paid partner appointments (inspection, logistics, legal) and their ledger.

use crate::domain::{Decimal, TimeMs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketKind {
    Inspection,
    Logistics,
    Legal,
}

impl TicketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketKind::Inspection => "INSPECTION",
            TicketKind::Logistics => "LOGISTICS",
            TicketKind::Legal => "LEGAL",
        }
    }
}

impl FromStr for TicketKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSPECTION" => Ok(TicketKind::Inspection),
            "LOGISTICS" => Ok(TicketKind::Logistics),
            "LEGAL" => Ok(TicketKind::Legal),
            other => Err(format!("unknown ticket kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    PendingPayment,
    PaidPendingVisit,
    InProgress,
    Completed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::PendingPayment => "PENDING_PAYMENT",
            TicketStatus::PaidPendingVisit => "PAID_PENDING_VISIT",
            TicketStatus::InProgress => "IN_PROGRESS",
            TicketStatus::Completed => "COMPLETED",
        }
    }

    /// The only status this one may advance to.
    pub fn next(&self) -> Option<TicketStatus> {
        match self {
            TicketStatus::PendingPayment => Some(TicketStatus::PaidPendingVisit),
            TicketStatus::PaidPendingVisit => Some(TicketStatus::InProgress),
            TicketStatus::InProgress => Some(TicketStatus::Completed),
            TicketStatus::Completed => None,
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_PAYMENT" => Ok(TicketStatus::PendingPayment),
            "PAID_PENDING_VISIT" => Ok(TicketStatus::PaidPendingVisit),
            "IN_PROGRESS" => Ok(TicketStatus::InProgress),
            "COMPLETED" => Ok(TicketStatus::Completed),
            other => Err(format!("unknown ticket status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutStatus {
    NotDue,
    Pending,
    Paid,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::NotDue => "NOT_DUE",
            PayoutStatus::Pending => "PENDING",
            PayoutStatus::Paid => "PAID",
        }
    }
}

impl FromStr for PayoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_DUE" => Ok(PayoutStatus::NotDue),
            "PENDING" => Ok(PayoutStatus::Pending),
            "PAID" => Ok(PayoutStatus::Paid),
            other => Err(format!("unknown payout status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTicket {
    pub id: String,
    pub vehicle_id: String,
    pub partner_id: String,
    /// Person who booked and pays for the appointment.
    pub customer_id: String,
    pub kind: TicketKind,
    pub scheduled_for: TimeMs,
    pub price: Decimal,
    pub status: TicketStatus,
    pub partner_payout: Decimal,
    pub payout_status: PayoutStatus,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerEntryKind {
    CardCharge,
    PartnerPayout,
}

impl LedgerEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryKind::CardCharge => "CARD_CHARGE",
            LedgerEntryKind::PartnerPayout => "PARTNER_PAYOUT",
        }
    }
}

impl FromStr for LedgerEntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CARD_CHARGE" => Ok(LedgerEntryKind::CardCharge),
            "PARTNER_PAYOUT" => Ok(LedgerEntryKind::PartnerPayout),
            other => Err(format!("unknown ledger entry kind: {}", other)),
        }
    }
}

/// Immutable money movement tied to a service ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub ticket_id: String,
    pub kind: LedgerEntryKind,
    pub amount: Decimal,
    pub reference: String,
    pub created_at: TimeMs,
}
