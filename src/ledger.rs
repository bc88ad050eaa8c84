//! Payment ledger for paid partner appointments (service tickets).

use crate::db::Repository;
use crate::domain::{
    new_id, Decimal, LedgerEntry, LedgerEntryKind, Notification, NotificationKind, PayoutStatus,
    ServiceTicket, TicketKind, TicketStatus, TimeMs,
};
use crate::notify::Outbox;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ticket not found: {0}")]
    NotFound(String),
    #[error("ticket {ticket_id} is {status}, expected {expected}")]
    InvalidState {
        ticket_id: String,
        status: TicketStatus,
        expected: TicketStatus,
    },
    #[error("charge of {got} does not match ticket price {expected}")]
    AmountMismatch { expected: Decimal, got: Decimal },
    #[error("{0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewServiceTicket {
    pub vehicle_id: String,
    pub partner_id: String,
    pub customer_id: String,
    pub kind: TicketKind,
    pub scheduled_for: TimeMs,
    pub price: Decimal,
}

#[derive(Debug, Clone)]
pub struct PaymentLedgerService {
    repo: Arc<Repository>,
    outbox: Outbox,
    partner_payout_rate: Decimal,
}

impl PaymentLedgerService {
    pub fn new(repo: Arc<Repository>, outbox: Outbox, partner_payout_rate: Decimal) -> Self {
        Self {
            repo,
            outbox,
            partner_payout_rate,
        }
    }

    pub async fn book_ticket(&self, new: NewServiceTicket) -> Result<ServiceTicket, LedgerError> {
        if !new.price.is_positive() {
            return Err(LedgerError::Validation(
                "ticket price must be positive".to_string(),
            ));
        }
        if new.partner_id.trim().is_empty() || new.vehicle_id.trim().is_empty() {
            return Err(LedgerError::Validation(
                "partner and vehicle are required".to_string(),
            ));
        }

        let now = TimeMs::now();
        let ticket = ServiceTicket {
            id: new_id(),
            vehicle_id: new.vehicle_id,
            partner_id: new.partner_id,
            customer_id: new.customer_id,
            kind: new.kind,
            scheduled_for: new.scheduled_for,
            price: new.price.round_cents(),
            status: TicketStatus::PendingPayment,
            partner_payout: Decimal::zero(),
            payout_status: PayoutStatus::NotDue,
            created_at: now,
            updated_at: now,
        };
        self.repo.insert_ticket(&ticket).await?;
        info!(
            "Booked {} ticket={} partner={} price={}",
            ticket.kind.as_str(),
            ticket.id,
            ticket.partner_id,
            ticket.price
        );
        Ok(ticket)
    }

    pub async fn get_ticket(&self, ticket_id: &str) -> Result<ServiceTicket, LedgerError> {
        self.repo
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(ticket_id.to_string()))
    }

    /// Record the card charge for a booked ticket.
    ///
    /// The charge must match the ticket price exactly; the partner payout is
    /// fixed at this point.
    pub async fn record_card_charge(
        &self,
        ticket_id: &str,
        amount: Decimal,
        reference: &str,
    ) -> Result<LedgerEntry, LedgerError> {
        let ticket = self.get_ticket(ticket_id).await?;
        expect_status(&ticket, TicketStatus::PendingPayment)?;
        if amount != ticket.price {
            return Err(LedgerError::AmountMismatch {
                expected: ticket.price,
                got: amount,
            });
        }

        let now = TimeMs::now();
        let payout = ticket.price.percent_of(self.partner_payout_rate);
        let entry = LedgerEntry {
            id: new_id(),
            ticket_id: ticket.id.clone(),
            kind: LedgerEntryKind::CardCharge,
            amount,
            reference: reference.to_string(),
            created_at: now,
        };
        if !self.repo.charge_ticket(&entry, payout, now).await? {
            return Err(self.stale_state(ticket_id, TicketStatus::PendingPayment).await);
        }

        info!(
            "Charged ticket={} amount={} payout_pending={}",
            ticket.id, amount, payout
        );
        self.outbox
            .enqueue(
                Notification::new(
                    &ticket.partner_id,
                    NotificationKind::Info,
                    "Nueva cita pagada",
                    format!("La cita {} está pagada y pendiente de visita.", ticket.id),
                )
                .with_link(format!("/tickets/{}", ticket.id)),
            )
            .await;
        Ok(entry)
    }

    pub async fn start_ticket(&self, ticket_id: &str) -> Result<ServiceTicket, LedgerError> {
        let ticket = self.get_ticket(ticket_id).await?;
        expect_status(&ticket, TicketStatus::PaidPendingVisit)?;
        if !self
            .repo
            .advance_ticket(
                ticket_id,
                TicketStatus::PaidPendingVisit,
                TicketStatus::InProgress,
                TimeMs::now(),
            )
            .await?
        {
            return Err(self.stale_state(ticket_id, TicketStatus::PaidPendingVisit).await);
        }
        self.get_ticket(ticket_id).await
    }

    /// Close the ticket and pay the partner.
    pub async fn complete_ticket(&self, ticket_id: &str) -> Result<LedgerEntry, LedgerError> {
        let ticket = self.get_ticket(ticket_id).await?;
        expect_status(&ticket, TicketStatus::InProgress)?;

        let now = TimeMs::now();
        let entry = LedgerEntry {
            id: new_id(),
            ticket_id: ticket.id.clone(),
            kind: LedgerEntryKind::PartnerPayout,
            amount: ticket.partner_payout,
            reference: format!("PAYOUT-{}", ticket.id),
            created_at: now,
        };
        if !self.repo.complete_ticket(&entry, now).await? {
            return Err(self.stale_state(ticket_id, TicketStatus::InProgress).await);
        }

        info!(
            "Completed ticket={} paid partner={} amount={}",
            ticket.id, ticket.partner_id, entry.amount
        );
        self.outbox
            .enqueue(
                Notification::new(
                    &ticket.partner_id,
                    NotificationKind::Success,
                    "Pago liberado",
                    format!(
                        "Se liberó tu pago de ${} por la cita {}.",
                        entry.amount, ticket.id
                    ),
                )
                .with_link(format!("/tickets/{}", ticket.id)),
            )
            .await;
        Ok(entry)
    }

    pub async fn entries_for_ticket(&self, ticket_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.repo.ledger_entries(ticket_id).await?)
    }

    /// Error for a guarded update that lost a race.
    async fn stale_state(&self, ticket_id: &str, expected: TicketStatus) -> LedgerError {
        match self.repo.get_ticket(ticket_id).await {
            Ok(Some(ticket)) => LedgerError::InvalidState {
                ticket_id: ticket_id.to_string(),
                status: ticket.status,
                expected,
            },
            Ok(None) => LedgerError::NotFound(ticket_id.to_string()),
            Err(e) => LedgerError::Storage(e),
        }
    }
}

fn expect_status(ticket: &ServiceTicket, expected: TicketStatus) -> Result<(), LedgerError> {
    if ticket.status != expected {
        return Err(LedgerError::InvalidState {
            ticket_id: ticket.id.clone(),
            status: ticket.status,
            expected,
        });
    }
    Ok(())
}
