//! Paid partner appointments.

use super::{AppState, CurrentActor};
use crate::domain::{Actor, Decimal, LedgerEntry, ServiceTicket};
use crate::error::AppError;
use crate::ledger::NewServiceTicket;
use crate::orchestration::GatewayError;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRequest {
    pub amount: Decimal,
    pub reference: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
    #[serde(flatten)]
    pub ticket: ServiceTicket,
    pub entries: Vec<LedgerEntry>,
}

pub async fn book_ticket(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(body): Json<NewServiceTicket>,
) -> Result<(StatusCode, Json<ServiceTicket>), AppError> {
    if !actor.is_admin() && actor.id != body.customer_id {
        return Err(GatewayError::Forbidden("tickets are booked by the customer".to_string()).into());
    }
    let ticket = state.ledger.book_ticket(body).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<TicketResponse>, AppError> {
    let ticket = state.ledger.get_ticket(&id).await?;
    ensure_participant(&actor, &ticket)?;
    let entries = state.ledger.entries_for_ticket(&id).await?;
    Ok(Json(TicketResponse { ticket, entries }))
}

pub async fn charge_ticket(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(body): Json<ChargeRequest>,
) -> Result<Json<LedgerEntry>, AppError> {
    let ticket = state.ledger.get_ticket(&id).await?;
    ensure_participant(&actor, &ticket)?;
    let entry = state
        .ledger
        .record_card_charge(&id, body.amount, &body.reference)
        .await?;
    Ok(Json(entry))
}

pub async fn start_ticket(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<ServiceTicket>, AppError> {
    let ticket = state.ledger.get_ticket(&id).await?;
    ensure_partner(&actor, &ticket)?;
    Ok(Json(state.ledger.start_ticket(&id).await?))
}

pub async fn complete_ticket(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<LedgerEntry>, AppError> {
    let ticket = state.ledger.get_ticket(&id).await?;
    ensure_partner(&actor, &ticket)?;
    Ok(Json(state.ledger.complete_ticket(&id).await?))
}

fn ensure_participant(actor: &Actor, ticket: &ServiceTicket) -> Result<(), AppError> {
    if actor.is_admin() || actor.id == ticket.customer_id || actor.id == ticket.partner_id {
        Ok(())
    } else {
        Err(GatewayError::Forbidden("not a participant of this ticket".to_string()).into())
    }
}

fn ensure_partner(actor: &Actor, ticket: &ServiceTicket) -> Result<(), AppError> {
    if actor.is_admin() || actor.id == ticket.partner_id {
        Ok(())
    } else {
        Err(GatewayError::Forbidden("only the assigned partner may do this".to_string()).into())
    }
}
