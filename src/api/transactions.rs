//! Escrow transaction endpoints.

use super::{AppState, CurrentActor};
use crate::domain::{Actor, AddOnCosts, Transaction, TransactionStatus};
use crate::error::AppError;
use crate::orchestration::{
    FundingReceipt, FundingReference, GatewayError, HandoverReceipt, NewTransaction,
    TransactionView,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoverTokenResponse {
    pub transaction_id: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoverRequest {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRequest {
    pub status: TransactionStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReviewRequest {
    pub approve: bool,
    pub note: Option<String>,
}

pub async fn create_transaction(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Json(body): Json<NewTransaction>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    if !actor.is_admin() && actor.id != body.buyer_id {
        return Err(GatewayError::Forbidden(
            "transactions are opened by the buyer".to_string(),
        )
        .into());
    }
    let transaction = state.orchestrator.create_transaction(body).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<TransactionView>, AppError> {
    let view = state.orchestrator.get_transaction(&id).await?;
    ensure_party(&actor, &view.transaction)?;
    Ok(Json(view))
}

pub async fn update_services(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(add_ons): Json<AddOnCosts>,
) -> Result<Json<Transaction>, AppError> {
    authorize_party(&state, &actor, &id).await?;
    let transaction = state.orchestrator.update_services(&id, add_ons).await?;
    Ok(Json(transaction))
}

pub async fn attach_checkout_session(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(body): Json<CheckoutSessionRequest>,
) -> Result<Json<Transaction>, AppError> {
    authorize_party(&state, &actor, &id).await?;
    let transaction = state
        .orchestrator
        .attach_checkout_session(&id, &body.session_id)
        .await?;
    Ok(Json(transaction))
}

/// Payment confirmation callback. Carries no actor headers.
pub async fn confirm_funding(
    State(state): State<AppState>,
    Json(reference): Json<FundingReference>,
) -> Result<Json<FundingReceipt>, AppError> {
    let receipt = state.orchestrator.confirm_funding(reference).await?;
    Ok(Json(receipt))
}

pub async fn generate_handover_token(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<HandoverTokenResponse>, AppError> {
    let transaction = authorize_party(&state, &actor, &id).await?;
    if !actor.is_admin() && actor.id != transaction.buyer_id {
        return Err(GatewayError::Forbidden(
            "only the buyer can issue the handover token".to_string(),
        )
        .into());
    }
    let token = state.orchestrator.generate_handover_token(&id).await?;
    Ok(Json(HandoverTokenResponse {
        transaction_id: id,
        token,
    }))
}

pub async fn confirm_handover(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(body): Json<HandoverRequest>,
) -> Result<Json<HandoverReceipt>, AppError> {
    authorize_party(&state, &actor, &id).await?;
    let receipt = state.orchestrator.confirm_handover(&id, &body.token).await?;
    Ok(Json(receipt))
}

pub async fn cancel_transaction(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Transaction>, AppError> {
    let reason = body.and_then(|Json(b)| b.reason);
    let transaction = state
        .orchestrator
        .cancel_transaction(&actor, &id, reason)
        .await?;
    Ok(Json(transaction))
}

pub async fn override_status(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(body): Json<OverrideRequest>,
) -> Result<Json<Transaction>, AppError> {
    let transaction = state
        .orchestrator
        .override_status(&actor, &id, body.status, body.reason)
        .await?;
    Ok(Json(transaction))
}

pub async fn review_compliance(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(body): Json<ComplianceReviewRequest>,
) -> Result<Json<Transaction>, AppError> {
    let transaction = state
        .orchestrator
        .review_compliance(&actor, &id, body.approve, body.note)
        .await?;
    Ok(Json(transaction))
}

async fn authorize_party(
    state: &AppState,
    actor: &Actor,
    id: &str,
) -> Result<Transaction, AppError> {
    let transaction = state
        .repo
        .get_transaction(id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("transaction {}", id)))?;
    ensure_party(actor, &transaction)?;
    Ok(transaction)
}

fn ensure_party(actor: &Actor, transaction: &Transaction) -> Result<(), AppError> {
    if actor.is_admin() || transaction.is_party(&actor.id) {
        Ok(())
    } else {
        Err(GatewayError::Forbidden("not a party to this transaction".to_string()).into())
    }
}
