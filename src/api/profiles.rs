use super::{AppState, CurrentActor};
use crate::domain::{PartyIdentity, RiskProfile};
use crate::error::AppError;
use crate::orchestration::GatewayError;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycRequest {
    pub name: String,
    pub tax_id: Option<String>,
}

/// A person may read their own profile; admins may read any.
pub async fn get_profile(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
) -> Result<Json<RiskProfile>, AppError> {
    if !actor.is_admin() && actor.id != id {
        return Err(GatewayError::Forbidden("not your profile".to_string()).into());
    }
    let profile = state
        .screening
        .profile(&id)
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("profile {}", id)))?;
    Ok(Json(profile))
}

/// Record a completed identity verification. Admin only.
pub async fn verify_kyc(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    Path(id): Path<String>,
    Json(body): Json<KycRequest>,
) -> Result<Json<RiskProfile>, AppError> {
    if !actor.is_admin() {
        return Err(
            GatewayError::Forbidden("KYC verification requires the admin role".to_string())
                .into(),
        );
    }
    if body.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".into()));
    }
    let person = PartyIdentity::new(id, body.name, body.tax_id);
    let profile = state.screening.mark_kyc_verified(&actor, &person).await?;
    Ok(Json(profile))
}
