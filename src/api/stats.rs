use super::{AppState, CurrentActor};
use crate::error::AppError;
use crate::orchestration::{GatewayError, GlobalStats};
use axum::extract::State;
use axum::Json;

/// Platform-wide figures. Admin only.
pub async fn get_stats(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
) -> Result<Json<GlobalStats>, AppError> {
    if !actor.is_admin() {
        return Err(GatewayError::Forbidden("stats require the admin role".to_string()).into());
    }
    Ok(Json(state.orchestrator.global_stats().await?))
}
