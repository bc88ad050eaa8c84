use crate::ledger::LedgerError;
use crate::orchestration::GatewayError;
use crate::screening::ScreeningError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Gateway(err) => match err {
                GatewayError::ComplianceBlocked(_) => StatusCode::UNPROCESSABLE_ENTITY,
                GatewayError::KycRequired { .. } => StatusCode::PRECONDITION_REQUIRED,
                GatewayError::FraudDetected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                GatewayError::InvalidToken => StatusCode::CONFLICT,
                GatewayError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
                GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
                GatewayError::InvalidTransition(_) => StatusCode::CONFLICT,
                GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
                GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
                GatewayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Gateway(err) => err.code(),
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Gateway(GatewayError::Storage(err))
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::Gateway(err.into())
    }
}

impl From<ScreeningError> for AppError {
    fn from(err: ScreeningError) -> Self {
        AppError::Gateway(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retryable = matches!(&self, AppError::Gateway(e) if e.is_retryable());
        let message = match &self {
            // Storage details stay in the log.
            AppError::Gateway(GatewayError::Storage(e)) => {
                tracing::error!("Storage failure: {}", e);
                "internal storage error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": self.code(),
            "retryable": retryable,
        }));

        (status, body).into_response()
    }
}
