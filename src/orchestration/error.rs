use crate::domain::Decimal;
use crate::ledger::LedgerError;
use crate::screening::ScreeningError;
use crate::settlement::SettlementError;
use crate::theft::RegistryError;
use thiserror::Error;

/// Failure taxonomy of gateway operations.
///
/// Every blocking check short-circuits with one of these before any state
/// is written, so callers can route users to the right remediation.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Hard sanctions or shell-company hit. Needs manual review.
    #[error("operation blocked by compliance screening: {0}")]
    ComplianceBlocked(String),
    /// Soft block: the seller must complete identity verification first.
    #[error("seller identity verification required for amounts above {threshold}")]
    KycRequired { threshold: Decimal },
    #[error("vehicle reported stolen by {source_name} (folio {folio})")]
    FraudDetected { folio: String, source_name: String },
    #[error("invalid or expired handover token")]
    InvalidToken,
    #[error("temporarily unavailable, retry later: {0}")]
    Transient(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("{0}")]
    Validation(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl GatewayError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::ComplianceBlocked(_) => "COMPLIANCE_BLOCKED",
            GatewayError::KycRequired { .. } => "KYC_REQUIRED",
            GatewayError::FraudDetected { .. } => "FRAUD_DETECTED",
            GatewayError::InvalidToken => "INVALID_TOKEN",
            GatewayError::Transient(_) => "TRANSIENT",
            GatewayError::NotFound(_) => "NOT_FOUND",
            GatewayError::InvalidTransition(_) => "INVALID_TRANSITION",
            GatewayError::Validation(_) => "VALIDATION",
            GatewayError::Forbidden(_) => "FORBIDDEN",
            GatewayError::Storage(_) => "STORAGE",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

impl From<ScreeningError> for GatewayError {
    fn from(err: ScreeningError) -> Self {
        match err {
            ScreeningError::Unavailable(msg) => GatewayError::Transient(msg),
            ScreeningError::InvalidResponse(msg) => {
                GatewayError::Transient(format!("screening provider: {}", msg))
            }
            ScreeningError::Storage(e) => GatewayError::Storage(e),
        }
    }
}

impl From<RegistryError> for GatewayError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Unavailable(msg) => GatewayError::Transient(msg),
            RegistryError::InvalidResponse(msg) => {
                GatewayError::Transient(format!("theft registry: {}", msg))
            }
            RegistryError::Storage(e) => GatewayError::Storage(e),
        }
    }
}

impl From<SettlementError> for GatewayError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::InvalidAmount(_) => GatewayError::Validation(err.to_string()),
            SettlementError::Storage(e) => GatewayError::Storage(e),
        }
    }
}

impl From<LedgerError> for GatewayError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => GatewayError::NotFound(format!("ticket {}", id)),
            LedgerError::InvalidState { .. } => GatewayError::InvalidTransition(err.to_string()),
            LedgerError::AmountMismatch { .. } | LedgerError::Validation(_) => {
                GatewayError::Validation(err.to_string())
            }
            LedgerError::Storage(e) => GatewayError::Storage(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(GatewayError::Transient("x".to_string()).is_retryable());
        assert!(!GatewayError::InvalidToken.is_retryable());
        assert!(!GatewayError::ComplianceBlocked("x".to_string()).is_retryable());
    }

    #[test]
    fn test_provider_outage_maps_to_transient() {
        let err: GatewayError = ScreeningError::Unavailable("timeout".to_string()).into();
        assert_eq!(err.code(), "TRANSIENT");
        let err: GatewayError = RegistryError::Unavailable("timeout".to_string()).into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_ledger_errors_map_to_gateway_codes() {
        let err: GatewayError = LedgerError::NotFound("t1".to_string()).into();
        assert_eq!(err.code(), "NOT_FOUND");
        let err: GatewayError = LedgerError::AmountMismatch {
            expected: Decimal::whole(10),
            got: Decimal::whole(5),
        }
        .into();
        assert_eq!(err.code(), "VALIDATION");
    }
}
