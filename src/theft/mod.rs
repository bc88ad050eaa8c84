//! Stolen-vehicle registry verification and evidence certificates.

use crate::db::Repository;
use crate::domain::{Actor, AuditKind, AuditRecord, TimeMs};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub mod http;
pub mod mock;

pub use http::HttpTheftRegistry;
pub use mock::MockTheftRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TheftStatus {
    Clean,
    Stolen,
    /// Previously reported stolen and since recovered; not blocking.
    Recovered,
}

impl TheftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TheftStatus::Clean => "CLEAN",
            TheftStatus::Stolen => "STOLEN",
            TheftStatus::Recovered => "RECOVERED",
        }
    }

    pub fn blocks_funding(&self) -> bool {
        matches!(self, TheftStatus::Stolen)
    }
}

impl FromStr for TheftStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CLEAN" => Ok(TheftStatus::Clean),
            "STOLEN" => Ok(TheftStatus::Stolen),
            "RECOVERED" => Ok(TheftStatus::Recovered),
            other => Err(format!("unknown theft status: {}", other)),
        }
    }
}

impl fmt::Display for TheftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TheftReport {
    pub vin: String,
    pub status: TheftStatus,
    /// Registry query folio.
    pub folio: String,
    pub source: String,
    pub checked_at: TimeMs,
}

/// Evidence of a registry check, shown to the buyer later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TheftCertificate {
    pub id: String,
    pub transaction_id: String,
    pub report: TheftReport,
    /// Hex SHA-256 over the certified fields.
    pub digest: String,
    pub issued_at: TimeMs,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("theft registry unavailable: {0}")]
    Unavailable(String),
    #[error("invalid registry response: {0}")]
    InvalidResponse(String),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl RegistryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Unavailable(_))
    }
}

#[async_trait]
pub trait TheftRegistry: Send + Sync + fmt::Debug {
    async fn lookup(&self, vin: &str) -> Result<TheftReport, RegistryError>;
}

pub(crate) fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

fn certificate_digest(transaction_id: &str, report: &TheftReport) -> String {
    sha256_hex(&format!(
        "{}|{}|{}|{}|{}|{}",
        transaction_id,
        report.vin,
        report.status.as_str(),
        report.folio,
        report.source,
        report.checked_at.as_ms()
    ))
}

#[derive(Debug, Clone)]
pub struct TheftVerificationService {
    registry: Arc<dyn TheftRegistry>,
    repo: Arc<Repository>,
}

impl TheftVerificationService {
    pub fn new(registry: Arc<dyn TheftRegistry>, repo: Arc<Repository>) -> Self {
        Self { registry, repo }
    }

    pub async fn verify_theft_status(&self, vin: &str) -> Result<TheftReport, RegistryError> {
        let vin = vin.trim();
        if vin.is_empty() {
            return Err(RegistryError::InvalidResponse(
                "vehicle identifier is empty".to_string(),
            ));
        }
        let report = self.registry.lookup(vin).await?;
        if report.status.blocks_funding() {
            warn!("Registry reports vin={} as STOLEN folio={}", vin, report.folio);
        } else {
            info!("Registry reports vin={} as {}", vin, report.status);
        }
        Ok(report)
    }

    /// Record an immutable certificate for `report`, whatever its outcome.
    pub async fn generate_certificate(
        &self,
        transaction_id: &str,
        report: &TheftReport,
    ) -> Result<TheftCertificate, RegistryError> {
        let digest = certificate_digest(transaction_id, report);
        let audit = AuditRecord::new(
            AuditKind::TheftCertificate,
            transaction_id,
            Actor::system().id,
            serde_json::json!({
                "vin": report.vin,
                "status": report.status.as_str(),
                "folio": report.folio,
                "source": report.source,
                "checkedAt": report.checked_at.as_ms(),
                "digest": digest,
            }),
        );
        self.repo.insert_audit(&audit).await?;

        Ok(TheftCertificate {
            id: audit.id,
            transaction_id: transaction_id.to_string(),
            report: report.clone(),
            digest,
            issued_at: audit.created_at,
        })
    }
}
