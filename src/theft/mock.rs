//! Deterministic registry for sandbox mode and tests.

use super::{sha256_hex, RegistryError, TheftRegistry, TheftReport, TheftStatus};
use crate::domain::TimeMs;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// A vehicle identifier containing this marker is reported stolen.
pub const STOLEN_MARKER: &str = "STOLEN";
/// A vehicle identifier containing this marker is reported recovered.
pub const RECOVERED_MARKER: &str = "RECOVERED";

const SANDBOX_SOURCE: &str = "REPUVE-SANDBOX";

#[derive(Debug, Default)]
pub struct MockTheftRegistry {
    latency: Duration,
    failing: AtomicBool,
    lookups: AtomicUsize,
}

impl MockTheftRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_failure(self, failing: bool) -> Self {
        self.failing.store(failing, Ordering::SeqCst);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

/// Folio derived from the identifier so repeated lookups agree.
fn folio_for(vin: &str) -> String {
    let digest = sha256_hex(vin);
    format!("REPUVE-{}", digest[..12].to_ascii_uppercase())
}

#[async_trait]
impl TheftRegistry for MockTheftRegistry {
    async fn lookup(&self, vin: &str) -> Result<TheftReport, RegistryError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable(
                "mock registry forced failure".to_string(),
            ));
        }

        let normalized = vin.trim().to_ascii_uppercase();
        let status = if normalized.contains(STOLEN_MARKER) {
            TheftStatus::Stolen
        } else if normalized.contains(RECOVERED_MARKER) {
            TheftStatus::Recovered
        } else {
            TheftStatus::Clean
        };

        Ok(TheftReport {
            folio: folio_for(&normalized),
            vin: normalized,
            status,
            source: SANDBOX_SOURCE.to_string(),
            checked_at: TimeMs::now(),
        })
    }
}
