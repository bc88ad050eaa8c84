//! Theft registry backed by a remote lookup API.

use super::{RegistryError, TheftRegistry, TheftReport, TheftStatus};
use crate::domain::TimeMs;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpTheftRegistry {
    client: Client,
    base_url: String,
    max_elapsed: Duration,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    status: String,
    folio: String,
    #[serde(default)]
    source: Option<String>,
}

impl HttpTheftRegistry {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_elapsed: Duration::from_secs(10),
        }
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }
}

#[async_trait]
impl TheftRegistry for HttpTheftRegistry {
    async fn lookup(&self, vin: &str) -> Result<TheftReport, RegistryError> {
        let url = format!("{}/vehicles/{}/status", self.base_url, vin);
        debug!("Querying theft registry for vin={}", vin);

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        let body: LookupResponse = retry(backoff, || async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(RegistryError::Unavailable(e.to_string())))?;

            let status = response.status();
            if status == 429 || status.is_server_error() {
                return Err(backoff::Error::transient(RegistryError::Unavailable(
                    format!("HTTP {}", status.as_u16()),
                )));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(RegistryError::InvalidResponse(
                    format!("HTTP {}", status.as_u16()),
                )));
            }

            response.json::<LookupResponse>().await.map_err(|e| {
                backoff::Error::permanent(RegistryError::InvalidResponse(e.to_string()))
            })
        })
        .await?;

        let status: TheftStatus = body
            .status
            .parse()
            .map_err(RegistryError::InvalidResponse)?;

        Ok(TheftReport {
            vin: vin.to_string(),
            status,
            folio: body.folio,
            source: body.source.unwrap_or_else(|| self.base_url.clone()),
            checked_at: TimeMs::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_registry_is_retryable() {
        let registry = HttpTheftRegistry::new("http://127.0.0.1:9/".to_string())
            .with_max_elapsed(Duration::from_millis(50));
        let err = registry.lookup("1HGCM82633A004352").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
