//! Watch-list provider backed by a remote screening API.

use super::{ScreeningError, WatchlistProvider};
use crate::domain::{ListKind, ListMatch, PartyIdentity};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HttpWatchlistProvider {
    client: Client,
    base_url: String,
    max_elapsed: Duration,
}

#[derive(Debug, Deserialize)]
struct ScreenResponse {
    #[serde(default)]
    matches: Vec<RemoteMatch>,
}

#[derive(Debug, Deserialize)]
struct RemoteMatch {
    list: String,
    entry: String,
}

impl HttpWatchlistProvider {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_elapsed: Duration::from_secs(10),
        }
    }

    /// Upper bound on the total time spent retrying one lookup.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }
}

fn parse_list(raw: &str) -> Option<ListKind> {
    match raw.to_ascii_uppercase().as_str() {
        "SANCTIONS" | "OFAC" | "UIF" => Some(ListKind::Sanctions),
        "SHELL_COMPANY" | "EFOS" | "69B" => Some(ListKind::ShellCompany),
        "PEP" | "POLITICALLY_EXPOSED" => Some(ListKind::PoliticallyExposed),
        _ => None,
    }
}

#[async_trait]
impl WatchlistProvider for HttpWatchlistProvider {
    async fn lookup(&self, person: &PartyIdentity) -> Result<Vec<ListMatch>, ScreeningError> {
        let url = format!("{}/screen", self.base_url);
        let payload = serde_json::json!({
            "personId": person.id,
            "name": person.name,
            "taxId": person.tax_id,
        });
        debug!("Screening person={} via {}", person.id, url);

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        let response: ScreenResponse = retry(backoff, || async {
            let response = self
                .client
                .post(&url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(ScreeningError::Unavailable(e.to_string())))?;

            let status = response.status();
            if status == 429 || status.is_server_error() {
                return Err(backoff::Error::transient(ScreeningError::Unavailable(
                    format!("HTTP {}", status.as_u16()),
                )));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(ScreeningError::InvalidResponse(
                    format!("HTTP {}", status.as_u16()),
                )));
            }

            response.json::<ScreenResponse>().await.map_err(|e| {
                backoff::Error::permanent(ScreeningError::InvalidResponse(e.to_string()))
            })
        })
        .await?;

        let mut matches = Vec::with_capacity(response.matches.len());
        for remote in response.matches {
            match parse_list(&remote.list) {
                Some(list) => matches.push(ListMatch {
                    list,
                    entry: remote.entry,
                }),
                None => warn!("Ignoring match on unknown list {}", remote.list),
            }
        }
        Ok(matches)
    }
}
