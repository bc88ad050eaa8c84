//! Deterministic in-process watch lists for sandbox mode and tests.

use super::{ScreeningError, WatchlistProvider};
use crate::domain::{ListKind, ListMatch, PartyIdentity};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Aliases on the sanctions fixture; a name containing any of them matches.
pub const SANCTIONED_ALIASES: &[&str] = &["EL PADRINO", "BLOCKED ALIAS", "OFAC TEST"];

/// Tax ids on the shell-company (EFOS) fixture; matched exactly.
pub const SHELL_COMPANY_TAX_IDS: &[&str] = &["EFO010101AAA", "EFO020202BBB", "XAXX010101EFO"];

/// Politically exposed names; a name containing any of them matches.
pub const PEP_NAMES: &[&str] = &["SENADOR", "GOBERNADOR", "PEP TEST"];

#[derive(Debug)]
pub struct MockWatchlist {
    sanctioned_aliases: Vec<String>,
    shell_company_tax_ids: Vec<String>,
    pep_names: Vec<String>,
    latency: Duration,
    failing: AtomicBool,
    lookups: AtomicUsize,
}

impl MockWatchlist {
    /// Mock loaded with the default fixture lists and no latency.
    pub fn new() -> Self {
        Self {
            sanctioned_aliases: SANCTIONED_ALIASES.iter().map(|s| s.to_string()).collect(),
            shell_company_tax_ids: SHELL_COMPANY_TAX_IDS.iter().map(|s| s.to_string()).collect(),
            pep_names: PEP_NAMES.iter().map(|s| s.to_string()).collect(),
            latency: Duration::ZERO,
            failing: AtomicBool::new(false),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Simulated network latency per lookup.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_failure(self, failing: bool) -> Self {
        self.failing.store(failing, Ordering::SeqCst);
        self
    }

    pub fn with_sanctioned_alias(mut self, alias: &str) -> Self {
        self.sanctioned_aliases.push(normalize(alias));
        self
    }

    pub fn with_pep_name(mut self, name: &str) -> Self {
        self.pep_names.push(normalize(name));
        self
    }

    /// Toggle forced failures on a shared instance.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of lookups that reached the provider.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl Default for MockWatchlist {
    fn default() -> Self {
        Self::new()
    }
}

/// Upper-case, strip Spanish diacritics, and collapse whitespace.
fn normalize(raw: &str) -> String {
    let folded: String = raw
        .chars()
        .map(|c| match c {
            'á' | 'Á' => 'A',
            'é' | 'É' => 'E',
            'í' | 'Í' => 'I',
            'ó' | 'Ó' => 'O',
            'ú' | 'Ú' | 'ü' | 'Ü' => 'U',
            'ñ' | 'Ñ' => 'N',
            other => other.to_ascii_uppercase(),
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl WatchlistProvider for MockWatchlist {
    async fn lookup(&self, person: &PartyIdentity) -> Result<Vec<ListMatch>, ScreeningError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(ScreeningError::Unavailable(
                "mock watchlist forced failure".to_string(),
            ));
        }

        let name = normalize(&person.name);
        let mut matches = Vec::new();

        for alias in &self.sanctioned_aliases {
            if name.contains(alias.as_str()) {
                matches.push(ListMatch {
                    list: ListKind::Sanctions,
                    entry: alias.clone(),
                });
            }
        }

        if let Some(tax_id) = person.tax_id.as_deref().map(normalize) {
            if self.shell_company_tax_ids.iter().any(|t| *t == tax_id) {
                matches.push(ListMatch {
                    list: ListKind::ShellCompany,
                    entry: tax_id,
                });
            }
        }

        for pep in &self.pep_names {
            if name.contains(pep.as_str()) {
                matches.push(ListMatch {
                    list: ListKind::PoliticallyExposed,
                    entry: pep.clone(),
                });
            }
        }

        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(name: &str, tax_id: Option<&str>) -> PartyIdentity {
        PartyIdentity::new("p", name, tax_id.map(|s| s.to_string()))
    }

    #[tokio::test]
    async fn test_clean_name_has_no_matches() {
        let mock = MockWatchlist::new();
        let matches = mock.lookup(&person("Rosa Jiménez", None)).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_alias_match_ignores_case_and_spacing() {
        let mock = MockWatchlist::new();
        let matches = mock
            .lookup(&person("  jorge   el  padrino ", None))
            .await
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].list, ListKind::Sanctions);
    }

    #[tokio::test]
    async fn test_shell_company_matches_tax_id_exactly() {
        let mock = MockWatchlist::new();
        let hit = mock
            .lookup(&person("Comercializadora Sol", Some("efo010101aaa")))
            .await
            .unwrap();
        assert_eq!(hit[0].list, ListKind::ShellCompany);

        let miss = mock
            .lookup(&person("Comercializadora Sol", Some("EFO010101AAB")))
            .await
            .unwrap();
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn test_pep_match_and_custom_fixture() {
        let mock = MockWatchlist::new().with_pep_name("Alcalde");
        let matches = mock
            .lookup(&person("Alcalde Pedro Núñez", None))
            .await
            .unwrap();
        assert_eq!(matches[0].list, ListKind::PoliticallyExposed);
    }

    #[tokio::test]
    async fn test_forced_failure_counts_lookup() {
        let mock = MockWatchlist::new();
        mock.set_failing(true);
        assert!(mock.lookup(&person("Rosa", None)).await.is_err());
        assert_eq!(mock.lookup_count(), 1);
    }
}
