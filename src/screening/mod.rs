//! AML/PLD risk screening against sanctions, shell-company and PEP lists.
//!
//! A screen first consults the cached risk profile; a profile assessed
//! within the cache window is returned as-is (flagged `cached`), and callers
//! treat it exactly like a fresh verdict. Fresh screens go to the configured
//! [`WatchlistProvider`], are audited, and refresh the profile.

use crate::db::Repository;
use crate::domain::{
    Actor, AuditKind, AuditRecord, KycStatus, ListMatch, PartyIdentity, RiskProfile, TimeMs,
    Verdict,
};
use async_trait::async_trait;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod http;
pub mod mock;

pub use http::HttpWatchlistProvider;
pub use mock::MockWatchlist;

/// Watch-list lookup backend.
///
/// Implementations return every list entry the identity matches; the
/// verdict is derived from the matches by the service.
#[async_trait]
pub trait WatchlistProvider: Send + Sync + fmt::Debug {
    async fn lookup(&self, person: &PartyIdentity) -> Result<Vec<ListMatch>, ScreeningError>;
}

#[derive(Debug, Error)]
pub enum ScreeningError {
    /// Provider unreachable or failing; the caller may retry.
    #[error("screening provider unavailable: {0}")]
    Unavailable(String),
    #[error("invalid screening response: {0}")]
    InvalidResponse(String),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

impl ScreeningError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScreeningError::Unavailable(_))
    }
}

/// Why a screen was requested; recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreeningContext {
    TransactionCreation,
    Funding,
    Manual,
}

impl ScreeningContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreeningContext::TransactionCreation => "TRANSACTION_CREATION",
            ScreeningContext::Funding => "FUNDING",
            ScreeningContext::Manual => "MANUAL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskScreeningService {
    provider: Arc<dyn WatchlistProvider>,
    repo: Arc<Repository>,
    cache_window_ms: i64,
}

impl RiskScreeningService {
    pub fn new(
        provider: Arc<dyn WatchlistProvider>,
        repo: Arc<Repository>,
        cache_window_ms: i64,
    ) -> Self {
        Self {
            provider,
            repo,
            cache_window_ms,
        }
    }

    /// Return a cached-or-fresh verdict for `person`.
    pub async fn screen(
        &self,
        person: &PartyIdentity,
        context: ScreeningContext,
    ) -> Result<Verdict, ScreeningError> {
        let now = TimeMs::now();

        if let Some(profile) = self.repo.get_risk_profile(&person.id).await? {
            if profile.is_fresh(now, self.cache_window_ms) {
                if let Some(verdict) = profile.cached_verdict() {
                    debug!(
                        "Risk cache hit for person={} level={}",
                        person.id, verdict.risk_level
                    );
                    return Ok(verdict);
                }
            }
        }

        let matches = self.provider.lookup(person).await.map_err(|e| {
            warn!("Watchlist lookup failed for person={}: {}", person.id, e);
            e
        })?;
        let verdict = Verdict::from_matches(&person.id, matches, now);

        let audit = AuditRecord::new(
            AuditKind::RiskScreening,
            person.id.as_str(),
            Actor::system().id,
            json!({
                "context": context.as_str(),
                "riskLevel": verdict.risk_level.as_str(),
                "score": verdict.score,
                "flags": verdict.flags(),
                "matches": verdict.matches,
            }),
        );
        self.repo.insert_audit(&audit).await?;
        self.repo.upsert_risk_assessment(person, &verdict).await?;

        info!(
            "Screened person={} context={} level={}",
            person.id,
            context.as_str(),
            verdict.risk_level
        );
        Ok(verdict)
    }

    /// Record that `person` passed identity verification.
    pub async fn mark_kyc_verified(
        &self,
        actor: &Actor,
        person: &PartyIdentity,
    ) -> Result<RiskProfile, ScreeningError> {
        self.repo
            .set_kyc_status(person, KycStatus::Verified)
            .await?;
        let audit = AuditRecord::new(
            AuditKind::KycVerified,
            person.id.as_str(),
            actor.id.as_str(),
            json!({ "kycStatus": KycStatus::Verified.as_str() }),
        );
        self.repo.insert_audit(&audit).await?;
        info!("KYC verified for person={} by actor={}", person.id, actor.id);

        self.repo
            .get_risk_profile(&person.id)
            .await?
            .ok_or(ScreeningError::Storage(sqlx::Error::RowNotFound))
    }

    pub async fn profile(&self, person_id: &str) -> Result<Option<RiskProfile>, ScreeningError> {
        Ok(self.repo.get_risk_profile(person_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::domain::{RiskLevel, Role};
    use tempfile::TempDir;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;

    async fn setup(mock: Arc<MockWatchlist>) -> (RiskScreeningService, Arc<Repository>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let repo = Arc::new(Repository::new(init_db(&db_path).await.unwrap()));
        let service = RiskScreeningService::new(mock, repo.clone(), DAY_MS);
        (service, repo, temp_dir)
    }

    #[tokio::test]
    async fn test_clean_person_is_cached_after_first_screen() {
        let mock = Arc::new(MockWatchlist::new());
        let (service, repo, _temp) = setup(mock.clone()).await;
        let person = PartyIdentity::new("s1", "Laura Méndez", None);

        let first = service
            .screen(&person, ScreeningContext::TransactionCreation)
            .await
            .unwrap();
        assert_eq!(first.risk_level, RiskLevel::Clean);
        assert!(!first.cached);

        let second = service
            .screen(&person, ScreeningContext::Funding)
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(second.risk_level, first.risk_level);
        assert_eq!(mock.lookup_count(), 1);
        assert_eq!(repo.count_audit("s1", AuditKind::RiskScreening).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sanctioned_alias_is_blocked() {
        let mock = Arc::new(MockWatchlist::new());
        let (service, repo, _temp) = setup(mock).await;
        let person = PartyIdentity::new("s2", "Carlos El Padrino Ruiz", None);

        let verdict = service
            .screen(&person, ScreeningContext::TransactionCreation)
            .await
            .unwrap();
        assert!(verdict.is_blocked());

        let profile = repo.get_risk_profile("s2").await.unwrap().unwrap();
        assert_eq!(profile.risk_level, RiskLevel::Blocked);
    }

    #[tokio::test]
    async fn test_provider_failure_is_retryable_and_writes_nothing() {
        let mock = Arc::new(MockWatchlist::new().with_failure(true));
        let (service, repo, _temp) = setup(mock).await;
        let person = PartyIdentity::new("s3", "Ana Torres", None);

        let err = service
            .screen(&person, ScreeningContext::Manual)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(repo.get_risk_profile("s3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stale_profile_is_rescreened() {
        let mock = Arc::new(MockWatchlist::new());
        let (service, repo, _temp) = setup(mock.clone()).await;
        let person = PartyIdentity::new("s4", "Diego Salas", None);
        let two_days_ago = TimeMs::new(TimeMs::now().as_ms() - 2 * DAY_MS);
        let stale = Verdict::from_matches("s4", vec![], two_days_ago);
        repo.upsert_risk_assessment(&person, &stale).await.unwrap();

        let verdict = service
            .screen(&person, ScreeningContext::Manual)
            .await
            .unwrap();
        assert!(!verdict.cached);
        assert_eq!(mock.lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_mark_kyc_verified() {
        let mock = Arc::new(MockWatchlist::new());
        let (service, repo, _temp) = setup(mock).await;
        let person = PartyIdentity::new("s5", "Marta Gil", None);

        let profile = service
            .mark_kyc_verified(&Actor::new("admin-1", Role::Admin), &person)
            .await
            .unwrap();
        assert!(profile.is_kyc_verified());
        assert_eq!(profile.last_assessed_at, None);
        assert_eq!(repo.count_audit("s5", AuditKind::KycVerified).await.unwrap(), 1);
    }
}
