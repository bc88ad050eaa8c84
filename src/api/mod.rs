pub mod health;
pub mod profiles;
pub mod quotes;
pub mod stats;
pub mod tickets;
pub mod transactions;

use crate::config::Config;
use crate::db::Repository;
use crate::domain::{Actor, Role};
use crate::error::AppError;
use crate::ledger::PaymentLedgerService;
use crate::notify::Outbox;
use crate::orchestration::TransactionOrchestrator;
use crate::screening::{RiskScreeningService, WatchlistProvider};
use crate::settlement::SettlementService;
use crate::theft::{TheftRegistry, TheftVerificationService};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub orchestrator: Arc<TransactionOrchestrator>,
    pub screening: RiskScreeningService,
    pub ledger: PaymentLedgerService,
}

impl AppState {
    /// Wire every service over one repository and the chosen providers.
    pub fn new(
        repo: Arc<Repository>,
        config: Config,
        watchlist: Arc<dyn WatchlistProvider>,
        registry: Arc<dyn TheftRegistry>,
    ) -> Self {
        let rules = config.fiscal_rules();
        let outbox = Outbox::new(repo.clone());
        let screening = RiskScreeningService::new(watchlist, repo.clone(), config.risk_cache_ms);
        let orchestrator = TransactionOrchestrator::new(
            repo.clone(),
            screening.clone(),
            TheftVerificationService::new(registry, repo.clone()),
            SettlementService::new(repo.clone(), config.platform_fee_rate),
            outbox.clone(),
            rules,
        );
        let ledger = PaymentLedgerService::new(repo.clone(), outbox, config.partner_payout_rate);
        Self {
            repo,
            config,
            orchestrator: Arc::new(orchestrator),
            screening,
            ledger,
        }
    }
}

/// Caller identity taken from the `x-actor-id` and `x-actor-role` headers.
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let id = header(ACTOR_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", ACTOR_ID_HEADER)))?;
        let role: Role = header(ACTOR_ROLE_HEADER)
            .ok_or_else(|| {
                AppError::Unauthorized(format!("missing {} header", ACTOR_ROLE_HEADER))
            })?
            .parse()
            .map_err(AppError::Unauthorized)?;
        if role == Role::System {
            return Err(AppError::Unauthorized(
                "system role cannot be asserted by callers".to_string(),
            ));
        }
        Ok(CurrentActor(Actor::new(id, role)))
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/transactions", post(transactions::create_transaction))
        .route("/v1/transactions/:id", get(transactions::get_transaction))
        .route(
            "/v1/transactions/:id/services",
            put(transactions::update_services),
        )
        .route(
            "/v1/transactions/:id/checkout-session",
            post(transactions::attach_checkout_session),
        )
        .route("/v1/funding/confirm", post(transactions::confirm_funding))
        .route(
            "/v1/transactions/:id/handover-token",
            post(transactions::generate_handover_token),
        )
        .route(
            "/v1/transactions/:id/handover",
            post(transactions::confirm_handover),
        )
        .route(
            "/v1/transactions/:id/cancel",
            post(transactions::cancel_transaction),
        )
        .route(
            "/v1/admin/transactions/:id/status",
            post(transactions::override_status),
        )
        .route(
            "/v1/admin/transactions/:id/compliance",
            post(transactions::review_compliance),
        )
        .route("/v1/stats", get(stats::get_stats))
        .route("/v1/quotes/fiscal", post(quotes::fiscal_quote))
        .route("/v1/quotes/shipping", post(quotes::shipping_quote))
        .route("/v1/quotes/warranty", post(quotes::warranty_quote))
        .route("/v1/profiles/:id", get(profiles::get_profile))
        .route("/v1/profiles/:id/kyc", post(profiles::verify_kyc))
        .route("/v1/tickets", post(tickets::book_ticket))
        .route("/v1/tickets/:id", get(tickets::get_ticket))
        .route("/v1/tickets/:id/charge", post(tickets::charge_ticket))
        .route("/v1/tickets/:id/start", post(tickets::start_ticket))
        .route("/v1/tickets/:id/complete", post(tickets::complete_ticket))
        .layer(cors)
        .with_state(state)
}
