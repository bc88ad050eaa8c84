use anyhow::Context;
use escrow_gateway::notify::{LogNotifier, Notifier, OutboxDispatcher, WebhookNotifier};
use escrow_gateway::screening::{HttpWatchlistProvider, MockWatchlist, WatchlistProvider};
use escrow_gateway::theft::{HttpTheftRegistry, MockTheftRegistry, TheftRegistry};
use escrow_gateway::{api, config::Config, db::init_db, Repository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const OUTBOX_INTERVAL: Duration = Duration::from_secs(5);
const OUTBOX_BATCH: u32 = 50;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("failed to initialize database at {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));

    let (watchlist, registry) = providers(&config)?;

    let notifier: Arc<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(LogNotifier),
    };
    tokio::spawn(OutboxDispatcher::new(repo.clone(), notifier).run(OUTBOX_INTERVAL, OUTBOX_BATCH));

    let app = api::create_router(api::AppState::new(repo, config, watchlist, registry));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

/// Sandbox mode selects the in-process providers; otherwise both URLs are
/// required.
fn providers(
    config: &Config,
) -> anyhow::Result<(Arc<dyn WatchlistProvider>, Arc<dyn TheftRegistry>)> {
    if config.sandbox_mode {
        let latency = Duration::from_millis(config.provider_latency_ms);
        tracing::warn!("SANDBOX MODE: using mock screening and theft registry providers");
        return Ok((
            Arc::new(MockWatchlist::new().with_latency(latency)),
            Arc::new(MockTheftRegistry::new().with_latency(latency)),
        ));
    }

    let watchlist_url = config
        .watchlist_api_url
        .clone()
        .context("WATCHLIST_API_URL is required outside sandbox mode")?;
    let registry_url = config
        .theft_registry_api_url
        .clone()
        .context("THEFT_REGISTRY_API_URL is required outside sandbox mode")?;
    Ok((
        Arc::new(HttpWatchlistProvider::new(watchlist_url)),
        Arc::new(HttpTheftRegistry::new(registry_url)),
    ))
}
