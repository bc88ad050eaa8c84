use axum::http::StatusCode;
use escrow_gateway::api;
use escrow_gateway::config::Config;
use escrow_gateway::db::init_db;
use escrow_gateway::domain::Decimal;
use escrow_gateway::notify::{MemoryNotifier, OutboxDispatcher};
use escrow_gateway::screening::MockWatchlist;
use escrow_gateway::theft::MockTheftRegistry;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

struct TestApp {
    app: axum::Router,
    repo: Arc<escrow_gateway::Repository>,
    _temp: TempDir,
}

async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(escrow_gateway::Repository::new(pool));
    let state = api::AppState::new(
        repo.clone(),
        Config::sandbox(db_path),
        Arc::new(MockWatchlist::new()),
        Arc::new(MockTheftRegistry::new()),
    );
    TestApp {
        app: api::create_router(state),
        repo,
        _temp: temp_dir,
    }
}

async fn request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    actor: (&str, &str),
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header("x-actor-id", actor.0)
        .header("x-actor-role", actor.1);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

const CUSTOMER: (&str, &str) = ("buyer-1", "buyer");
const PARTNER: (&str, &str) = ("partner-1", "partner");

fn money(value: &Value) -> Decimal {
    serde_json::from_value(value.clone()).unwrap()
}

async fn book(app: &TestApp) -> String {
    let (status, ticket) = request(
        &app.app,
        "POST",
        "/v1/tickets",
        CUSTOMER,
        Some(json!({
            "vehicleId": "veh-1",
            "partnerId": "partner-1",
            "customerId": "buyer-1",
            "kind": "INSPECTION",
            "scheduledFor": 1_900_000_000_000i64,
            "price": "1500",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ticket["status"], "PENDING_PAYMENT");
    ticket["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_ticket_lifecycle_pays_partner() {
    let app = setup_test_app().await;
    let id = book(&app).await;

    let (status, charge) = request(
        &app.app,
        "POST",
        &format!("/v1/tickets/{}/charge", id),
        CUSTOMER,
        Some(json!({ "amount": "1500", "reference": "ch_1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(charge["kind"], "CARD_CHARGE");

    // Only the partner starts and completes the visit.
    let (status, _) = request(
        &app.app,
        "POST",
        &format!("/v1/tickets/{}/start", id),
        CUSTOMER,
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, started) = request(
        &app.app,
        "POST",
        &format!("/v1/tickets/{}/start", id),
        PARTNER,
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(started["status"], "IN_PROGRESS");

    let (status, payout) = request(
        &app.app,
        "POST",
        &format!("/v1/tickets/{}/complete", id),
        PARTNER,
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&payout["amount"]), Decimal::whole(1_200));

    let (status, ticket) = request(
        &app.app,
        "GET",
        &format!("/v1/tickets/{}", id),
        PARTNER,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ticket["status"], "COMPLETED");
    assert_eq!(ticket["payoutStatus"], "PAID");
    assert_eq!(ticket["entries"].as_array().unwrap().len(), 2);

    let notifier = Arc::new(MemoryNotifier::new());
    let dispatcher = OutboxDispatcher::new(app.repo.clone(), notifier.clone());
    let report = dispatcher.dispatch_pending(10).await.unwrap();
    assert_eq!(report.failed, 0);
    assert_eq!(notifier.delivered_to("partner-1").len(), 2);
}

#[tokio::test]
async fn test_charge_amount_must_match_price() {
    let app = setup_test_app().await;
    let id = book(&app).await;

    let (status, body) = request(
        &app.app,
        "POST",
        &format!("/v1/tickets/{}/charge", id),
        CUSTOMER,
        Some(json!({ "amount": "1000", "reference": "ch_1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION");
}

#[tokio::test]
async fn test_complete_before_start_conflicts() {
    let app = setup_test_app().await;
    let id = book(&app).await;

    let (status, body) = request(
        &app.app,
        "POST",
        &format!("/v1/tickets/{}/complete", id),
        PARTNER,
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");
}
