use axum::http::StatusCode;
use escrow_gateway::api;
use escrow_gateway::config::{ComplianceThresholds, Config};
use escrow_gateway::db::init_db;
use escrow_gateway::domain::{AuditKind, Decimal, SettlementStatus, VehicleState};
use escrow_gateway::screening::MockWatchlist;
use escrow_gateway::theft::MockTheftRegistry;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

const VIN: &str = "1HGCM82633A004352";

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

    let mut config = Config::sandbox(db_path);
    config.thresholds = ComplianceThresholds {
        uma_value: Decimal::whole(100),
        identification_umas: 3600,
        notice_umas: 7200,
    };

    let state = api::AppState::new(
        repo.clone(),
        config,
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
    actor: Option<(&str, &str)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    if let Some((id, role)) = actor {
        builder = builder.header("x-actor-id", id).header("x-actor-role", role);
    }
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
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn buyer() -> Option<(&'static str, &'static str)> {
    Some(("buyer-1", "buyer"))
}

fn seller() -> Option<(&'static str, &'static str)> {
    Some(("seller-1", "seller"))
}

fn admin() -> Option<(&'static str, &'static str)> {
    Some(("admin-1", "admin"))
}

fn new_transaction(seller_name: &str, vin: &str, price: &str) -> Value {
    json!({
        "vehicleId": "veh-1",
        "vehicleVin": vin,
        "buyerId": "buyer-1",
        "seller": { "id": "seller-1", "name": seller_name },
        "price": price,
    })
}

fn money(value: &Value) -> Decimal {
    serde_json::from_value(value.clone()).unwrap()
}

async fn create(app: &TestApp, seller_name: &str, vin: &str, price: &str) -> (StatusCode, Value) {
    request(
        &app.app,
        "POST",
        "/v1/transactions",
        buyer(),
        Some(new_transaction(seller_name, vin, price)),
    )
    .await
}

#[tokio::test]
async fn test_full_escrow_lifecycle() {
    let app = setup_test_app().await;

    let (status, created) = create(&app, "Juan Perez", VIN, "100000").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "PENDING");
    assert_eq!(created["complianceStatus"], "APPROVED");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, funded) = request(
        &app.app,
        "POST",
        "/v1/funding/confirm",
        None,
        Some(json!({ "transaction": id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(funded["transaction"]["status"], "IN_VAULT");
    assert_eq!(money(&funded["settlement"]["platformFee"]), Decimal::whole(4_000));
    assert_eq!(money(&funded["settlement"]["sellerPayout"]), Decimal::whole(96_000));
    assert_eq!(funded["certificate"]["report"]["status"], "CLEAN");

    let (status, issued) = request(
        &app.app,
        "POST",
        &format!("/v1/transactions/{}/handover-token", id),
        buyer(),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let token = issued["token"].as_str().unwrap().to_string();

    let (status, released) = request(
        &app.app,
        "POST",
        &format!("/v1/transactions/{}/handover", id),
        seller(),
        Some(json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(released["transaction"]["status"], "RELEASED");
    assert_eq!(money(&released["sellerPayout"]), Decimal::whole(96_000));

    let (status, replay) = request(
        &app.app,
        "POST",
        &format!("/v1/transactions/{}/handover", id),
        seller(),
        Some(json!({ "token": token })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(replay["code"], "INVALID_TOKEN");

    let settlement = app.repo.get_settlement(&id).await.unwrap().unwrap();
    assert_eq!(settlement.status, SettlementStatus::Disbursed);
    let vehicle = app.repo.get_vehicle("veh-1").await.unwrap().unwrap();
    assert_eq!(vehicle.state, VehicleState::Sold);
    assert_eq!(vehicle.owner_id, "buyer-1");
}

#[tokio::test]
async fn test_kyc_threshold_is_strictly_greater_than() {
    let app = setup_test_app().await;

    let (status, body) = create(&app, "Juan Perez", VIN, "400000").await;
    assert_eq!(status, StatusCode::PRECONDITION_REQUIRED);
    assert_eq!(body["code"], "KYC_REQUIRED");
    assert_eq!(body["retryable"], false);

    let (status, body) = create(&app, "Juan Perez", VIN, "360000").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["requiresRegulatoryNotice"], false);
}

#[tokio::test]
async fn test_kyc_verified_seller_can_exceed_threshold() {
    let app = setup_test_app().await;

    let (status, _) = request(
        &app.app,
        "POST",
        "/v1/profiles/seller-1/kyc",
        seller(),
        Some(json!({ "name": "Juan Perez" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, profile) = request(
        &app.app,
        "POST",
        "/v1/profiles/seller-1/kyc",
        admin(),
        Some(json!({ "name": "Juan Perez" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["kycStatus"], "VERIFIED");

    let (status, body) = create(&app, "Juan Perez", VIN, "800000").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["requiresRegulatoryNotice"], true);
}

#[tokio::test]
async fn test_sanctioned_seller_is_blocked_without_record() {
    let app = setup_test_app().await;

    let (status, body) = create(&app, "Blocked Alias", VIN, "100000").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "COMPLIANCE_BLOCKED");

    let (_, stats) = request(&app.app, "GET", "/v1/stats", admin(), None).await;
    assert_eq!(stats["transactionCount"], 0);
    assert_eq!(
        app.repo
            .count_audit("seller-1", AuditKind::BlockedAttempt)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_stolen_vehicle_never_reaches_vault() {
    let app = setup_test_app().await;

    let (_, created) = create(&app, "Juan Perez", "3VWSTOLEN00000001", "100000").await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, body) = request(
        &app.app,
        "POST",
        "/v1/funding/confirm",
        None,
        Some(json!({ "transaction": id })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "FRAUD_DETECTED");

    let (status, view) = request(
        &app.app,
        "GET",
        &format!("/v1/transactions/{}", id),
        buyer(),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "PENDING");
    assert_eq!(view["complianceStatus"], "BLOCKED_RISK");
    assert!(view.get("settlement").is_none());
}

#[tokio::test]
async fn test_update_services_is_idempotent() {
    let app = setup_test_app().await;
    let (_, created) = create(&app, "Juan Perez", VIN, "100000").await;
    let id = created["id"].as_str().unwrap().to_string();

    let services = json!({ "insurance": "2500", "logistics": "3000" });
    for _ in 0..2 {
        let (status, body) = request(
            &app.app,
            "PUT",
            &format!("/v1/transactions/{}/services", id),
            buyer(),
            Some(services.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "PENDING");
    }

    let (_, view) = request(
        &app.app,
        "GET",
        &format!("/v1/transactions/{}", id),
        seller(),
        None,
    )
    .await;
    assert_eq!(view["addOnOrders"].as_array().unwrap().len(), 2);
    assert_eq!(money(&view["addOns"]["insurance"]), Decimal::whole(2_500));
}

#[tokio::test]
async fn test_strangers_cannot_read_transactions() {
    let app = setup_test_app().await;
    let (_, created) = create(&app, "Juan Perez", VIN, "100000").await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, _) = request(
        &app.app,
        "GET",
        &format!("/v1/transactions/{}", id),
        Some(("someone-else", "buyer")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = request(
        &app.app,
        "GET",
        &format!("/v1/transactions/{}", id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_override_requires_admin() {
    let app = setup_test_app().await;
    let (_, created) = create(&app, "Juan Perez", VIN, "100000").await;
    let id = created["id"].as_str().unwrap().to_string();
    let uri = format!("/v1/admin/transactions/{}/status", id);

    let (status, body) = request(
        &app.app,
        "POST",
        &uri,
        buyer(),
        Some(json!({ "status": "RELEASED" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, body) = request(
        &app.app,
        "POST",
        &uri,
        admin(),
        Some(json!({ "status": "CANCELLED", "reason": "duplicate listing" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CANCELLED");
    assert_eq!(
        app.repo
            .count_audit(&id, AuditKind::ManualOverride)
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_cancel_after_funding_refunds() {
    let app = setup_test_app().await;
    let (_, created) = create(&app, "Juan Perez", VIN, "100000").await;
    let id = created["id"].as_str().unwrap().to_string();

    request(
        &app.app,
        "POST",
        &format!("/v1/transactions/{}/checkout-session", id),
        buyer(),
        Some(json!({ "sessionId": "cs_test_42" })),
    )
    .await;
    let (status, _) = request(
        &app.app,
        "POST",
        "/v1/funding/confirm",
        None,
        Some(json!({ "checkoutSession": "cs_test_42" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = request(
        &app.app,
        "POST",
        &format!("/v1/transactions/{}/cancel", id),
        seller(),
        Some(json!({ "reason": "buyer no-show" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CANCELLED");

    let settlement = app.repo.get_settlement(&id).await.unwrap().unwrap();
    assert_eq!(settlement.status, SettlementStatus::Refunded);

    let (status, body) = request(
        &app.app,
        "POST",
        &format!("/v1/transactions/{}/cancel", id),
        seller(),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");
}

#[tokio::test]
async fn test_stats_are_admin_only() {
    let app = setup_test_app().await;
    create(&app, "Juan Perez", VIN, "100000").await;

    let (status, _) = request(&app.app, "GET", "/v1/stats", buyer(), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, stats) = request(&app.app, "GET", "/v1/stats", admin(), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&stats["gmv"]), Decimal::whole(100_000));
    assert_eq!(money(&stats["commission"]), Decimal::whole(4_000));
    assert_eq!(stats["byStatus"]["PENDING"], 1);
}
