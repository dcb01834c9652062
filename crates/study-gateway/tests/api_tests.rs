//! Integration tests for the gateway API.

use access_gate::{AccessGate, GateConfig};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use credit_ledger::{Credits, Ledger, LedgerConfig};
use risk_engine::ActivityTracker;
use std::sync::Arc;
use std::time::Duration;
use study_gateway::api::{create_router, AppState};
use study_gateway::{CompletionProvider, ProviderError};
use tower::ServiceExt;

/// Provider stub with deterministic word counts.
struct StubProvider;

#[async_trait]
impl CompletionProvider for StubProvider {
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        // 7 words.
        Ok("here is a short deterministic test reply".into())
    }

    async fn generate_image(&self, _prompt: &str) -> Result<String, ProviderError> {
        Ok("https://images.example/generated.png".into())
    }
}

/// Provider stub that always fails.
struct BrokenProvider;

#[async_trait]
impl CompletionProvider for BrokenProvider {
    async fn complete(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Api {
            status: 503,
            message: "upstream down".into(),
        })
    }

    async fn generate_image(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(ProviderError::Api {
            status: 503,
            message: "upstream down".into(),
        })
    }
}

fn test_app_with(provider: Arc<dyn CompletionProvider>) -> (Router, Arc<Ledger>) {
    let ledger = Ledger::in_memory(LedgerConfig::default());
    let activity = ActivityTracker::new(Duration::from_secs(3600));
    let gate = Arc::new(AccessGate::new(
        ledger.clone(),
        activity,
        GateConfig::default(),
    ));
    let state = Arc::new(AppState::new(ledger.clone(), gate, provider));
    (create_router(state), ledger)
}

fn test_app() -> (Router, Arc<Ledger>) {
    test_app_with(Arc::new(StubProvider))
}

async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn signup(app: &Router, account_id: &str) {
    let (status, _) = post_json(
        app,
        "/v1/signup",
        serde_json::json!({
            "account_id": account_id,
            "email": "student@university.edu",
            "tier": "starter"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _ledger) = test_app();

    let (status, json) = get_json(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["accounts"], 0);
}

#[tokio::test]
async fn signup_grants_credits() {
    let (app, ledger) = test_app();

    let (status, json) = post_json(
        &app,
        "/v1/signup",
        serde_json::json!({ "account_id": "acct-1", "email": "student@university.edu" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["balance"], 100.0);
    assert_eq!(json["tier"], "free");
    assert_eq!(
        ledger.balance("acct-1").await.unwrap(),
        Credits::from_whole(100)
    );
}

#[tokio::test]
async fn disposable_signup_is_rejected() {
    let (app, _ledger) = test_app();

    let (status, json) = post_json(
        &app,
        "/v1/signup",
        serde_json::json!({ "account_id": "acct-1", "email": "abuser@tempmail.com" }),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "RISK_BLOCKED");
}

#[tokio::test]
async fn chat_charges_actual_cost() {
    let (app, ledger) = test_app();
    signup(&app, "acct-1").await;

    // 3 input words; the stub reply is 7 words. 10 words = 0.1 credits.
    let (status, json) = post_json(
        &app,
        "/v1/chat",
        serde_json::json!({ "account_id": "acct-1", "message": "explain quantum entanglement" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["credits_charged"], 0.1);
    assert_eq!(json["balance"], 99.9);
    assert_eq!(json["flagged"], false);
    assert_eq!(
        ledger.balance("acct-1").await.unwrap(),
        Credits::from_tenths(999)
    );
}

#[tokio::test]
async fn chat_for_unknown_account_is_not_found() {
    let (app, _ledger) = test_app();

    let (status, json) = post_json(
        &app,
        "/v1/chat",
        serde_json::json!({ "account_id": "missing", "message": "hello" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "ACCOUNT_NOT_FOUND");
}

#[tokio::test]
async fn image_generation_needs_credits() {
    let (app, ledger) = test_app();
    signup(&app, "acct-1").await;

    // Images cost 150.0 against a 100.0 starting balance.
    let (status, json) = post_json(
        &app,
        "/v1/images",
        serde_json::json!({ "account_id": "acct-1", "prompt": "a tidy study desk" }),
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(json["code"], "INSUFFICIENT_CREDITS");
    assert_eq!(
        ledger.balance("acct-1").await.unwrap(),
        Credits::from_whole(100)
    );
}

#[tokio::test]
async fn purchase_then_image_generation() {
    let (app, _ledger) = test_app();
    signup(&app, "acct-1").await;

    let (status, json) = post_json(
        &app,
        "/v1/purchases",
        serde_json::json!({
            "account_id": "acct-1",
            "credits": 1000,
            "payment_ref": "pay_123"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["new_balance"], 1100.0);

    let (status, json) = post_json(
        &app,
        "/v1/images",
        serde_json::json!({ "account_id": "acct-1", "prompt": "a tidy study desk" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["url"], "https://images.example/generated.png");
    assert_eq!(json["credits_charged"], 150.0);
    assert_eq!(json["balance"], 950.0);
}

#[tokio::test]
async fn quiz_generation_charges_flat_price() {
    let (app, ledger) = test_app();
    signup(&app, "acct-1").await;

    let (status, json) = post_json(
        &app,
        "/v1/quizzes",
        serde_json::json!({ "account_id": "acct-1", "topic": "photosynthesis" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["credits_charged"], 30.0);
    assert_eq!(
        ledger.balance("acct-1").await.unwrap(),
        Credits::from_whole(70)
    );
}

#[tokio::test]
async fn provider_failure_refunds_the_estimate() {
    let (app, ledger) = test_app_with(Arc::new(BrokenProvider));
    signup(&app, "acct-1").await;

    let (status, _json) = post_json(
        &app,
        "/v1/quizzes",
        serde_json::json!({ "account_id": "acct-1", "topic": "photosynthesis" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    // The flat charge was handed back when the provider failed.
    assert_eq!(
        ledger.balance("acct-1").await.unwrap(),
        Credits::from_whole(100)
    );
}

#[tokio::test]
async fn history_lists_transactions_newest_first() {
    let (app, _ledger) = test_app();
    signup(&app, "acct-1").await;

    post_json(
        &app,
        "/v1/quizzes",
        serde_json::json!({ "account_id": "acct-1", "topic": "photosynthesis" }),
    )
    .await;

    let (status, json) = get_json(&app, "/v1/history/acct-1?limit=10").await;

    assert_eq!(status, StatusCode::OK);
    let transactions = json["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0]["kind"], "usage");
    assert_eq!(transactions[0]["amount"], -30.0);
    assert_eq!(transactions[1]["kind"], "bonus");
}

#[tokio::test]
async fn balance_endpoint_reports_totals() {
    let (app, _ledger) = test_app();
    signup(&app, "acct-1").await;

    post_json(
        &app,
        "/v1/notes",
        serde_json::json!({ "account_id": "acct-1", "topic": "mitosis" }),
    )
    .await;

    let (status, json) = get_json(&app, "/v1/balance/acct-1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["balance"], 75.0);
    assert_eq!(json["total_used"], 25.0);
    assert_eq!(json["unlimited"], false);
}

#[tokio::test]
async fn pricing_for_known_and_unknown_features() {
    let (app, _ledger) = test_app();

    let (status, json) = get_json(&app, "/v1/pricing/image_generation").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["flat_credits"], 150.0);

    let (status, json) = get_json(&app, "/v1/pricing/chat").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["flat_credits"], serde_json::Value::Null);
    assert_eq!(json["words_per_credit"], 100);

    let (status, json) = get_json(&app, "/v1/pricing/music_generation").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "UNKNOWN_FEATURE");
}

#[tokio::test]
async fn refund_request_is_recorded() {
    let (app, ledger) = test_app();
    signup(&app, "acct-1").await;

    let (status, json) = post_json(
        &app,
        "/v1/refunds",
        serde_json::json!({
            "account_id": "acct-1",
            "credits": 50,
            "reason": "Accidental purchase"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "pending");
    assert_eq!(ledger.refund_requests("acct-1").await.unwrap().len(), 1);
}
