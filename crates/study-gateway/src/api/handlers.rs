//! HTTP API handlers.
//!
//! Every paid endpoint follows the same shape: estimate the cost, ask the
//! gate to authorize (which charges the estimate), call the provider, and
//! for variable-cost features reconcile against the measured cost. A
//! provider failure after the charge refunds the estimate.

use super::types::*;
use crate::error::AppError;
use crate::provider::CompletionProvider;
use access_gate::{AccessGate, BalanceView, Decision, Reconciliation};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use credit_ledger::{actual_chat_cost, estimate_chat_cost, Credits, Feature, Ledger, LedgerError};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Shared application state for handlers.
pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub gate: Arc<AccessGate>,
    pub provider: Arc<dyn CompletionProvider>,
}

impl AppState {
    pub fn new(
        ledger: Arc<Ledger>,
        gate: Arc<AccessGate>,
        provider: Arc<dyn CompletionProvider>,
    ) -> Self {
        Self {
            ledger,
            gate,
            provider,
        }
    }
}

/// Create the gateway API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/signup", post(signup))
        .route("/v1/chat", post(chat))
        .route("/v1/images", post(generate_image))
        .route("/v1/quizzes", post(generate_quiz))
        .route("/v1/notes", post(generate_notes))
        .route("/v1/notes/enhance", post(enhance_notes))
        .route("/v1/slideshows", post(generate_slideshow))
        .route("/v1/balance/:account_id", get(get_balance))
        .route("/v1/history/:account_id", get(get_history))
        .route("/v1/pricing/:feature", get(get_pricing))
        .route("/v1/purchases", post(record_purchase))
        .route("/v1/refunds", post(request_refund))
        .with_state(state)
}

/// Response for a denied authorization.
fn denial(decision: Decision, reason: Option<&str>) -> Response {
    let reason = reason.unwrap_or("request denied");
    let (status, code) = match decision {
        Decision::Ban => (StatusCode::FORBIDDEN, "ACCOUNT_BANNED"),
        Decision::Block if reason == "insufficient credits" => {
            (StatusCode::PAYMENT_REQUIRED, "INSUFFICIENT_CREDITS")
        }
        _ => (StatusCode::FORBIDDEN, "RISK_BLOCKED"),
    };
    (status, Json(ErrorResponse::new(reason, code))).into_response()
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        accounts: state.ledger.account_count().await,
    })
}

/// Screen and create an account.
async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<Response, AppError> {
    let outcome = state
        .gate
        .signup(&request.account_id, request.email, request.tier)
        .await?;

    let Some(account) = outcome.account else {
        return Ok(denial(outcome.decision, outcome.reason.as_deref()));
    };

    info!("Signed up {} on the {} tier", account.id, account.tier);

    Ok(Json(SignupResponse {
        account_id: account.id,
        tier: account.tier,
        balance: account.balance.as_f64(),
    })
    .into_response())
}

/// Chat tutoring. Charged per word: the estimate is debited up front and
/// reconciled against the real response length afterwards.
async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let estimate = estimate_chat_cost(&request.message);
    let auth = state
        .gate
        .authorize(&request.account_id, Feature::Chat, estimate.estimated_credits)
        .await?;

    if !auth.is_allowed() {
        return Ok(denial(auth.decision, auth.reason.as_deref()));
    }

    let reply = match state.provider.complete(&request.message).await {
        Ok(reply) => reply,
        Err(e) => {
            // The response never arrived; hand the estimate back.
            if let Some(receipt) = &auth.receipt {
                state
                    .gate
                    .reconcile(&request.account_id, receipt, Credits::ZERO)
                    .await?;
            }
            return Err(e.into());
        }
    };

    let usage = actual_chat_cost(&request.message, &reply);

    let (credits_charged, balance) = match &auth.receipt {
        Some(receipt) => {
            let outcome = state
                .gate
                .reconcile(&request.account_id, receipt, usage.credits_used)
                .await?;
            let charged = match outcome {
                Reconciliation::Settled => receipt.charged,
                Reconciliation::Charged { amount, .. } => receipt.charged.saturating_add(amount),
                Reconciliation::Refunded { amount } => receipt.charged.saturating_sub(amount),
            };
            (charged, state.gate.balance(&request.account_id).await?)
        }
        // Admin bypass: nothing was charged and nothing reconciles.
        None => (Credits::ZERO, auth.balance),
    };

    Ok(Json(ChatResponse {
        reply,
        credits_charged: credits_charged.as_f64(),
        balance: balance.display_credits().as_f64(),
        unlimited: balance == BalanceView::Unlimited,
        flagged: auth.decision == Decision::Warn,
    })
    .into_response())
}

/// Image generation. Flat price.
async fn generate_image(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImageRequest>,
) -> Result<Response, AppError> {
    let cost = flat_cost(Feature::ImageGeneration)?;
    let auth = state
        .gate
        .authorize(&request.account_id, Feature::ImageGeneration, cost)
        .await?;

    if !auth.is_allowed() {
        return Ok(denial(auth.decision, auth.reason.as_deref()));
    }

    let url = match state.provider.generate_image(&request.prompt).await {
        Ok(url) => url,
        Err(e) => {
            if let Some(receipt) = &auth.receipt {
                state
                    .gate
                    .reconcile(&request.account_id, receipt, Credits::ZERO)
                    .await?;
            }
            return Err(e.into());
        }
    };

    Ok(Json(ImageResponse {
        url,
        credits_charged: charged_amount(&auth, cost).as_f64(),
        balance: auth.balance.display_credits().as_f64(),
        unlimited: auth.balance == BalanceView::Unlimited,
        flagged: auth.decision == Decision::Warn,
    })
    .into_response())
}

/// Quiz generation. Flat price.
async fn generate_quiz(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuizRequest>,
) -> Result<Response, AppError> {
    let prompt = format!(
        "Generate a {}-question multiple-choice quiz about {}. \
         Include an answer key at the end.",
        request.question_count, request.topic
    );
    generate_content(&state, &request.account_id, Feature::QuizGeneration, &prompt).await
}

/// Study notes generation. Flat price.
async fn generate_notes(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NotesRequest>,
) -> Result<Response, AppError> {
    let prompt = format!(
        "Write structured study notes about {}. Use headings and bullet \
         points, and end with a short summary.",
        request.topic
    );
    generate_content(&state, &request.account_id, Feature::NoteGeneration, &prompt).await
}

/// Notes enhancement. Flat price.
async fn enhance_notes(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EnhanceRequest>,
) -> Result<Response, AppError> {
    let prompt = format!(
        "Improve these study notes: fix structure, expand thin sections \
         and add examples where helpful.\n\n{}",
        request.notes
    );
    generate_content(&state, &request.account_id, Feature::NoteEnhancement, &prompt).await
}

/// Slideshow generation. Flat price.
async fn generate_slideshow(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SlideshowRequest>,
) -> Result<Response, AppError> {
    let prompt = format!(
        "Outline a {}-slide presentation about {}. For each slide give a \
         title and 3-4 bullet points.",
        request.slide_count, request.topic
    );
    generate_content(&state, &request.account_id, Feature::SlideshowGeneration, &prompt).await
}

/// Shared flow for fixed-price text generation features.
async fn generate_content(
    state: &AppState,
    account_id: &str,
    feature: Feature,
    prompt: &str,
) -> Result<Response, AppError> {
    let cost = flat_cost(feature)?;
    let auth = state.gate.authorize(account_id, feature, cost).await?;

    if !auth.is_allowed() {
        return Ok(denial(auth.decision, auth.reason.as_deref()));
    }

    let content = match state.provider.complete(prompt).await {
        Ok(content) => content,
        Err(e) => {
            if let Some(receipt) = &auth.receipt {
                state.gate.reconcile(account_id, receipt, Credits::ZERO).await?;
            }
            return Err(e.into());
        }
    };

    Ok(Json(GenerationResponse {
        content,
        credits_charged: charged_amount(&auth, cost).as_f64(),
        balance: auth.balance.display_credits().as_f64(),
        unlimited: auth.balance == BalanceView::Unlimited,
        flagged: auth.decision == Decision::Warn,
    })
    .into_response())
}

/// Flat price for a feature; a per-word feature reaching this path is a
/// routing bug.
fn flat_cost(feature: Feature) -> Result<Credits, AppError> {
    feature
        .flat_cost()
        .ok_or_else(|| AppError::Ledger(LedgerError::UnknownFeature(feature.to_string())))
}

/// What the request actually cost the account (zero for admin bypass).
fn charged_amount(auth: &access_gate::Authorization, cost: Credits) -> Credits {
    if auth.receipt.is_some() {
        cost
    } else {
        Credits::ZERO
    }
}

/// Get displayable balance for an account.
async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> Result<Json<BalanceResponse>, AppError> {
    let account = state.ledger.account(&account_id).await?;
    let view = state.gate.balance(&account_id).await?;

    Ok(Json(BalanceResponse {
        account_id,
        balance: view.display_credits().as_f64(),
        unlimited: view == BalanceView::Unlimited,
        total_purchased: account.total_purchased.as_f64(),
        total_used: account.total_used.as_f64(),
        tier: account.tier,
    }))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

/// Recent transactions, newest first.
async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, AppError> {
    let limit = params.limit.unwrap_or(20);
    let transactions = state
        .ledger
        .history(&account_id, limit)
        .await?
        .into_iter()
        .map(|tx| TransactionView {
            id: tx.id,
            kind: tx.kind.to_string(),
            amount: tx.amount_tenths as f64 / 10.0,
            balance_after: tx.balance_after.as_f64(),
            description: tx.description,
            created_at: tx.created_at,
        })
        .collect();

    Ok(Json(HistoryResponse {
        account_id,
        transactions,
    }))
}

/// Price for a feature by name. Unknown names are a 400, not a panic.
async fn get_pricing(Path(feature): Path<String>) -> Result<Json<PricingResponse>, AppError> {
    let feature: Feature = feature.parse()?;

    Ok(Json(PricingResponse {
        feature: feature.to_string(),
        flat_credits: feature.flat_cost().map(|c| c.as_f64()),
        words_per_credit: credit_ledger::WORDS_PER_CREDIT,
    }))
}

/// Purchase webhook from the payments layer. The processor has already
/// moved the money; this only credits the ledger.
async fn record_purchase(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>, AppError> {
    let receipt = state
        .ledger
        .credit(
            &request.account_id,
            Credits::from_whole(request.credits),
            credit_ledger::TransactionKind::Purchase,
            request.description.as_deref().unwrap_or("Credit purchase"),
            Some(request.payment_ref),
        )
        .await?;

    Ok(Json(PurchaseResponse {
        transaction_id: receipt.transaction_id,
        new_balance: receipt.new_balance.as_f64(),
    }))
}

/// File a refund request. Runs the refund-abuse risk path first.
async fn request_refund(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefundApiRequest>,
) -> Result<Response, AppError> {
    let decision = state
        .gate
        .request_refund(
            &request.account_id,
            Credits::from_whole(request.credits),
            &request.reason,
        )
        .await?;

    let Some(refund) = decision.request else {
        return Ok(denial(decision.decision, decision.reason.as_deref()));
    };

    Ok(Json(RefundApiResponse {
        request_id: refund.id,
        status: "pending".into(),
        flagged: decision.decision == Decision::Warn,
    })
    .into_response())
}
