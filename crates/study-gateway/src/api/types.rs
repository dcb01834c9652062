//! API request/response types.

use credit_ledger::PlanTier;
use serde::{Deserialize, Serialize};

/// Chat request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub account_id: String,
    pub message: String,
}

/// Chat response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    /// Credits charged after reconciliation.
    pub credits_charged: f64,
    pub balance: f64,
    pub unlimited: bool,
    /// The request went through but was flagged for review.
    pub flagged: bool,
}

/// Image generation request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageRequest {
    pub account_id: String,
    pub prompt: String,
}

/// Image generation response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageResponse {
    pub url: String,
    pub credits_charged: f64,
    pub balance: f64,
    pub unlimited: bool,
    pub flagged: bool,
}

/// Quiz generation request.
#[derive(Debug, Serialize, Deserialize)]
pub struct QuizRequest {
    pub account_id: String,
    pub topic: String,
    #[serde(default = "default_question_count")]
    pub question_count: u32,
}

fn default_question_count() -> u32 {
    10
}

/// Notes generation request.
#[derive(Debug, Serialize, Deserialize)]
pub struct NotesRequest {
    pub account_id: String,
    pub topic: String,
}

/// Notes enhancement request.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnhanceRequest {
    pub account_id: String,
    pub notes: String,
}

/// Slideshow generation request.
#[derive(Debug, Serialize, Deserialize)]
pub struct SlideshowRequest {
    pub account_id: String,
    pub topic: String,
    #[serde(default = "default_slide_count")]
    pub slide_count: u32,
}

fn default_slide_count() -> u32 {
    8
}

/// Shared response for fixed-price generation features.
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub content: String,
    pub credits_charged: f64,
    pub balance: f64,
    pub unlimited: bool,
    pub flagged: bool,
}

/// Signup request.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignupRequest {
    pub account_id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub tier: PlanTier,
}

/// Signup response.
#[derive(Debug, Serialize, Deserialize)]
pub struct SignupResponse {
    pub account_id: String,
    pub tier: PlanTier,
    pub balance: f64,
}

/// Purchase webhook payload from the payments layer.
#[derive(Debug, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub account_id: String,
    /// Whole credits purchased.
    pub credits: u64,
    /// Payment processor reference.
    pub payment_ref: String,
    pub description: Option<String>,
}

/// Purchase response.
#[derive(Debug, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub transaction_id: String,
    pub new_balance: f64,
}

/// Refund request payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefundApiRequest {
    pub account_id: String,
    /// Whole credits to refund.
    pub credits: u64,
    pub reason: String,
}

/// Refund request response.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefundApiResponse {
    pub request_id: String,
    pub status: String,
    pub flagged: bool,
}

/// Balance response.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub account_id: String,
    pub balance: f64,
    pub unlimited: bool,
    pub total_purchased: f64,
    pub total_used: f64,
    pub tier: PlanTier,
}

/// One transaction in a history response.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionView {
    pub id: String,
    pub kind: String,
    /// Signed credit amount; negative for usage.
    pub amount: f64,
    pub balance_after: f64,
    pub description: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// History response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub account_id: String,
    pub transactions: Vec<TransactionView>,
}

/// Pricing response for one feature.
#[derive(Debug, Serialize, Deserialize)]
pub struct PricingResponse {
    pub feature: String,
    /// Flat credit price; absent for per-word features.
    pub flat_credits: Option<f64>,
    /// Exchange rate for per-word features.
    pub words_per_credit: u64,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub accounts: usize,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}
