//! OpenAI-compatible model provider client.
//!
//! The gateway only needs two operations from the upstream provider:
//! text completion and image generation. Both retry transient failures
//! with exponential backoff; authentication errors and empty responses
//! are surfaced immediately.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};

const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;
const DEFAULT_MAX_BACKOFF_MS: u64 = 5000;

/// Errors from the upstream model provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Authentication failed")]
    Unauthorized,

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Empty response from model")]
    EmptyResponse,

    #[error("Response parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ProviderError {
    /// Errors not worth retrying.
    fn is_permanent(&self) -> bool {
        matches!(self, ProviderError::Unauthorized | ProviderError::EmptyResponse)
    }
}

/// The interface the feature handlers consume. The upstream service is
/// billed separately; only the text/image results matter here.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Generate a completion for the prompt.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Generate an image, returning its URL.
    async fn generate_image(&self, prompt: &str) -> Result<String, ProviderError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct ImageRequest {
    model: String,
    prompt: String,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
}

/// OpenAI-compatible HTTP client.
///
/// The API key is stored as a `SecretString` to keep it out of logs and
/// debug output.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    image_model: String,
    max_retries: u32,
}

impl OpenAiProvider {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        image_model: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: SecretString::new(api_key.into()),
            model: model.into(),
            image_model: image_model.into(),
            max_retries,
        })
    }

    async fn chat_once(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".into(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        let chat: ChatResponse = handle_response(response).await?;

        chat.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }

    async fn image_once(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = ImageRequest {
            model: self.image_model.clone(),
            prompt: prompt.to_string(),
            n: 1,
        };

        let response = self
            .client
            .post(format!("{}/images/generations", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        let images: ImageResponse = handle_response(response).await?;

        images
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .ok_or(ProviderError::EmptyResponse)
    }

    /// Run an operation with bounded retry and exponential backoff.
    async fn with_retry<F, Fut>(&self, mut operation: F) -> Result<String, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<String, ProviderError>>,
    {
        let mut backoff_ms = DEFAULT_INITIAL_BACKOFF_MS;
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("Retry attempt {} after {}ms backoff", attempt, backoff_ms);
                sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(DEFAULT_MAX_BACKOFF_MS);
            }

            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_permanent() => return Err(e),
                Err(e) => {
                    warn!("Provider request failed (attempt {}): {}", attempt + 1, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(ProviderError::Api {
            status: 0,
            message: "Max retries exceeded".into(),
        }))
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.with_retry(|| self.chat_once(prompt)).await
    }

    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn generate_image(&self, prompt: &str) -> Result<String, ProviderError> {
        self.with_retry(|| self.image_once(prompt)).await
    }
}

/// Decode a response body, converting error statuses appropriately.
async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = response.status();

    if status.is_success() {
        let body = response.text().await?;
        debug!("Provider response: {}", &body[..body.len().min(200)]);
        serde_json::from_str(&body).map_err(ProviderError::from)
    } else {
        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Provider rate limit exceeded");
                Err(ProviderError::RateLimit)
            }
            StatusCode::UNAUTHORIZED => {
                warn!("Provider authentication failed");
                Err(ProviderError::Unauthorized)
            }
            _ => {
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".into());
                Err(ProviderError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str, max_retries: u32) -> OpenAiProvider {
        OpenAiProvider::new(
            "test-key",
            base_url,
            "gpt-4o-mini",
            "dall-e-3",
            Duration::from_secs(5),
            max_retries,
        )
        .unwrap()
    }

    fn chat_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    #[tokio::test]
    async fn complete_returns_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("Photosynthesis is...")))
            .mount(&server)
            .await;

        let provider = provider(&server.uri(), 0);
        let reply = provider.complete("Explain photosynthesis").await.unwrap();

        assert_eq!(reply, "Photosynthesis is...");
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("recovered")))
            .mount(&server)
            .await;

        let provider = provider(&server.uri(), 3);
        let reply = provider.complete("hello").await.unwrap();

        assert_eq!(reply, "recovered");
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        let mock = Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount_as_scoped(&server)
            .await;

        let provider = provider(&server.uri(), 3);
        let result = provider.complete("hello").await;

        assert!(matches!(result, Err(ProviderError::Unauthorized)));
        drop(mock);
    }

    #[tokio::test]
    async fn retries_exhaust_into_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let provider = provider(&server.uri(), 1);
        let result = provider.complete("hello").await;

        assert!(matches!(result, Err(ProviderError::Api { status: 503, .. })));
    }

    #[tokio::test]
    async fn image_generation_returns_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/images/generations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{ "url": "https://images.example/abc.png" }]
            })))
            .mount(&server)
            .await;

        let provider = provider(&server.uri(), 0);
        let url = provider.generate_image("a tidy study desk").await.unwrap();

        assert_eq!(url, "https://images.example/abc.png");
    }
}
