//! Groq adapter for OpenAI-compatible chat completions.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, ProviderError};
use super::types::*;

// =============================================================================
// TRAIT
// =============================================================================

/// Trait for chat completion providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

// =============================================================================
// GROQ ADAPTER
// =============================================================================

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Maximum allowed response content length (1MB).
const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

/// Maximum allowed input characters.
const MAX_INPUT_CHARS: usize = 200_000;

/// Retry hint used when a 429 carries no usable Retry-After header.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(2);

const PROVIDER: &str = "groq";

/// Groq API adapter for chat completions.
#[derive(Debug, Clone)]
pub struct GroqAdapter {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl GroqAdapter {
    /// Create from API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_config(api_key, DEFAULT_BASE_URL, Duration::from_secs(60))
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("GROQ_API_KEY")
            .map_err(|_| ProviderError::config("GROQ_API_KEY not set"))?;

        let base_url =
            std::env::var("GROQ_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let timeout = std::env::var("GROQ_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(60));

        Self::with_config(api_key, base_url, timeout)
    }

    /// Create with custom configuration.
    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key.into();
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let auth_value = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| ProviderError::config("Invalid API key format"))?;
        headers.insert(AUTHORIZATION, auth_value);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/models", self.base_url)
    }

    /// Extract request ID from response headers.
    fn extract_request_id(headers: &HeaderMap) -> Option<String> {
        headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
    }

    fn extract_retry_after(headers: &HeaderMap) -> Option<Duration> {
        headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }

    fn map_send_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout, None)
        } else {
            ProviderError::Http(err)
        }
    }

    /// List the model ids available to this API key.
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let response = self
            .client
            .get(self.models_url())
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_send_error(e))?;
        if !status.is_success() {
            return Err(ProviderError::provider_with_context(
                PROVIDER,
                format!("HTTP {}", status.as_u16()),
                status.as_u16() >= 500,
                ErrorContext::new().with_status(status.as_u16()),
            ));
        }

        let parsed: ModelsApiResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::provider(PROVIDER, format!("Invalid JSON: {e}"), false))?;
        let mut ids: Vec<String> = parsed.data.into_iter().map(|m| m.id).collect();
        ids.sort();
        Ok(ids)
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

impl From<&Message> for ApiMessage {
    fn from(m: &Message) -> Self {
        Self {
            role: match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: m.content.clone(),
        }
    }
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Option<Vec<Choice>>,
    usage: Option<Usage>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

impl From<Usage> for TokenUsage {
    fn from(u: Usage) -> Self {
        let mut usage = TokenUsage::new(
            u.prompt_tokens.unwrap_or(0),
            u.completion_tokens.unwrap_or(0),
        );
        if let Some(total) = u.total_tokens {
            usage.total_tokens = total;
        }
        usage
    }
}

#[derive(Deserialize)]
struct ApiError {
    message: Option<String>,
    code: Option<String>,
}

#[derive(Deserialize)]
struct ModelsApiResponse {
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

// =============================================================================
// CHAT PROVIDER IMPL
// =============================================================================

#[async_trait]
impl ChatProvider for GroqAdapter {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let total_chars: usize = req.messages.iter().map(|m| m.content.len()).sum();

        if total_chars > MAX_INPUT_CHARS {
            return Err(ProviderError::invalid_request(format!(
                "Input too large: {total_chars} chars (max {MAX_INPUT_CHARS})"
            )));
        }

        let start = Instant::now();

        let messages: Vec<ApiMessage> = req.messages.iter().map(ApiMessage::from).collect();

        let api_req = ChatApiRequest {
            model: &req.model,
            messages: &messages,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            response_format: req.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let mut response = self
            .client
            .post(self.chat_url())
            .json(&api_req)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let request_id = Self::extract_request_id(response.headers());
        let retry_after = Self::extract_retry_after(response.headers());

        // Stream response to enforce size limit
        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.map_send_error(e))? {
            let new_len = bytes.len() + chunk.len();
            if new_len > MAX_RESPONSE_LEN {
                return Err(ProviderError::provider(
                    PROVIDER,
                    format!("Response too large: {new_len} bytes"),
                    false,
                ));
            }
            bytes.extend_from_slice(&chunk);
        }

        let body = String::from_utf8_lossy(&bytes).to_string();

        let ctx = ErrorContext::new().with_status(status.as_u16());
        let ctx = if let Some(id) = &request_id {
            ctx.with_request_id(id)
        } else {
            ctx
        };

        if !status.is_success() {
            let api_error = serde_json::from_str::<ChatApiResponse>(&body)
                .ok()
                .and_then(|parsed| parsed.error);
            let (message, ctx) = match api_error {
                Some(error) => {
                    let ctx = match error.code {
                        Some(code) => ctx.with_code(code),
                        None => ctx,
                    };
                    (error.message.unwrap_or_default(), ctx)
                }
                None => (format!("HTTP {}", status.as_u16()), ctx),
            };

            return Err(match status.as_u16() {
                429 => ProviderError::rate_limited(retry_after.unwrap_or(DEFAULT_RETRY_AFTER), ctx),
                code => ProviderError::provider_with_context(PROVIDER, message, code >= 500, ctx),
            });
        }

        let parsed: ChatApiResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::provider(PROVIDER, format!("Invalid JSON: {e}"), false))?;

        if let Some(error) = parsed.error {
            return Err(ProviderError::provider(
                PROVIDER,
                error.message.unwrap_or_default(),
                false,
            ));
        }

        let choice = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| ProviderError::provider(PROVIDER, "No choices in response", false))?;

        let content = choice
            .message
            .and_then(|m| m.content)
            .unwrap_or_default();

        Ok(ChatResponse {
            model: req.model.clone(),
            content,
            usage: parsed.usage.map(TokenUsage::from),
            latency: start.elapsed(),
            finish_reason: FinishReason::from(choice.finish_reason),
        })
    }
}
