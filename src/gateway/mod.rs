//! Model invocation gateway for chat completions.

pub mod error;
pub mod groq;
pub mod types;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::ledger::{UsageEvent, UsageLedger};

pub use error::{ErrorContext, ProviderError};
pub use groq::{ChatProvider, GroqAdapter};
pub use types::*;

/// Seam between orchestration code and the model backend.
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

/// Gateway that forwards to a [`ChatProvider`] and logs usage to a ledger.
///
/// Every invocation that comes back with token usage produces exactly one
/// [`UsageEvent`], tagged with the request attribution. Failed invocations
/// carry no usage and are not logged. The gateway never retries; retry and
/// fallback policy belong to the caller.
pub struct ProviderGateway {
    provider: Arc<dyn ChatProvider>,
    ledger: Arc<dyn UsageLedger>,
}

#[async_trait::async_trait]
impl ChatGateway for ProviderGateway {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        ProviderGateway::chat(self, req).await
    }
}

impl ProviderGateway {
    pub fn new(provider: Arc<dyn ChatProvider>, ledger: Arc<dyn UsageLedger>) -> Self {
        Self { provider, ledger }
    }

    pub fn from_env(ledger: Arc<dyn UsageLedger>) -> Result<Self, ProviderError> {
        let adapter = GroqAdapter::from_env()?;
        Ok(Self::new(Arc::new(adapter), ledger))
    }

    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        match self.provider.chat(&req).await {
            Ok(resp) => {
                self.record_usage(&req, &resp).await;
                Ok(resp)
            }
            Err(err) => {
                debug!(
                    model = %req.model,
                    tag = %req.attribution.tag,
                    code = err.code(),
                    error = %err,
                    "model invocation failed"
                );
                Err(err)
            }
        }
    }

    async fn record_usage(&self, req: &ChatRequest, resp: &ChatResponse) {
        let Some(usage) = resp.usage else {
            debug!(model = %req.model, "provider reported no usage; skipping ledger write");
            return;
        };

        let event = UsageEvent::new(
            req.model.as_str(),
            usage,
            resp.latency.as_secs_f64(),
            req.attribution.tag.to_string(),
        )
        .run(req.attribution.run_id);

        if let Err(err) = self.ledger.record(event).await {
            warn!(model = %req.model, error = %err, "failed to record usage event");
        }
    }
}
