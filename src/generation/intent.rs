//! Reduce free-form input to a short canonical topic.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use super::parse::parse_topic;
use super::InvocationLimiter;
use crate::gateway::{Attribution, ChatGateway, ChatRequest};
use crate::prompts::intent_prompt;

pub const INTENT_TAG: &str = "intent";

pub struct IntentExtractor {
    gateway: Arc<dyn ChatGateway>,
    limiter: InvocationLimiter,
    model: String,
}

impl IntentExtractor {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        limiter: InvocationLimiter,
        model: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            limiter,
            model: model.into(),
        }
    }

    /// Extracted topic, or `raw_input` unchanged on any failure.
    pub async fn extract(&self, raw_input: &str, run_id: Option<Uuid>) -> String {
        let req = ChatRequest::new(
            self.model.as_str(),
            intent_prompt(raw_input).to_messages(),
            Attribution::new(INTENT_TAG).with_run(run_id),
        )
        .temperature(0.1)
        .json();

        let response = {
            let Ok(_permit) = self.limiter.acquire().await else {
                return raw_input.to_string();
            };
            self.gateway.chat(req).await
        };

        match response.map(|resp| parse_topic(&resp.content)) {
            Ok(Ok(topic)) => {
                debug!(topic = %topic, "extracted topic");
                topic
            }
            Ok(Err(err)) => {
                warn!(model = %self.model, error = %err, "unparseable intent response; using raw input");
                raw_input.to_string()
            }
            Err(err) => {
                warn!(model = %self.model, error = %err, "intent extraction failed; using raw input");
                raw_input.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{ChatResponse, FinishReason, ProviderError};
    use async_trait::async_trait;
    use std::time::Duration;

    struct Canned(Result<&'static str, ()>);

    #[async_trait]
    impl ChatGateway for Canned {
        async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
            assert_eq!(req.attribution.tag, INTENT_TAG);
            assert!(req.json_mode);
            match self.0 {
                Ok(content) => Ok(ChatResponse {
                    model: req.model,
                    content: content.to_string(),
                    usage: None,
                    latency: Duration::ZERO,
                    finish_reason: FinishReason::Stop,
                }),
                Err(()) => Err(ProviderError::provider("test", "boom", false)),
            }
        }
    }

    fn extractor(reply: Result<&'static str, ()>) -> IntentExtractor {
        IntentExtractor::new(Arc::new(Canned(reply)), InvocationLimiter::new(1), "small")
    }

    #[tokio::test]
    async fn returns_extracted_topic() {
        let topic = extractor(Ok(r#"{"topic": "Python"}"#))
            .extract("I want to learn Python basics", None)
            .await;
        assert_eq!(topic, "Python");
    }

    #[tokio::test]
    async fn falls_back_to_raw_input() {
        let raw = "I want to learn Python basics";
        assert_eq!(extractor(Err(())).extract(raw, None).await, raw);
        assert_eq!(extractor(Ok("no json here")).extract(raw, None).await, raw);
        assert_eq!(extractor(Ok(r#"{"topic": ""}"#)).extract(raw, None).await, raw);
    }
}
