//! One batch of flashcards for one (level, sub-topic) task.
//!
//! Each task runs a small attempt state machine:
//!
//! ```text
//! Target ──ok──────────────────────────────► cards (ok)
//!   │ rate limited (first try) ── backoff ──► Target (retry)
//!   │ any other failure, or retry failed ───► Fallback
//! Fallback ──ok────────────────────────────► cards (needs_review)
//!   └─ failure ────────────────────────────► empty
//! ```
//!
//! A limiter slot is held for the whole task, backoff included.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::parse::parse_cards;
use super::router::ModelRouter;
use super::types::{Flashcard, GenerationTask, QualityFlag};
use super::InvocationLimiter;
use crate::config::GeneratorConfig;
use crate::gateway::{Attribution, ChatGateway, ChatRequest, Message};
use crate::prompts::flashcard_prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Target { retry: bool },
    Fallback,
}

enum Outcome {
    Cards(Vec<Flashcard>),
    RateLimited,
    Failed,
}

pub struct BatchBuilder {
    gateway: Arc<dyn ChatGateway>,
    router: Arc<ModelRouter>,
    limiter: InvocationLimiter,
    config: Arc<GeneratorConfig>,
}

impl BatchBuilder {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        router: Arc<ModelRouter>,
        limiter: InvocationLimiter,
        config: Arc<GeneratorConfig>,
    ) -> Self {
        Self {
            gateway,
            router,
            limiter,
            config,
        }
    }

    /// Cards for `task`. Never fails; an unrecoverable task yields no cards.
    pub async fn build(&self, task: &GenerationTask, run_id: Option<Uuid>) -> Vec<Flashcard> {
        let target = self.router.route_level(task.level).await;
        let fallback = self.config.models.fallback.clone();

        let Ok(_permit) = self.limiter.acquire().await else {
            warn!(level = %task.level, "invocation limiter closed; skipping batch");
            return Vec::new();
        };

        let messages = flashcard_prompt(
            &task.sub_topic,
            task.level.as_str(),
            self.config.prompt_language(&task.language),
            self.config.cards_per_batch,
        )
        .to_messages();

        let mut attempt = Attempt::Target { retry: false };
        loop {
            let model = match attempt {
                Attempt::Target { .. } => target.as_str(),
                Attempt::Fallback => fallback.as_str(),
            };
            let outcome = self
                .invoke(model, messages.clone(), task, &fallback, run_id)
                .await;

            attempt = match (attempt, outcome) {
                (_, Outcome::Cards(cards)) => {
                    debug!(
                        level = %task.level,
                        sub_topic = %task.sub_topic,
                        model,
                        cards = cards.len(),
                        "batch generated"
                    );
                    return cards;
                }
                (Attempt::Target { retry: false }, Outcome::RateLimited) => {
                    info!(
                        model,
                        backoff_ms = self.config.rate_limit_backoff_ms,
                        "rate limited; retrying same model after backoff"
                    );
                    tokio::time::sleep(self.config.rate_limit_backoff()).await;
                    Attempt::Target { retry: true }
                }
                (Attempt::Target { .. }, _) => {
                    warn!(
                        level = %task.level,
                        sub_topic = %task.sub_topic,
                        model,
                        fallback = %fallback,
                        "target model failed; trying fallback"
                    );
                    Attempt::Fallback
                }
                (Attempt::Fallback, _) => {
                    warn!(
                        level = %task.level,
                        sub_topic = %task.sub_topic,
                        "fallback failed; batch yields no cards"
                    );
                    return Vec::new();
                }
            };
        }
    }

    async fn invoke(
        &self,
        model: &str,
        messages: Vec<Message>,
        task: &GenerationTask,
        fallback: &str,
        run_id: Option<Uuid>,
    ) -> Outcome {
        let tag = format!("builder-{}", task.level);
        let req = ChatRequest::new(model, messages, Attribution::new(tag).with_run(run_id)).json();

        let resp = match self.gateway.chat(req).await {
            Ok(resp) => resp,
            Err(err) if err.is_rate_limited() => return Outcome::RateLimited,
            Err(err) => {
                debug!(model, error = %err, "builder invocation failed");
                return Outcome::Failed;
            }
        };

        let raw = match parse_cards(&resp.content, self.config.cards_per_batch) {
            Ok(raw) => raw,
            Err(err) => {
                debug!(model, error = %err, "unparseable batch");
                return Outcome::Failed;
            }
        };

        let quality_flag = if model == fallback {
            QualityFlag::NeedsReview
        } else {
            QualityFlag::Ok
        };
        Outcome::Cards(
            raw.into_iter()
                .map(|card| Flashcard {
                    front: card.front,
                    back: card.back,
                    generated_by_model: model.to_string(),
                    quality_flag,
                    level: task.level,
                })
                .collect(),
        )
    }
}
