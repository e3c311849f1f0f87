//! End-to-end deck generation.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use super::builder::BatchBuilder;
use super::curriculum::CurriculumPlanner;
use super::intent::IntentExtractor;
use super::router::ModelRouter;
use super::types::Deck;
use super::InvocationLimiter;
use crate::config::GeneratorConfig;
use crate::gateway::ChatGateway;
use crate::ledger::UsageLedger;

/// Drives extraction, planning, concurrent batch generation and grouping.
///
/// One orchestrator owns one [`InvocationLimiter`], so concurrent
/// [`generate`](Self::generate) calls on the same instance share its bound.
pub struct DeckOrchestrator {
    config: Arc<GeneratorConfig>,
    extractor: IntentExtractor,
    planner: CurriculumPlanner,
    builder: BatchBuilder,
    limiter: InvocationLimiter,
}

impl DeckOrchestrator {
    pub fn new(
        config: GeneratorConfig,
        gateway: Arc<dyn ChatGateway>,
        ledger: Arc<dyn UsageLedger>,
    ) -> Self {
        let config = Arc::new(config);
        let limiter = InvocationLimiter::new(config.max_concurrent_invocations);
        let router = Arc::new(ModelRouter::new(
            config.models.clone(),
            config.quota_ceiling_tokens,
            ledger,
        ));

        Self {
            extractor: IntentExtractor::new(
                gateway.clone(),
                limiter.clone(),
                config.models.extractor.as_str(),
            ),
            planner: CurriculumPlanner::new(
                gateway.clone(),
                limiter.clone(),
                config.models.planner.as_str(),
                config.sub_topics_per_level,
            ),
            builder: BatchBuilder::new(gateway, router, limiter.clone(), config.clone()),
            limiter,
            config,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn limiter(&self) -> &InvocationLimiter {
        &self.limiter
    }

    /// Generate a deck. Always returns a deck; degraded runs just have fewer cards.
    ///
    /// `language` falls back to the configured default code when `None`.
    pub async fn generate(&self, raw_input: &str, language: Option<&str>) -> Deck {
        let run_id = Uuid::new_v4();
        let language = self.config.language_or_default(language).to_string();
        let span = info_span!("generate", %run_id, language = %language);

        async {
            let topic = self.extractor.extract(raw_input, Some(run_id)).await;
            let prompt_language = self.config.prompt_language(&language);
            let curriculum = self
                .planner
                .plan(&topic, prompt_language, Some(run_id))
                .await;

            let tasks = curriculum.tasks(&language);
            info!(topic = %topic, tasks = tasks.len(), "launching batch generation");

            // Every task is admitted at once; the limiter bounds actual invocations.
            let batches = stream::iter(
                tasks
                    .iter()
                    .map(|task| self.builder.build(task, Some(run_id))),
            )
            .buffer_unordered(tasks.len().max(1))
            .collect::<Vec<_>>()
            .await;

            let cards: Vec<_> = batches.into_iter().flatten().collect();
            let deck = Deck::assemble(topic, raw_input, language.as_str(), cards);
            info!(total_cards = deck.total_cards, "deck assembled");
            deck
        }
        .instrument(span)
        .await
    }
}
