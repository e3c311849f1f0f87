//! Level to model routing with quota-aware downgrade for the top tier.

use std::sync::Arc;

use tracing::{debug, warn};

use super::types::Level;
use crate::config::ModelTable;
use crate::ledger::UsageLedger;

pub struct ModelRouter {
    models: ModelTable,
    quota_ceiling_tokens: u64,
    ledger: Arc<dyn UsageLedger>,
}

impl ModelRouter {
    pub fn new(models: ModelTable, quota_ceiling_tokens: u64, ledger: Arc<dyn UsageLedger>) -> Self {
        Self {
            models,
            quota_ceiling_tokens,
            ledger,
        }
    }

    /// Model for a level name. Unknown names get the fallback model.
    pub async fn route(&self, level: &str) -> String {
        match level.parse::<Level>() {
            Ok(level) => self.route_level(level).await,
            Err(_) => self.models.fallback.clone(),
        }
    }

    pub async fn route_level(&self, level: Level) -> String {
        if level != Level::Expert {
            return self
                .models
                .builders
                .get(level.as_str())
                .cloned()
                .unwrap_or_else(|| self.models.fallback.clone());
        }

        let primary = &self.models.expert_primary;
        let used = match self.ledger.tokens_today(primary).await {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!(model = %primary, error = %err, "quota read failed; assuming no usage");
                0
            }
        };

        if used < self.quota_ceiling_tokens {
            primary.clone()
        } else {
            debug!(
                model = %primary,
                used,
                ceiling = self.quota_ceiling_tokens,
                "daily quota reached; routing expert to economy model"
            );
            self.models.expert_economy.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::TokenUsage;
    use crate::ledger::{InMemoryUsageLedger, UsageEvent};

    fn router(ledger: Arc<InMemoryUsageLedger>, ceiling: u64) -> ModelRouter {
        ModelRouter::new(ModelTable::default(), ceiling, ledger)
    }

    async fn spend(ledger: &InMemoryUsageLedger, model: &str, tokens: u32) {
        ledger
            .record(UsageEvent::new(model, TokenUsage::new(tokens, 0), 0.1, "builder-expert"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn static_levels_ignore_quota() {
        let ledger = Arc::new(InMemoryUsageLedger::new());
        let r = router(ledger, 0);
        let table = ModelTable::default();
        assert_eq!(r.route("beginner").await, table.builders["beginner"]);
        assert_eq!(r.route("advanced").await, table.builders["advanced"]);
    }

    #[tokio::test]
    async fn unknown_level_gets_fallback() {
        let r = router(Arc::new(InMemoryUsageLedger::new()), 85_000);
        assert_eq!(r.route("iniciante").await, ModelTable::default().fallback);
    }

    #[tokio::test]
    async fn expert_downgrades_at_ceiling() {
        let ledger = Arc::new(InMemoryUsageLedger::new());
        let table = ModelTable::default();
        let r = router(ledger.clone(), 85_000);

        assert_eq!(r.route("expert").await, table.expert_primary);
        spend(&ledger, &table.expert_primary, 90_000).await;
        assert_eq!(r.route("expert").await, table.expert_economy);
    }

    #[tokio::test]
    async fn ceiling_is_strict() {
        let ledger = Arc::new(InMemoryUsageLedger::new());
        let table = ModelTable::default();
        let r = router(ledger.clone(), 1_000);

        spend(&ledger, &table.expert_primary, 999).await;
        assert_eq!(r.route_level(Level::Expert).await, table.expert_primary);
        spend(&ledger, &table.expert_primary, 1).await;
        assert_eq!(r.route_level(Level::Expert).await, table.expert_economy);
    }

    #[tokio::test]
    async fn routing_never_returns_to_primary_under_growing_usage() {
        let ledger = Arc::new(InMemoryUsageLedger::new());
        let table = ModelTable::default();
        let r = router(ledger.clone(), 10_000);

        let mut downgraded = false;
        for _ in 0..30 {
            spend(&ledger, &table.expert_primary, 700).await;
            let model = r.route_level(Level::Expert).await;
            if downgraded {
                assert_eq!(model, table.expert_economy);
            }
            downgraded |= model == table.expert_economy;
        }
        assert!(downgraded);
    }
}
