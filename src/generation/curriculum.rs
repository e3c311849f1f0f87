//! Plan sub-topics for every level of a topic.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::parse::parse_curriculum;
use super::types::{Curriculum, Level};
use super::InvocationLimiter;
use crate::gateway::{Attribution, ChatGateway, ChatRequest};
use crate::prompts::curriculum_prompt;

pub const PLANNER_TAG: &str = "planner";

pub struct CurriculumPlanner {
    gateway: Arc<dyn ChatGateway>,
    limiter: InvocationLimiter,
    model: String,
    sub_topics_per_level: usize,
}

impl CurriculumPlanner {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        limiter: InvocationLimiter,
        model: impl Into<String>,
        sub_topics_per_level: usize,
    ) -> Self {
        Self {
            gateway,
            limiter,
            model: model.into(),
            sub_topics_per_level,
        }
    }

    /// Planned curriculum, or [`Curriculum::fallback`] when the call or validation fails.
    ///
    /// `language` is the prompt language name (e.g. "Spanish"), not the code.
    pub async fn plan(&self, topic: &str, language: &str, run_id: Option<Uuid>) -> Curriculum {
        let prompt = curriculum_prompt(topic, language, &Level::names(), self.sub_topics_per_level);
        let req = ChatRequest::new(
            self.model.as_str(),
            prompt.to_messages(),
            Attribution::new(PLANNER_TAG).with_run(run_id),
        )
        .json();

        let response = {
            let Ok(_permit) = self.limiter.acquire().await else {
                return Curriculum::fallback(topic);
            };
            self.gateway.chat(req).await
        };

        let content = match response {
            Ok(resp) => resp.content,
            Err(err) => {
                warn!(model = %self.model, error = %err, "curriculum planning failed; using fallback");
                return Curriculum::fallback(topic);
            }
        };

        match parse_curriculum(&content, self.sub_topics_per_level) {
            Ok(mut by_level) => {
                let planned = Curriculum::from_levels(|level| {
                    by_level.remove(&level).unwrap_or_default()
                });
                match planned {
                    Some(curriculum) => {
                        info!(tasks = curriculum.task_count(), "curriculum planned");
                        curriculum
                    }
                    None => Curriculum::fallback(topic),
                }
            }
            Err(err) => {
                warn!(model = %self.model, error = %err, "invalid curriculum; using fallback");
                Curriculum::fallback(topic)
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

    struct Canned(Option<&'static str>);

    #[async_trait]
    impl ChatGateway for Canned {
        async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
            assert_eq!(req.attribution.tag, PLANNER_TAG);
            match self.0 {
                Some(content) => Ok(ChatResponse {
                    model: req.model,
                    content: content.to_string(),
                    usage: None,
                    latency: Duration::ZERO,
                    finish_reason: FinishReason::Stop,
                }),
                None => Err(ProviderError::rate_limited(
                    Duration::from_secs(2),
                    Default::default(),
                )),
            }
        }
    }

    fn planner(reply: Option<&'static str>) -> CurriculumPlanner {
        CurriculumPlanner::new(Arc::new(Canned(reply)), InvocationLimiter::new(1), "big", 5)
    }

    #[tokio::test]
    async fn valid_plan_is_used() {
        let reply = r#"{"beginner": ["a1","a2","a3","a4","a5"], "intermediate": ["b1","b2","b3","b4","b5"],
                        "advanced": ["c1","c2","c3","c4","c5"], "expert": ["d1","d2","d3","d4","d5"]}"#;
        let c = planner(Some(reply)).plan("Python", "English", None).await;
        assert_eq!(c.task_count(), 20);
        assert_eq!(c.sub_topics(Level::Expert)[4], "d5");
    }

    #[tokio::test]
    async fn invocation_failure_uses_fallback() {
        let c = planner(None).plan("Python", "English", None).await;
        assert_eq!(c, Curriculum::fallback("Python"));
        for (_, subs) in c.levels() {
            assert_eq!(subs.len(), 1);
        }
    }

    #[tokio::test]
    async fn malformed_plan_uses_fallback() {
        let reply = r#"{"beginner": ["a"], "intermediate": [], "advanced": ["c"], "expert": ["d"]}"#;
        let c = planner(Some(reply)).plan("Go", "English", None).await;
        assert_eq!(c.sub_topics(Level::Intermediate), ["Go intermediate concept"]);
    }

    #[tokio::test]
    async fn plan_with_wrong_sub_topic_count_uses_fallback() {
        let reply = r#"{"beginner": ["a1","a2","a3","a4","a5","a6","a7"],
                        "intermediate": ["b1","b2","b3","b4","b5"],
                        "advanced": ["c1","c2","c3"], "expert": ["d1","d2","d3","d4","d5"]}"#;
        let c = planner(Some(reply)).plan("Rust", "English", None).await;
        assert_eq!(c, Curriculum::fallback("Rust"));
        assert_eq!(c.task_count(), 4);
    }
}
