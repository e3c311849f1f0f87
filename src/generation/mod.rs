//! Leveled flashcard deck generation.
//!
//! Pipeline: [`IntentExtractor`] → [`CurriculumPlanner`] → one
//! [`BatchBuilder`] task per (level, sub-topic), all run concurrently under a
//! shared [`InvocationLimiter`] → [`Deck::assemble`]. Nothing in here returns
//! an error to the caller; each stage degrades to a fallback value instead.

pub mod builder;
pub mod curriculum;
pub mod intent;
pub mod orchestrator;
pub mod parse;
pub mod router;
pub mod types;

use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

pub use builder::BatchBuilder;
pub use curriculum::CurriculumPlanner;
pub use intent::IntentExtractor;
pub use orchestrator::DeckOrchestrator;
pub use parse::ParseError;
pub use router::ModelRouter;
pub use types::{
    Curriculum, Deck, Flashcard, GenerationTask, Level, LevelGroup, QualityFlag, UnknownLevel,
};

/// Caps simultaneous in-flight model invocations.
///
/// Clones share the same permits, so one limiter handed to every stage bounds
/// the whole orchestrator.
#[derive(Debug, Clone)]
pub struct InvocationLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl InvocationLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Wait for a slot. The slot is released when the permit drops.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.semaphore.clone().acquire_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_permits() {
        let limiter = InvocationLimiter::new(2);
        let other = limiter.clone();
        let a = limiter.acquire().await.unwrap();
        let _b = other.acquire().await.unwrap();
        assert_eq!(limiter.available(), 0);
        drop(a);
        assert_eq!(other.available(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(InvocationLimiter::new(0).capacity(), 1);
    }
}
