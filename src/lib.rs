#![forbid(unsafe_code)]

//! # flashforge
//!
//! Leveled flashcard decks generated by fanning out many small model calls.
//!
//! A free-form request ("I want to learn Python basics") is reduced to a
//! topic, planned into sub-topics across four difficulty levels, and each
//! sub-topic becomes one concurrent batch request. Batches are bounded by a
//! shared invocation limiter, retried once on rate limits, degraded to a
//! fallback model on failure, and regrouped by level into a [`Deck`].
//!
//! The expert level is quota-aware: once the premium model has spent its
//! daily token allowance (read back from the [`UsageLedger`]), new expert
//! batches are routed to an economy model instead.

pub mod config;
pub mod gateway;
pub mod generation;
pub mod ledger;
pub mod prompts;

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

pub use config::{ConfigError, GeneratorConfig, ModelTable};
pub use gateway::{
    Attribution, ChatGateway, ChatProvider, GroqAdapter, ProviderError, ProviderGateway,
};
pub use generation::{
    Curriculum, Deck, DeckOrchestrator, Flashcard, GenerationTask, InvocationLimiter, Level,
    LevelGroup, QualityFlag,
};
pub use ledger::{
    DailyUsageReport, InMemoryUsageLedger, LedgerError, SqliteUsageLedger, UsageEvent,
    UsageLedger,
};

/// Install the global tracing subscriber.
///
/// `LOG_FORMAT=json` selects JSON lines, anything else pretty output.
/// Filtering follows `RUST_LOG`.
pub fn init_tracing() -> Result<(), TryInitError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .finish()
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .finish()
            .try_init(),
    }
}
