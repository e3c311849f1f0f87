//! Usage ledger: an append-only log of model invocations.
//!
//! The gateway writes one [`UsageEvent`] per invocation that reports token
//! usage. The router reads the ledger back to decide whether the premium
//! model still has daily headroom. Backends:
//! - [`SqliteUsageLedger`] for durable accounting (CLI, services)
//! - [`InMemoryUsageLedger`] for tests and throwaway runs
//!
//! Writes are independent inserts and quota reads tolerate slightly stale
//! totals, so no cross-task locking is layered on top.

pub mod sqlite;

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gateway::TokenUsage;

pub use sqlite::SqliteUsageLedger;

/// One recorded model invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub elapsed_seconds: f64,
    /// Which code path made the call ("intent", "planner", "builder-expert", ...).
    pub tag: String,
    pub run_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl UsageEvent {
    pub fn new(
        model: impl Into<String>,
        usage: TokenUsage,
        elapsed_seconds: f64,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            elapsed_seconds,
            tag: tag.into(),
            run_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn run(mut self, run_id: Option<Uuid>) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger lock poisoned")]
    Poisoned,
    #[error("task join error: {0}")]
    Join(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

/// Per-model aggregate over a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub model: String,
    pub requests_today: u64,
    pub tokens_today: u64,
    /// Mean latency in seconds, rounded to two decimals.
    pub avg_latency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_requests: u64,
    pub total_tokens: u64,
}

/// Today's consumption across all models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyUsageReport {
    pub date: NaiveDate,
    pub summary: UsageSummary,
    pub by_model: Vec<ModelUsage>,
}

impl DailyUsageReport {
    pub fn from_models(date: NaiveDate, mut by_model: Vec<ModelUsage>) -> Self {
        by_model.sort_by(|a, b| a.model.cmp(&b.model));
        let summary = UsageSummary {
            total_requests: by_model.iter().map(|m| m.requests_today).sum(),
            total_tokens: by_model.iter().map(|m| m.tokens_today).sum(),
        };
        Self {
            date,
            summary,
            by_model,
        }
    }
}

/// Durable usage log with day-bounded aggregate queries.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Append one event.
    async fn record(&self, event: UsageEvent) -> Result<(), LedgerError>;

    /// Sum of `total_tokens` for `model` at or after `since`.
    async fn tokens_since(&self, model: &str, since: DateTime<Utc>) -> Result<u64, LedgerError>;

    /// Per-model aggregates at or after `since`.
    async fn usage_since(&self, since: DateTime<Utc>) -> Result<Vec<ModelUsage>, LedgerError>;

    /// Tokens consumed by `model` since local midnight; 0 when nothing was logged.
    async fn tokens_today(&self, model: &str) -> Result<u64, LedgerError> {
        self.tokens_since(model, local_day_start()).await
    }

    async fn daily_report(&self) -> Result<DailyUsageReport, LedgerError> {
        let by_model = self.usage_since(local_day_start()).await?;
        Ok(DailyUsageReport::from_models(Local::now().date_naive(), by_model))
    }
}

/// Start of the current calendar day in local time, expressed in UTC.
pub fn local_day_start() -> DateTime<Utc> {
    let now = Local::now();
    let midnight = now.date_naive().and_time(chrono::NaiveTime::MIN);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        // Midnight skipped by a DST jump: fall back to 24h ago.
        .unwrap_or_else(|| now.with_timezone(&Utc) - chrono::Duration::hours(24))
}

pub(crate) fn round_latency(total_seconds: f64, requests: u64) -> f64 {
    if requests == 0 {
        return 0.0;
    }
    ((total_seconds / requests as f64) * 100.0).round() / 100.0
}

/// Ledger that keeps events in process memory.
#[derive(Debug, Default)]
pub struct InMemoryUsageLedger {
    events: Mutex<Vec<UsageEvent>>,
}

impl InMemoryUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, in insertion order.
    pub fn events(&self) -> Vec<UsageEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl UsageLedger for InMemoryUsageLedger {
    async fn record(&self, event: UsageEvent) -> Result<(), LedgerError> {
        let mut events = self.events.lock().map_err(|_| LedgerError::Poisoned)?;
        events.push(event);
        Ok(())
    }

    async fn tokens_since(&self, model: &str, since: DateTime<Utc>) -> Result<u64, LedgerError> {
        let events = self.events.lock().map_err(|_| LedgerError::Poisoned)?;
        Ok(events
            .iter()
            .filter(|e| e.model == model && e.timestamp >= since)
            .map(|e| u64::from(e.total_tokens))
            .sum())
    }

    async fn usage_since(&self, since: DateTime<Utc>) -> Result<Vec<ModelUsage>, LedgerError> {
        let events = self.events.lock().map_err(|_| LedgerError::Poisoned)?;
        let mut acc: BTreeMap<&str, (u64, u64, f64)> = BTreeMap::new();
        for event in events.iter().filter(|e| e.timestamp >= since) {
            let entry = acc.entry(event.model.as_str()).or_default();
            entry.0 += 1;
            entry.1 += u64::from(event.total_tokens);
            entry.2 += event.elapsed_seconds;
        }
        Ok(acc
            .into_iter()
            .map(|(model, (requests, tokens, seconds))| ModelUsage {
                model: model.to_string(),
                requests_today: requests,
                tokens_today: tokens,
                avg_latency: round_latency(seconds, requests),
            })
            .collect())
    }
}
