//! SQLite-backed usage ledger.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{round_latency, LedgerError, ModelUsage, UsageEvent, UsageLedger};

#[derive(Clone)]
pub struct SqliteUsageLedger {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUsageLedger {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; \
             PRAGMA synchronous=NORMAL; \
             CREATE TABLE IF NOT EXISTS usage_events ( \
               id INTEGER PRIMARY KEY AUTOINCREMENT, \
               model_id TEXT NOT NULL, \
               prompt_tokens INTEGER NOT NULL, \
               completion_tokens INTEGER NOT NULL, \
               total_tokens INTEGER NOT NULL, \
               elapsed_seconds REAL NOT NULL DEFAULT 0, \
               context_tag TEXT NOT NULL, \
               run_id TEXT, \
               timestamp_ms INTEGER NOT NULL \
             ); \
             CREATE INDEX IF NOT EXISTS usage_events_model_ts \
               ON usage_events (model_id, timestamp_ms);",
        )?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("FLASHFORGE_LEDGER_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from(".flashforge_usage.sqlite")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, LedgerError>
    where
        F: FnOnce(&Connection) -> Result<R, LedgerError>,
    {
        let guard = self.conn.lock().map_err(|_| LedgerError::Poisoned)?;
        f(&guard)
    }

    async fn blocking<F, R>(&self, f: F) -> Result<R, LedgerError>
    where
        F: FnOnce(&Connection) -> Result<R, LedgerError> + Send + 'static,
        R: Send + 'static,
    {
        let ledger = self.clone();
        tokio::task::spawn_blocking(move || ledger.with_conn(f))
            .await
            .map_err(|e| LedgerError::Join(e.to_string()))?
    }

    /// Delete events older than `max_age_days`. Returns the number of rows removed.
    pub async fn prune(&self, max_age_days: u64) -> Result<usize, LedgerError> {
        let cutoff = Utc::now().timestamp_millis().saturating_sub(
            (max_age_days as i64)
                .saturating_mul(86_400)
                .saturating_mul(1_000),
        );
        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM usage_events WHERE timestamp_ms < ?1",
                params![cutoff],
            )?;
            Ok(removed)
        })
        .await
    }

    /// Write every event as one JSON object per line, oldest first.
    pub async fn export_jsonl(&self, path: impl AsRef<Path>) -> Result<usize, LedgerError> {
        let path = path.as_ref().to_path_buf();
        self.blocking(move |conn| {
            use std::io::Write;

            let mut stmt = conn.prepare(
                "SELECT model_id, prompt_tokens, completion_tokens, total_tokens, \
                        elapsed_seconds, context_tag, run_id, timestamp_ms \
                 FROM usage_events ORDER BY timestamp_ms ASC, id ASC",
            )?;
            let mut rows = stmt.query([])?;
            let mut file = std::fs::File::create(path)?;
            let mut written = 0usize;
            while let Some(row) = rows.next()? {
                let event = UsageEvent {
                    model: row.get(0)?,
                    prompt_tokens: row.get::<_, i64>(1)?.max(0) as u32,
                    completion_tokens: row.get::<_, i64>(2)?.max(0) as u32,
                    total_tokens: row.get::<_, i64>(3)?.max(0) as u32,
                    elapsed_seconds: row.get(4)?,
                    tag: row.get(5)?,
                    run_id: row
                        .get::<_, Option<String>>(6)?
                        .and_then(|s| Uuid::parse_str(&s).ok()),
                    timestamp: from_millis(row.get(7)?),
                };
                let line =
                    serde_json::to_string(&event).map_err(|e| LedgerError::Serde(e.to_string()))?;
                writeln!(file, "{line}")?;
                written += 1;
            }
            Ok(written)
        })
        .await
    }
}

#[async_trait]
impl UsageLedger for SqliteUsageLedger {
    async fn record(&self, event: UsageEvent) -> Result<(), LedgerError> {
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO usage_events ( \
                    model_id, prompt_tokens, completion_tokens, total_tokens, \
                    elapsed_seconds, context_tag, run_id, timestamp_ms \
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    event.model,
                    i64::from(event.prompt_tokens),
                    i64::from(event.completion_tokens),
                    i64::from(event.total_tokens),
                    event.elapsed_seconds,
                    event.tag,
                    event.run_id.map(|id| id.to_string()),
                    event.timestamp.timestamp_millis(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn tokens_since(&self, model: &str, since: DateTime<Utc>) -> Result<u64, LedgerError> {
        let model = model.to_string();
        let since_ms = since.timestamp_millis();
        self.blocking(move |conn| {
            let total: Option<i64> = conn.query_row(
                "SELECT SUM(total_tokens) FROM usage_events \
                 WHERE model_id = ?1 AND timestamp_ms >= ?2",
                params![model, since_ms],
                |row| row.get(0),
            )?;
            Ok(total.unwrap_or(0).max(0) as u64)
        })
        .await
    }

    async fn usage_since(&self, since: DateTime<Utc>) -> Result<Vec<ModelUsage>, LedgerError> {
        let since_ms = since.timestamp_millis();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT model_id, COUNT(id), SUM(total_tokens), SUM(elapsed_seconds) \
                 FROM usage_events WHERE timestamp_ms >= ?1 \
                 GROUP BY model_id ORDER BY model_id",
            )?;
            let mut rows = stmt.query(params![since_ms])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let requests = row.get::<_, i64>(1)?.max(0) as u64;
                let seconds = row.get::<_, Option<f64>>(3)?.unwrap_or(0.0);
                out.push(ModelUsage {
                    model: row.get(0)?,
                    requests_today: requests,
                    tokens_today: row.get::<_, Option<i64>>(2)?.unwrap_or(0).max(0) as u64,
                    avg_latency: round_latency(seconds, requests),
                });
            }
            Ok(out)
        })
        .await
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}
