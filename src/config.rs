//! Generator configuration.
//!
//! A [`GeneratorConfig`] is an immutable value handed to the orchestrator at
//! construction time. Every field has a default, so a TOML file only needs
//! to name what it overrides:
//!
//! ```toml
//! quota_ceiling_tokens = 50000
//! max_concurrent_invocations = 4
//!
//! [models]
//! expert_primary = "llama-3.3-70b-versatile"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_EXTRACTOR_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_PLANNER_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_BUILDER_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";
pub const DEFAULT_EXPERT_PRIMARY_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_EXPERT_ECONOMY_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";
pub const DEFAULT_FALLBACK_MODEL: &str = "llama-3.1-8b-instant";

/// Daily token allowance for the expert primary model before routing downgrades.
pub const DEFAULT_QUOTA_CEILING_TOKENS: u64 = 85_000;
pub const DEFAULT_MAX_CONCURRENT_INVOCATIONS: usize = 10;
pub const DEFAULT_RATE_LIMIT_BACKOFF_MS: u64 = 2_000;
pub const DEFAULT_SUB_TOPICS_PER_LEVEL: usize = 5;
pub const DEFAULT_CARDS_PER_BATCH: usize = 5;
pub const DEFAULT_LANGUAGE_CODE: &str = "pt-br";
pub const DEFAULT_PROMPT_LANGUAGE: &str = "English";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which model serves which role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelTable {
    /// Intent extraction.
    pub extractor: String,
    /// Curriculum planning.
    pub planner: String,
    /// Static builder model per non-expert level name.
    pub builders: BTreeMap<String, String>,
    /// Expert builder while the daily quota has headroom.
    pub expert_primary: String,
    /// Expert builder once the quota ceiling is reached.
    pub expert_economy: String,
    /// Last resort after a failed builder attempt. Cards it produces need review.
    pub fallback: String,
}

impl Default for ModelTable {
    fn default() -> Self {
        let builders = ["beginner", "intermediate", "advanced"]
            .into_iter()
            .map(|level| (level.to_string(), DEFAULT_BUILDER_MODEL.to_string()))
            .collect();
        Self {
            extractor: DEFAULT_EXTRACTOR_MODEL.to_string(),
            planner: DEFAULT_PLANNER_MODEL.to_string(),
            builders,
            expert_primary: DEFAULT_EXPERT_PRIMARY_MODEL.to_string(),
            expert_economy: DEFAULT_EXPERT_ECONOMY_MODEL.to_string(),
            fallback: DEFAULT_FALLBACK_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    pub models: ModelTable,
    pub quota_ceiling_tokens: u64,
    /// Process-wide cap on simultaneous in-flight model invocations.
    pub max_concurrent_invocations: usize,
    /// Pause before the single same-model retry after a rate-limit signal.
    pub rate_limit_backoff_ms: u64,
    pub sub_topics_per_level: usize,
    pub cards_per_batch: usize,
    /// Language code used when the caller supplies none.
    pub default_language: String,
    /// Language code (lowercase) to the language name used in prompts.
    pub languages: BTreeMap<String, String>,
    /// Prompt language for codes missing from `languages`.
    pub fallback_language: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let languages = [
            ("pt-br", "Portuguese (Brazil)"),
            ("en", "English"),
            ("es", "Spanish"),
        ]
        .into_iter()
        .map(|(code, name)| (code.to_string(), name.to_string()))
        .collect();

        Self {
            models: ModelTable::default(),
            quota_ceiling_tokens: DEFAULT_QUOTA_CEILING_TOKENS,
            max_concurrent_invocations: DEFAULT_MAX_CONCURRENT_INVOCATIONS,
            rate_limit_backoff_ms: DEFAULT_RATE_LIMIT_BACKOFF_MS,
            sub_topics_per_level: DEFAULT_SUB_TOPICS_PER_LEVEL,
            cards_per_batch: DEFAULT_CARDS_PER_BATCH,
            default_language: DEFAULT_LANGUAGE_CODE.to_string(),
            languages,
            fallback_language: DEFAULT_PROMPT_LANGUAGE.to_string(),
        }
    }
}

impl GeneratorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str, source_name: &str) -> Result<Self, ConfigError> {
        let config: GeneratorConfig = toml::from_str(content).map_err(|e| ConfigError::Parse {
            file: source_name.to_string(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            file: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_invocations == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_invocations must be >= 1".into(),
            ));
        }
        if self.sub_topics_per_level == 0 {
            return Err(ConfigError::Invalid("sub_topics_per_level must be >= 1".into()));
        }
        if self.cards_per_batch == 0 {
            return Err(ConfigError::Invalid("cards_per_batch must be >= 1".into()));
        }

        let m = &self.models;
        let named = [
            ("models.extractor", &m.extractor),
            ("models.planner", &m.planner),
            ("models.expert_primary", &m.expert_primary),
            ("models.expert_economy", &m.expert_economy),
            ("models.fallback", &m.fallback),
        ];
        for (field, value) in named {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
            }
        }
        for (level, model) in &m.builders {
            if model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "models.builders.{level} must be non-empty"
                )));
            }
        }
        if m.fallback == m.expert_economy {
            return Err(ConfigError::Invalid(
                "models.fallback must differ from models.expert_economy".into(),
            ));
        }
        if self.fallback_language.trim().is_empty() {
            return Err(ConfigError::Invalid("fallback_language must be non-empty".into()));
        }
        Ok(())
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }

    /// Language name to prompt in for `code`. Unknown codes are not errors.
    pub fn prompt_language(&self, code: &str) -> &str {
        self.languages
            .get(&code.trim().to_lowercase())
            .map(String::as_str)
            .unwrap_or(&self.fallback_language)
    }

    /// Caller-supplied language code, or the configured default when absent or blank.
    pub fn language_or_default<'a>(&'a self, code: Option<&'a str>) -> &'a str {
        match code.map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => &self.default_language,
        }
    }
}
