#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use flashforge::config::GeneratorConfig;
use flashforge::gateway::{GroqAdapter, ProviderGateway};
use flashforge::generation::DeckOrchestrator;
use flashforge::ledger::{SqliteUsageLedger, UsageLedger};

#[derive(Parser)]
#[command(name = "flashforge", version, about = "Leveled flashcard deck generator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a deck for a topic
    Generate {
        #[arg(long)]
        topic: String,
        /// Language code (pt-br, en, es, ...); defaults to the configured default
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        ledger: Option<PathBuf>,
        /// Write deck JSON here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
        /// Drop levels that produced no cards from the output
        #[arg(long)]
        skip_empty_levels: bool,
    },
    /// Print today's usage report
    Usage {
        #[arg(long)]
        ledger: Option<PathBuf>,
    },
    /// Delete usage events older than N days
    UsagePrune {
        #[arg(long)]
        ledger: Option<PathBuf>,
        #[arg(long)]
        max_age_days: u64,
    },
    /// Export usage events to JSONL
    UsageExport {
        #[arg(long)]
        ledger: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// List models available to the configured API key
    Models,
    /// Load and validate a config file, then print the effective config
    ConfigCheck {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    flashforge::init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            topic,
            language,
            config,
            ledger,
            out,
            skip_empty_levels,
        } => {
            let config = load_config(config.as_deref())?;
            let ledger: Arc<dyn UsageLedger> = Arc::new(open_ledger(ledger)?);
            let gateway = Arc::new(ProviderGateway::from_env(ledger.clone())?);
            let orchestrator = DeckOrchestrator::new(config, gateway, ledger);

            let deck = orchestrator.generate(&topic, language.as_deref()).await;
            let deck = if skip_empty_levels {
                deck.without_empty_levels()
            } else {
                deck
            };
            emit_json(out.as_deref(), &deck)?;
        }
        Commands::Usage { ledger } => {
            let report = open_ledger(ledger)?.daily_report().await?;
            emit_json(None, &report)?;
        }
        Commands::UsagePrune {
            ledger,
            max_age_days,
        } => {
            let removed = open_ledger(ledger)?.prune(max_age_days).await?;
            eprintln!("Removed {removed} usage events");
        }
        Commands::UsageExport { ledger, out } => {
            let written = open_ledger(ledger)?.export_jsonl(&out).await?;
            eprintln!("Exported {written} usage events to {}", out.display());
        }
        Commands::Models => {
            let models = GroqAdapter::from_env()?.list_models().await?;
            let mut stdout = io::stdout().lock();
            for id in models {
                writeln!(stdout, "{id}")?;
            }
        }
        Commands::ConfigCheck { config } => {
            let config = GeneratorConfig::from_path(&config)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<GeneratorConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(GeneratorConfig::from_path(path)?),
        None => Ok(GeneratorConfig::default()),
    }
}

fn open_ledger(path: Option<PathBuf>) -> Result<SqliteUsageLedger, Box<dyn std::error::Error>> {
    let path = path.unwrap_or_else(SqliteUsageLedger::default_path);
    Ok(SqliteUsageLedger::new(path)?)
}

fn emit_json<T: serde::Serialize>(path: Option<&Path>, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    match path {
        Some(path) => std::fs::write(path, json),
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}")
        }
    }
}
