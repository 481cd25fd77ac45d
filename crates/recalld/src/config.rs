use std::time::Duration;

use clap::Parser;
use recall_core::{AnalyzerConfig, CompletionConfig, ConfigError};
use tracing::Level;

/// Ten years.
const MAX_CUTOFF_HOURS: i64 = 24 * 365 * 10;

#[derive(Parser, Debug)]
#[command(name = "recalld")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Conversation memory and background preference analysis", long_about = None)]
pub struct Config {
    /// API key for the completion service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Model used for preference analysis
    #[arg(long, env = "RECALL_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    /// Chat completions endpoint
    #[arg(
        long,
        env = "RECALL_COMPLETION_URL",
        default_value = "https://api.openai.com/v1/chat/completions"
    )]
    pub completion_url: String,

    /// Seconds between analysis polls
    #[arg(
        long,
        env = "RECALL_POLL_INTERVAL_SECS",
        default_value_t = 3600,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval_secs: u64,

    /// Hours before a user's preferences are re-analysed
    #[arg(
        long,
        env = "RECALL_ANALYSIS_CUTOFF_HOURS",
        default_value_t = 24,
        value_parser = clap::value_parser!(i64).range(1..=MAX_CUTOFF_HOURS)
    )]
    pub analysis_cutoff_hours: i64,

    /// Maximum analyses running at once
    #[arg(long, env = "RECALL_MAX_CONCURRENT_ANALYSES", default_value_t = 4)]
    pub max_concurrent_analyses: usize,

    /// Timeout for a single completion call, in seconds
    #[arg(long, env = "RECALL_COMPLETION_TIMEOUT_SECS", default_value_t = 90)]
    pub completion_timeout_secs: u64,

    /// Use SurrealDB storage (SURREALDB_* env) instead of in-memory stores
    #[arg(long, env = "RECALL_DURABLE")]
    pub durable: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    pub json: bool,
}

impl Config {
    pub fn log_level(&self) -> Level {
        if self.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    pub fn analyzer_config(&self) -> Result<AnalyzerConfig, ConfigError> {
        let cutoff = chrono::Duration::try_hours(self.analysis_cutoff_hours).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "analysis cutoff of {} hours is out of range",
                self.analysis_cutoff_hours
            ))
        })?;
        let config = AnalyzerConfig {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            cutoff,
            max_concurrent: self.max_concurrent_analyses,
            completion_timeout: Duration::from_secs(self.completion_timeout_secs),
            ..AnalyzerConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig::new(self.api_key.clone())
            .with_endpoint(self.completion_url.clone())
            .with_model(self.model.clone())
    }
}
