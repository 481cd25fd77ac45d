//! Recall daemon
//!
//! Runs the background preference analyzer until Ctrl-C, then drains
//! in-flight analyses and closes the stores.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use recall_core::telemetry::{init_tracing, redact};
use recall_core::{OpenAiClient, PreferenceAnalyzer};
use recall_state::{
    ContextStorage, MemoryContextStore, MemoryPreferencesStore, PreferencesStorage,
    SurrealContextStore, SurrealHandle, SurrealPreferencesStore,
};
use tracing::{info, warn};

use crate::config::Config;

type Stores = (Arc<dyn ContextStorage>, Arc<dyn PreferencesStorage>);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(config.json, config.log_level());

    info!(
        model = %config.model,
        endpoint = %config.completion_url,
        api_key = %redact(&config.api_key),
        durable = config.durable,
        "recalld starting"
    );

    let analyzer_config = config
        .analyzer_config()
        .context("Invalid analyzer configuration")?;

    let (contexts, preferences) = open_stores(config.durable).await;

    let client = OpenAiClient::new(config.completion_config())
        .context("Failed to build completion client")?;
    let analyzer = PreferenceAnalyzer::new(
        Arc::clone(&contexts),
        Arc::clone(&preferences),
        Arc::new(client),
        analyzer_config,
    )
    .context("Failed to create preference analyzer")?;

    analyzer.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("shutdown requested, waiting for in-flight analyses");

    analyzer.stop().await;

    if let Err(e) = preferences.close().await {
        warn!(error = %e, "failed to close preferences store");
    }
    if let Err(e) = contexts.close().await {
        warn!(error = %e, "failed to close context store");
    }
    info!("recalld stopped");
    Ok(())
}

/// Durable stores when requested and reachable, otherwise in-memory ones.
async fn open_stores(durable: bool) -> Stores {
    if durable {
        match SurrealHandle::setup_from_env().await {
            Ok(handle) => {
                info!("using SurrealDB storage");
                return (
                    Arc::new(SurrealContextStore::new(&handle)),
                    Arc::new(SurrealPreferencesStore::new(&handle)),
                );
            }
            Err(e) => {
                warn!(error = %e, "durable storage unavailable, falling back to in-memory stores")
            }
        }
    }
    info!("using in-memory storage");
    volatile_stores()
}

fn volatile_stores() -> Stores {
    (
        Arc::new(MemoryContextStore::new()),
        Arc::new(MemoryPreferencesStore::new()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_state::{NewMessage, UserId};

    #[tokio::test]
    async fn volatile_stores_are_usable() {
        let (contexts, preferences) = open_stores(false).await;
        contexts
            .append_message(UserId(1), NewMessage::user("hi"))
            .await
            .unwrap();
        preferences.update_last_message_time(UserId(1)).await.unwrap();

        assert!(contexts.get_context(UserId(1)).await.unwrap().is_some());
        contexts.close().await.unwrap();
        preferences.close().await.unwrap();
    }
}
