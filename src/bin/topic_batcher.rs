//! Pipe newline-delimited JSON from stdin into a batching HTTP publisher.
//!
//! Configuration comes from the YAML file named by `TOPIC_BATCHER_CONFIG`:
//!
//! ```yaml
//! batcher:
//!   topic: audit-events
//!   batch_size: 50
//!   max_batch_interval_ms: 2000
//! http:
//!   endpoint: http://localhost:9324/batch
//! ```
//!
//! Without a file, `TOPIC_BATCHER_TOPIC` and `TOPIC_BATCHER_ENDPOINT` are
//! required. `TOPIC_BATCHER_*` overrides apply in both cases.

use anyhow::Context;
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use topic_batcher::transport::{HttpBatchSender, HttpSenderConfig};
use topic_batcher::{AutoBatcher, BatcherConfig, Lifecycle};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct AppConfig {
    batcher: BatcherConfig,
    http: HttpSenderConfig,
}

fn load_config() -> anyhow::Result<AppConfig> {
    let cfg = match std::env::var("TOPIC_BATCHER_CONFIG") {
        Ok(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {}", path))?;
            serde_yaml::from_str::<AppConfig>(&content)
                .with_context(|| format!("parsing config file {}", path))?
        }
        Err(_) => {
            let topic = std::env::var("TOPIC_BATCHER_TOPIC")
                .context("TOPIC_BATCHER_CONFIG or TOPIC_BATCHER_TOPIC must be set")?;
            let endpoint = std::env::var("TOPIC_BATCHER_ENDPOINT")
                .context("TOPIC_BATCHER_CONFIG or TOPIC_BATCHER_ENDPOINT must be set")?;
            AppConfig {
                batcher: BatcherConfig::new(topic),
                http: HttpSenderConfig::new(&endpoint)?,
            }
        }
    };
    let batcher = cfg.batcher.apply_env_overrides();
    batcher.validate()?;
    Ok(AppConfig {
        batcher,
        http: cfg.http.apply_env_overrides(),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = load_config()?;
    let sender = HttpBatchSender::new(cfg.http)?;
    info!(endpoint = %sender.endpoint(), "sending batches");
    let batcher: AutoBatcher<serde_json::Value> = AutoBatcher::json(cfg.batcher, Arc::new(sender))?;
    batcher.on_start().await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut skipped = 0u64;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<serde_json::Value>(&line) {
                    Ok(value) => batcher.add(value),
                    Err(e) => {
                        skipped += 1;
                        warn!(error = %e, "skipping line that is not valid JSON");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, flushing");
                break;
            }
        }
    }

    batcher.on_stop().await?;
    let stats = batcher.stats();
    info!(
        items = stats.items_added,
        skipped,
        batches = stats.publish.batches_sent,
        succeeded = stats.publish.entries_succeeded,
        failed = stats.publish.entries_failed,
        hard_failures = stats.publish.hard_failures,
        "done"
    );
    Ok(())
}
