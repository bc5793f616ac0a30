//! tierload - load files and URLs through the engine
//!
//! Loads every model `--repeat` times, releasing between loads, and reports
//! which tier served each load. The first load of a model normally comes
//! from its origin or the disk cache and the rest from memory.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tierload_engine::load::loaders::EncodedBytes;
use tierload_engine::{DataSource, Engine, EngineConfig, LoadRequest};
use tierload_key::{Model, SIZE_ORIGINAL};

/// Load files and URLs through a multi-tier cache.
#[derive(Debug, Parser)]
#[command(name = "tierload")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// File paths or http(s) URLs.
    #[arg(required = true)]
    models: Vec<String>,

    /// Requested width. Defaults to the original size.
    #[arg(long)]
    width: Option<i32>,

    /// Requested height. Defaults to the original size.
    #[arg(long)]
    height: Option<i32>,

    /// Number of loads per model.
    #[arg(long, default_value_t = 2)]
    repeat: u32,

    /// Disk cache directory.
    #[arg(long, env = "TIERLOAD_DISK_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Clear the disk cache before loading.
    #[arg(long)]
    clear_cache: bool,

    /// Print one JSON object per load.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct LoadReport<'a> {
    model: &'a str,
    attempt: u32,
    data_source: DataSource,
    size_bytes: usize,
    elapsed_ms: u64,
}

fn parse_model(raw: &str) -> Model {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        Model::url(raw)
    } else {
        Model::path(raw)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::from_env();
    config.disk_cache_dir = Some(
        cli.cache_dir
            .clone()
            .or(config.disk_cache_dir)
            .unwrap_or_else(|| std::env::temp_dir().join("tierload")),
    );
    info!(
        disk_cache_dir = ?config.disk_cache_dir,
        memory_cache_bytes = config.memory_cache_bytes,
        "Configuration loaded"
    );

    let engine = Engine::builder(config).build();
    if cli.clear_cache {
        engine
            .clear_disk_cache()
            .await
            .context("failed to clear disk cache")?;
    }

    let width = cli.width.unwrap_or(SIZE_ORIGINAL);
    let height = cli.height.unwrap_or(SIZE_ORIGINAL);

    for raw in &cli.models {
        for attempt in 1..=cli.repeat {
            let request = LoadRequest::of::<EncodedBytes>(parse_model(raw)).size(width, height);

            let started = Instant::now();
            let loaded = engine
                .get(request)
                .await
                .with_context(|| format!("failed to load {raw}"))?;
            let report = LoadReport {
                model: raw,
                attempt,
                data_source: loaded.data_source,
                size_bytes: loaded.resource.size_bytes(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            };

            if cli.json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                println!(
                    "{} #{}: {:?} ({} bytes, {} ms)",
                    report.model,
                    report.attempt,
                    report.data_source,
                    report.size_bytes,
                    report.elapsed_ms
                );
            }

            engine.release(loaded.resource).await?;
        }
    }

    let stats = engine.stats();
    info!(
        active_hits = stats.active_hits,
        memory_hits = stats.memory_hits,
        jobs_started = stats.jobs_started,
        "Done"
    );

    engine.shutdown().await?;
    Ok(())
}
