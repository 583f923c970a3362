//! Standalone read-ahead worker: load config, contend for leadership, run
//! one pass over the shadow list, exit.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tscached::config::Config;
use tscached_backend::{KairosClient, KairosConfig, SHADOW_LIST_KEY};
use tscached_cache::RedisBackend;

#[derive(Parser)]
#[command(name = "tscached-readahead")]
#[command(about = "Runs one read-ahead pass over the shadow list, then exits")]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = "tscached.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "could not load config");
            return ExitCode::FAILURE;
        }
    };

    let cache = match RedisBackend::connect(&config.redis_url).await {
        Ok(cache) => cache,
        Err(e) => {
            tracing::error!(error = %e, "could not connect to cache");
            return ExitCode::FAILURE;
        }
    };

    let backend = match KairosClient::new(KairosConfig::new(config.kairosdb_host.clone(), config.kairosdb_port)) {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!(error = %e, "could not build backend client");
            return ExitCode::FAILURE;
        }
    };

    let now = tscached_backend::now_unix_seconds();
    match tscached_readahead::perform_readahead(&cache, &backend, &config.engine, &config.readahead, SHADOW_LIST_KEY, now).await {
        Ok(Some(summary)) => {
            tracing::info!(?summary, "read-ahead pass complete");
            ExitCode::SUCCESS
        }
        Ok(None) => {
            tracing::info!("did not acquire leadership this cycle");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "read-ahead pass failed");
            ExitCode::FAILURE
        }
    }
}
