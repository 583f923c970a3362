use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tscached::{config, http};
use tscached_backend::{KairosClient, KairosConfig};
use tscached_cache::RedisBackend;

#[derive(Parser)]
#[command(name = "tscached")]
#[command(about = "Caching proxy in front of a time-series database backend")]
#[command(version)]
struct Cli {
    /// Path to the YAML config file.
    #[arg(short, long, default_value = "tscached.yaml")]
    config: PathBuf,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Directory to serve `GET /` from when present.
    #[arg(long)]
    static_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = config::Config::load(&cli.config)?;

    let cache = Arc::new(RedisBackend::connect(&config.redis_url).await?);
    let backend = KairosClient::new(KairosConfig::new(config.kairosdb_host.clone(), config.kairosdb_port))?;

    let state = Arc::new(http::AppState {
        cache,
        backend,
        engine_config: config.engine,
        readahead_config: config.readahead,
        expiry: config.expiry,
    });

    let app = http::router(state, cli.static_dir.as_deref());
    let listener = tokio::net::TcpListener::bind(&cli.listen).await?;
    tracing::info!(addr = %cli.listen, "tscached listening");
    axum::serve(listener, app).await?;

    Ok(())
}
