use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use usage_sampler::cache::{LatestCache, MemoryLatestCache, RedisLatestCache};
use usage_sampler::db::sample_store::{MemorySampleStore, PgSampleStore, SampleStore};
use usage_sampler::server::config::AppConfig;
use usage_sampler::server::probe::SysinfoProbe;
use usage_sampler::server::sampler::Sampler;
use usage_sampler::services::QueryService;
use usage_sampler::web;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "sampler.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C.");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM.");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Config comes first because it decides where logs go.
    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&config.log_dir);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting usage sampler.");

    // --- Sample Store Setup ---
    let store: Arc<dyn SampleStore> = match config.database_url.as_deref() {
        Some(database_url) => {
            let store = PgSampleStore::connect(database_url).await.map_err(|e| {
                error!(error = %e, "Failed to connect to the sample database.");
                e
            })?;
            info!("Using PostgreSQL sample store.");
            Arc::new(store)
        }
        None => {
            warn!("No database URL configured; samples are kept in memory only.");
            Arc::new(MemorySampleStore::new())
        }
    };

    // --- Latest Sample Cache Setup ---
    let cache: Arc<dyn LatestCache> = match config.redis_url.as_deref() {
        Some(redis_url) => {
            let cache = RedisLatestCache::connect(redis_url, config.cache_ttl())
                .await
                .map_err(|e| {
                    error!(error = %e, "Failed to connect to the Redis cache.");
                    e
                })?;
            Arc::new(cache)
        }
        None => {
            info!(
                ttl_seconds = config.cache_ttl_seconds,
                "Using in-process latest-sample cache."
            );
            Arc::new(MemoryLatestCache::new(config.cache_ttl()))
        }
    };

    // --- Sampler Task ---
    let shutdown = CancellationToken::new();
    let sampler = Arc::new(Sampler::new(
        Arc::new(SysinfoProbe::new()),
        store.clone(),
        cache.clone(),
        config.sampler_config(),
    ));
    let sampler_handle = sampler.spawn(shutdown.child_token());

    // --- Axum HTTP Server Setup ---
    let query_service = Arc::new(QueryService::new(
        store.clone(),
        cache.clone(),
        config.query_config(),
    ));
    let app = web::create_axum_router(query_service, &config.cors_allowed_origins);

    let addr: SocketAddr = config.listen_address.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, "HTTP server listening.");

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Stop scheduling new ticks; a tick already running is allowed to finish.
    shutdown.cancel();
    if let Err(e) = sampler_handle.await {
        error!(error = %e, "Sampler task ended abnormally.");
    }

    serve_result?;
    info!("Usage sampler stopped.");
    Ok(())
}
