pub mod api;
pub mod bulk;
pub mod chunk_server;
pub mod chunker;
pub mod codec;
pub mod config;
pub mod encoding;
pub mod fetcher;
pub mod fingerprint;
pub mod metrics_defs;
pub mod normalize;
pub mod pipeline;
pub mod rate_limit;
pub mod refresh;
pub mod settings;
pub mod stats;
pub mod store;
pub mod writer;

use crate::api::AppState;
use crate::config::{Config, InvalidConfig, StoreConfig};
use crate::fetcher::SourceFetcher;
use crate::pipeline::{Pipeline, RunError, RunResult};
use crate::refresh::Aggregator;
use crate::store::{FilesystemStore, KvStore, MemoryStore};
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum AggregatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(#[from] InvalidConfig),

    #[error("aggregation run failed: {0}")]
    Run(#[from] RunError),
}

pub fn build_store(config: &StoreConfig) -> Arc<dyn KvStore> {
    match config {
        StoreConfig::Filesystem { path } => Arc::new(FilesystemStore::new(path)),
        StoreConfig::Memory => Arc::new(MemoryStore::new()),
    }
}

fn build_pipeline(config: &Config) -> Result<Pipeline, AggregatorError> {
    config.validate()?;
    let fetcher = SourceFetcher::new(config.fetch.options()?);
    Ok(Pipeline::new(build_store(&config.store), fetcher))
}

/// Serves the chunk and admin API on `listener` and the health probes on
/// `admin_listener` until either listener fails or the process receives
/// Ctrl-C.
pub async fn run(config: Config) -> Result<(), AggregatorError> {
    let pipeline = build_pipeline(&config)?;
    shared::metrics_defs::describe_all(metrics_defs::ALL_METRICS);

    let aggregator = Aggregator::new(pipeline, config.refresh.options()?);
    let state = AppState::new(
        aggregator.clone(),
        config.auth.clone(),
        &config.rate_limit,
        config.cache_max_age_secs,
    );

    let listener =
        TcpListener::bind(format!("{}:{}", config.listener.host, config.listener.port)).await?;
    tracing::info!(
        host = %config.listener.host,
        port = config.listener.port,
        "serving aggregator api"
    );
    let api = async {
        axum::serve(listener, api::router(state))
            .await
            .map_err(AggregatorError::from)
    };

    let probe = aggregator.clone();
    let admin = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        AdminService::<_, AggregatorError>::new(move || probe.is_ready()),
    );

    let result = tokio::select! {
        result = async { tokio::try_join!(api, admin) } => result.map(|_| ()),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    };

    aggregator.shutdown().await;
    result
}

/// Runs the pipeline once against the configured store and returns the result.
pub async fn refresh_once(config: Config) -> Result<RunResult, AggregatorError> {
    let pipeline = build_pipeline(&config)?;
    Ok(pipeline.run().await?)
}
