//! HTTP plumbing around the job store: one upload route and two token-gated
//! download routes.

pub mod error;
pub mod handlers;
pub mod response;

use crate::batch::BatchProcessor;
use crate::codec::ImageCodec;
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::reaper::Reaper;
use crate::workspace::{Clock, JobStore, SystemClock};
use axum::body::Body;
use axum::extract::DefaultBodyLimit;
use axum::http::Request;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<JobStore>,
    pub processor: Arc<BatchProcessor>,
    pub body_limit: usize,
}

impl AppState {
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: &ServiceConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = Arc::new(JobStore::new(
            config.workspace_root.clone(),
            config.job_ttl(),
            clock,
        )?);
        let processor = Arc::new(BatchProcessor::new(
            Arc::clone(&store),
            Arc::new(ImageCodec),
            config.batch_policy(),
        )?);

        Ok(Self {
            store,
            processor,
            body_limit: config.request_body_limit(),
        })
    }
}

pub fn router(state: AppState) -> Router {
    // Spans carry the path only: the query string holds the job token.
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        tracing::info_span!(
            "http_request",
            method = %request.method(),
            path = %request.uri().path(),
        )
    });

    Router::new()
        .route("/api/compress", post(handlers::compress))
        .route("/download/{job_id}/{file}", get(handlers::download))
        .route("/zip/{job_id}", get(handlers::archive))
        .layer(DefaultBodyLimit::max(state.body_limit))
        .layer(trace)
        .with_state(state)
}

/// Runs the service until `shutdown` is cancelled. The reaper shares the
/// same token, so both stop together.
pub async fn serve(config: ServiceConfig, shutdown: CancellationToken) -> Result<()> {
    config.validate()?;
    let state = AppState::from_config(&config)?;

    let reaper = Arc::new(Reaper::new(
        Arc::clone(&state.store),
        config.sweep_interval(),
        config.orphan_grace(),
    ));
    let reaper_handle = reaper.spawn(shutdown.clone());

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(
        addr = %config.bind,
        workspace_root = %config.workspace_root.display(),
        ttl_secs = config.job_ttl_secs,
        "Listening"
    );

    let graceful = shutdown.clone();
    let served = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { graceful.cancelled().await })
        .await;

    shutdown.cancel();
    if let Err(e) = reaper_handle.await {
        tracing::warn!(error = %e, "Reaper task ended abnormally");
    }

    served?;
    Ok(())
}
