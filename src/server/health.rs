//! Health endpoint
//!
//! - Terminating: 503 "terminating", upstream is never contacted
//! - Live: probe the upstream once and mirror its health

use super::liveness::{Liveness, LivenessState};
use crate::upstream::{ProbeOutcome, UpstreamProber};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub const BODY_OK: &str = "OK";
pub const BODY_TERMINATING: &str = "terminating";
pub const BODY_UPSTREAM_UNAVAILABLE: &str = "upstream service is not available";
pub const BODY_UPSTREAM_ERROR: &str = "upstream service is returning error";
pub const BODY_INTERNAL_ERROR: &str = "internal server error";

/// Result of evaluating one health request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    /// Sidecar is draining; upstream was not probed
    Terminating,
    /// Sidecar is live; carries the upstream probe classification
    Probed(ProbeOutcome),
}

impl HealthVerdict {
    pub fn status(&self) -> StatusCode {
        match self {
            HealthVerdict::Probed(ProbeOutcome::Healthy) => StatusCode::OK,
            HealthVerdict::Terminating
            | HealthVerdict::Probed(ProbeOutcome::UpstreamUnreachable)
            | HealthVerdict::Probed(ProbeOutcome::UpstreamError(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            HealthVerdict::Terminating => BODY_TERMINATING,
            HealthVerdict::Probed(ProbeOutcome::Healthy) => BODY_OK,
            HealthVerdict::Probed(ProbeOutcome::UpstreamUnreachable) => BODY_UPSTREAM_UNAVAILABLE,
            HealthVerdict::Probed(ProbeOutcome::UpstreamError(_)) => BODY_UPSTREAM_ERROR,
        }
    }
}

impl IntoResponse for HealthVerdict {
    fn into_response(self) -> Response {
        (self.status(), self.body()).into_response()
    }
}

/// Shared state for the health endpoint
#[derive(Clone)]
pub struct HealthState {
    liveness: LivenessState,
    prober: Arc<dyn UpstreamProber>,
}

impl HealthState {
    pub fn new(liveness: LivenessState, prober: Arc<dyn UpstreamProber>) -> Self {
        Self { liveness, prober }
    }

    /// Evaluate health for one request
    ///
    /// The liveness flag is checked before any I/O so draining stays fast
    /// even when the upstream is already gone.
    pub async fn evaluate(&self) -> HealthVerdict {
        match self.liveness.current() {
            Liveness::Terminating => HealthVerdict::Terminating,
            Liveness::Live => HealthVerdict::Probed(self.prober.probe().await),
        }
    }
}

/// Health handler
///
/// Evaluation runs in its own task so a panic surfaces as a 500 for this
/// request only.
async fn health(State(state): State<HealthState>) -> Response {
    let started = Instant::now();
    let upstream = state.prober.target().to_string();

    let task_state = state.clone();
    let verdict = match tokio::spawn(async move { task_state.evaluate().await }).await {
        Ok(verdict) => verdict,
        Err(e) => {
            error!(error = %e, upstream = %upstream, "Health check failed unexpectedly");
            return (StatusCode::INTERNAL_SERVER_ERROR, BODY_INTERNAL_ERROR).into_response();
        }
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    match verdict {
        HealthVerdict::Terminating => {
            info!(elapsed_ms, "Terminating, returning unhealthy response")
        }
        HealthVerdict::Probed(ProbeOutcome::Healthy) => {
            info!(upstream = %upstream, elapsed_ms, "Upstream is healthy")
        }
        HealthVerdict::Probed(ProbeOutcome::UpstreamUnreachable) => {
            warn!(upstream = %upstream, elapsed_ms, "Upstream is not available")
        }
        HealthVerdict::Probed(ProbeOutcome::UpstreamError(status)) => {
            warn!(upstream = %upstream, status, elapsed_ms, "Upstream returned error")
        }
    }

    verdict.into_response()
}

/// Build the router serving the health endpoint on `path`
///
/// `path` must be a literal path starting with '/', without capture syntax.
pub fn build_router(path: &str, state: HealthState) -> Router {
    Router::new().route(path, get(health)).with_state(state)
}

/// Run the health server on the specified port until `shutdown` resolves
///
/// # Arguments
/// * `port` - The port to listen on
/// * `path` - The path to serve the health check on
/// * `state` - Liveness flag and upstream prober
/// * `shutdown` - Future that stops the server when it completes
pub async fn run_health_server<F>(
    port: u16,
    path: &str,
    state: HealthState,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = build_router(path, state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    // Log after successful bind - server is actually listening
    info!(port = %port, path = %path, "Health server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
