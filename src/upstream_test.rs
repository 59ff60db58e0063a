//! Tests for upstream probing

use super::*;
use axum::{http::StatusCode, routing::get, Router};
use std::time::Instant;
use tokio::net::TcpListener;

/// Start a fake upstream that answers /health with a fixed status
///
/// Returns the health URL. The server task lives until the runtime shuts down.
async fn spawn_upstream(status: StatusCode, delay: Duration) -> String {
    let app = Router::new().route(
        "/health",
        get(move || async move {
            tokio::time::sleep(delay).await;
            status
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    format!("http://{}/health", addr)
}

/// URL of a port nothing is listening on
async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/health", addr)
}

#[test]
fn test_classification_by_status_code() {
    assert_eq!(ProbeOutcome::from_status(200), ProbeOutcome::Healthy);
    assert_eq!(ProbeOutcome::from_status(204), ProbeOutcome::Healthy);
    assert_eq!(ProbeOutcome::from_status(301), ProbeOutcome::Healthy);
    assert_eq!(ProbeOutcome::from_status(404), ProbeOutcome::Healthy);
    assert_eq!(ProbeOutcome::from_status(499), ProbeOutcome::Healthy);
    assert_eq!(
        ProbeOutcome::from_status(500),
        ProbeOutcome::UpstreamError(500)
    );
    assert_eq!(
        ProbeOutcome::from_status(503),
        ProbeOutcome::UpstreamError(503)
    );
}

#[tokio::test]
async fn test_healthy_upstream_classified_healthy() {
    let url = spawn_upstream(StatusCode::OK, Duration::ZERO).await;
    let prober = HttpProber::new(url, Duration::from_secs(5)).unwrap();

    assert_eq!(prober.probe().await, ProbeOutcome::Healthy);
}

#[tokio::test]
async fn test_client_error_upstream_still_healthy() {
    let url = spawn_upstream(StatusCode::NOT_FOUND, Duration::ZERO).await;
    let prober = HttpProber::new(url, Duration::from_secs(5)).unwrap();

    assert_eq!(prober.probe().await, ProbeOutcome::Healthy);
}

#[tokio::test]
async fn test_redirect_not_followed_and_healthy() {
    let url = spawn_upstream(StatusCode::TEMPORARY_REDIRECT, Duration::ZERO).await;
    let prober = HttpProber::new(url, Duration::from_secs(5)).unwrap();

    assert_eq!(prober.probe().await, ProbeOutcome::Healthy);
}

#[tokio::test]
async fn test_server_error_upstream_classified_error() {
    let url = spawn_upstream(StatusCode::BAD_GATEWAY, Duration::ZERO).await;
    let prober = HttpProber::new(url, Duration::from_secs(5)).unwrap();

    assert_eq!(prober.probe().await, ProbeOutcome::UpstreamError(502));
}

#[tokio::test]
async fn test_connection_refused_classified_unreachable() {
    let url = closed_port_url().await;
    let prober = HttpProber::new(url, Duration::from_secs(5)).unwrap();

    assert_eq!(prober.probe().await, ProbeOutcome::UpstreamUnreachable);
}

#[tokio::test]
async fn test_slow_upstream_times_out_as_unreachable() {
    let url = spawn_upstream(StatusCode::OK, Duration::from_secs(10)).await;
    let timeout = Duration::from_millis(200);
    let prober = HttpProber::new(url, timeout).unwrap();

    let started = Instant::now();
    let outcome = prober.probe().await;
    let elapsed = started.elapsed();

    assert_eq!(outcome, ProbeOutcome::UpstreamUnreachable);
    assert!(
        elapsed < Duration::from_secs(2),
        "Probe should give up near the timeout, took {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_repeated_probes_are_consistent() {
    let url = spawn_upstream(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await;
    let prober = HttpProber::new(url, Duration::from_secs(5)).unwrap();

    for _ in 0..3 {
        assert_eq!(prober.probe().await, ProbeOutcome::UpstreamError(500));
    }
}

#[test]
fn test_target_reports_url() {
    let prober = HttpProber::new(
        "http://localhost:3000/health".to_string(),
        Duration::from_secs(1),
    )
    .unwrap();
    assert_eq!(prober.target(), "http://localhost:3000/health");
    assert_eq!(prober.timeout(), Some(Duration::from_secs(1)));
}

#[tokio::test]
async fn test_zero_timeout_means_no_deadline() {
    let url = spawn_upstream(StatusCode::OK, Duration::from_millis(50)).await;
    let prober = HttpProber::new(url, Duration::ZERO).unwrap();

    assert_eq!(prober.timeout(), None);
    assert_eq!(prober.probe().await, ProbeOutcome::Healthy);
}

#[tokio::test]
async fn test_redirect_reported_without_following_target() {
    // Redirect to a closed port: following it would make the probe unreachable
    let target = closed_port_url().await;
    let app = Router::new().route(
        "/health",
        get(move || {
            let target = target.clone();
            async move { axum::response::Redirect::temporary(&target) }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let prober = HttpProber::new(format!("http://{}/health", addr), Duration::from_secs(5)).unwrap();

    assert_eq!(prober.probe().await, ProbeOutcome::Healthy);
}
