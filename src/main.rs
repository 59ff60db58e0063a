use drainguard::config::Config;
use drainguard::server::{
    run_health_server, shutdown_channel, HealthState, LivenessState, OsSignals, TerminationWatcher,
};
use drainguard::upstream::HttpProber;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };

    info!(
        port = config.listen_port,
        path = %config.health_path,
        upstream = %config.upstream_url,
        upstream_timeout = ?config.upstream_timeout,
        termination_delay = ?config.termination_delay,
        "Starting health check sidecar"
    );

    // Install signal handlers before serving so no signal is missed
    let signals = match OsSignals::new() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "Failed to register termination signal handlers");
            return Err(e.into());
        }
    };

    let (shutdown_controller, mut shutdown_signal) = shutdown_channel();
    let liveness = LivenessState::new();

    let watcher_handle = TerminationWatcher::new(
        signals,
        liveness.clone(),
        config.termination_delay,
        shutdown_controller,
    )
    .spawn();

    let prober = match HttpProber::new(config.upstream_url.clone(), config.upstream_timeout) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!(error = %e, "Failed to create upstream prober");
            return Err(e.into());
        }
    };
    let state = HealthState::new(liveness, prober);

    let mut server_signal = shutdown_signal.clone();
    let port = config.listen_port;
    let health_path = config.health_path.clone();
    let mut server_handle = tokio::spawn(async move {
        run_health_server(port, &health_path, state, async move {
            server_signal.wait().await
        })
        .await
    });

    // Run until the termination delay has elapsed
    tokio::select! {
        result = &mut server_handle => {
            watcher_handle.abort();
            return match result {
                Ok(Ok(())) => Err(anyhow::anyhow!("health server stopped unexpectedly")),
                Ok(Err(e)) => {
                    error!(error = %e, "Health server failed");
                    Err(e.into())
                }
                Err(e) => Err(anyhow::anyhow!("health server task failed: {}", e)),
            };
        }
        _ = shutdown_signal.wait() => {}
    }

    // Exit is bounded by the delay, in-flight probes are not awaited
    server_handle.abort();

    info!("Health check sidecar shut down");
    Ok(())
}
