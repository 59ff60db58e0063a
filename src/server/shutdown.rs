//! Graceful drain and delayed shutdown
//!
//! On the first SIGTERM/SIGINT the sidecar:
//! - Flips liveness to terminating so health checks fail immediately
//! - Waits out the termination delay while the load balancer drains
//! - Signals the process to exit
//!
//! The signal source is pluggable so tests can fire a synthetic trigger.

use super::liveness::LivenessState;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

/// Shutdown signal receiver
///
/// Resolves once the termination delay has elapsed.
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Wait for shutdown signal
    pub async fn wait(&mut self) {
        while !*self.receiver.borrow() {
            if self.receiver.changed().await.is_err() {
                // Sender dropped, treat as shutdown
                break;
            }
        }
    }

    /// Check if shutdown was signaled (non-blocking)
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Controller for triggering shutdown
pub struct ShutdownController {
    sender: watch::Sender<bool>,
}

impl ShutdownController {
    /// Trigger shutdown
    pub fn shutdown(&self) {
        let _ = self.sender.send(true);
        info!("Shutdown signal sent");
    }
}

/// Create a new shutdown signal pair
///
/// Returns (controller, signal) where:
/// - controller: Owned by the termination watcher
/// - signal: Awaited by main to know when to exit
pub fn shutdown_channel() -> (ShutdownController, ShutdownSignal) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownController { sender }, ShutdownSignal { receiver })
}

/// Source of termination events
#[async_trait]
pub trait TerminationSource: Send {
    /// Wait for the next termination event and return its name
    async fn wait(&mut self) -> String;
}

/// OS signal source: SIGTERM and SIGINT on unix, Ctrl+C elsewhere
///
/// Handlers are installed in `new()`, so registration failures surface at
/// startup. Once installed, further signals are absorbed instead of
/// killing the process.
pub struct OsSignals {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
}

impl OsSignals {
    #[cfg(unix)]
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    #[cfg(not(unix))]
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn next_signal(&mut self) -> String {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM".to_string(),
            _ = self.sigint.recv() => "SIGINT".to_string(),
        }
    }

    #[cfg(not(unix))]
    async fn next_signal(&mut self) -> String {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to wait for Ctrl+C, draining anyway");
        }
        "CTRL_C".to_string()
    }
}

#[async_trait]
impl TerminationSource for OsSignals {
    async fn wait(&mut self) -> String {
        self.next_signal().await
    }
}

/// Handle for firing synthetic termination events
#[derive(Clone)]
pub struct TerminationTrigger {
    sender: mpsc::UnboundedSender<String>,
}

impl TerminationTrigger {
    /// Fire a termination event with the given name
    pub fn fire(&self, name: &str) {
        let _ = self.sender.send(name.to_string());
    }
}

/// Channel-backed termination source, fired through a `TerminationTrigger`
pub struct ChannelSource {
    receiver: mpsc::UnboundedReceiver<String>,
}

/// Create a synthetic termination source and its trigger
pub fn termination_trigger() -> (TerminationTrigger, ChannelSource) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (TerminationTrigger { sender }, ChannelSource { receiver })
}

#[async_trait]
impl TerminationSource for ChannelSource {
    async fn wait(&mut self) -> String {
        match self.receiver.recv().await {
            Some(name) => name,
            // Every trigger dropped without firing: never terminate
            None => std::future::pending::<String>().await,
        }
    }
}

/// Watches for the first termination event and schedules process exit
///
/// Acts exactly once. There is no cancellation: once terminating, shutdown
/// fires after `delay` regardless of anything else.
pub struct TerminationWatcher<S> {
    source: S,
    liveness: LivenessState,
    delay: Duration,
    controller: ShutdownController,
}

impl<S: TerminationSource + 'static> TerminationWatcher<S> {
    pub fn new(
        source: S,
        liveness: LivenessState,
        delay: Duration,
        controller: ShutdownController,
    ) -> Self {
        Self {
            source,
            liveness,
            delay,
            controller,
        }
    }

    /// Wait for termination, drain for `delay`, then trigger shutdown
    pub async fn run(mut self) {
        let signal = self.source.wait().await;
        info!(signal = %signal, "Caught termination signal");

        if self.liveness.mark_terminating() {
            info!("Will return unhealthy response");
        }

        info!(delay = ?self.delay, "Terminating after delay");
        tokio::time::sleep(self.delay).await;

        info!("Termination delay expired, exiting");
        self.controller.shutdown();
    }

    /// Run the watcher as a background task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
