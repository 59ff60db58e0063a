//! drainguard - health-check sidecar with graceful drain on shutdown
//!
//! Serves a local health endpoint that mirrors the health of a co-located
//! upstream process. On SIGTERM/SIGINT it flips to unhealthy immediately so
//! load balancers stop routing traffic, then exits after a fixed delay.

pub mod config;
pub mod server;
pub mod upstream;
