//! HTTP health endpoint and termination handling
//!
//! Serves the configured health path, mirroring upstream health while live
//! and failing fast once a termination signal has been received.

mod health;
mod liveness;
pub mod shutdown;

pub use health::{build_router, run_health_server, HealthState, HealthVerdict};
pub use health::{
    BODY_INTERNAL_ERROR, BODY_OK, BODY_TERMINATING, BODY_UPSTREAM_ERROR, BODY_UPSTREAM_UNAVAILABLE,
};
pub use liveness::{Liveness, LivenessState};
pub use shutdown::{
    shutdown_channel, termination_trigger, OsSignals, ShutdownController, ShutdownSignal,
    TerminationSource, TerminationTrigger, TerminationWatcher,
};

#[cfg(test)]
#[path = "health_test.rs"]
mod health_tests;

#[cfg(test)]
#[path = "liveness_test.rs"]
mod liveness_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;
