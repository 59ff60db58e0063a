//! Upstream health probing
//!
//! One GET per health request, no retries. The result is classified into a
//! `ProbeOutcome` that the health handler maps to an HTTP response.
//!
//! Follows a trait-based pattern so handlers can be driven by a mock:
//! - `UpstreamProber` trait for abstraction
//! - `HttpProber` for production (reqwest)

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Classification of a single upstream probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Upstream answered with a status below 500 (4xx included)
    Healthy,
    /// Connection failed or the request deadline expired
    UpstreamUnreachable,
    /// Upstream answered with a 5xx status
    UpstreamError(u16),
}

impl ProbeOutcome {
    /// Classify an HTTP status code returned by the upstream
    pub fn from_status(status: u16) -> Self {
        if status >= 500 {
            ProbeOutcome::UpstreamError(status)
        } else {
            ProbeOutcome::Healthy
        }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Upstream request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Upstream unreachable: {0}")]
    Unreachable(String),

    #[error("Failed to build upstream HTTP client: {0}")]
    Client(String),
}

/// Trait for probing the upstream health endpoint
#[async_trait]
pub trait UpstreamProber: Send + Sync {
    /// Probe the upstream once and classify the result
    async fn probe(&self) -> ProbeOutcome;

    /// URL being probed, for logging
    fn target(&self) -> &str;
}

/// HTTP prober backed by a shared reqwest client
///
/// The timeout is the total request deadline (connect + response). A zero
/// timeout means no deadline. Redirects are not followed: a 3xx is the
/// upstream's own answer.
pub struct HttpProber {
    client: reqwest::Client,
    url: String,
    timeout: Option<Duration>,
}

impl HttpProber {
    pub fn new(url: String, timeout: Duration) -> Result<Self, ProbeError> {
        let timeout = (!timeout.is_zero()).then_some(timeout);

        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    /// Request deadline, `None` when probes wait indefinitely
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Send the GET and return the upstream status code
    async fn status(&self) -> Result<u16, ProbeError> {
        let response = self.client.get(&self.url).send().await.map_err(|e| {
            match self.timeout {
                Some(timeout) if e.is_timeout() => ProbeError::Timeout(timeout),
                _ => ProbeError::Unreachable(e.to_string()),
            }
        })?;

        Ok(response.status().as_u16())
    }
}

#[async_trait]
impl UpstreamProber for HttpProber {
    async fn probe(&self) -> ProbeOutcome {
        match self.status().await {
            Ok(status) => ProbeOutcome::from_status(status),
            Err(e) => {
                debug!(url = %self.url, error = %e, "Failed to call upstream");
                ProbeOutcome::UpstreamUnreachable
            }
        }
    }

    fn target(&self) -> &str {
        &self.url
    }
}

/// Mock prober for testing with a fixed outcome and a call counter
#[cfg(test)]
pub struct MockProber {
    outcome: ProbeOutcome,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockProber {
    pub fn new(outcome: ProbeOutcome) -> Self {
        Self {
            outcome,
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl UpstreamProber for MockProber {
    async fn probe(&self) -> ProbeOutcome {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.outcome
    }

    fn target(&self) -> &str {
        "mock://upstream/health"
    }
}

#[cfg(test)]
#[path = "upstream_test.rs"]
mod tests;
