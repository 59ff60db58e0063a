//! Environment configuration for the sidecar
//!
//! Listen-side settings have defaults. Upstream settings are mandatory and
//! are validated up front so a misconfigured sidecar never starts serving.

use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Default port for the health endpoint
pub const DEFAULT_PORT: u16 = 8080;

/// Default path the health endpoint is served on
pub const DEFAULT_HEALTHCHECK_PATH: &str = "/healthz";

/// Default delay between the first termination signal and process exit
pub const DEFAULT_TERMINATION_DELAY: Duration = Duration::from_secs(120);

pub const ENV_PORT: &str = "PORT";
pub const ENV_HEALTHCHECK_PATH: &str = "HEALTHCHECK_PATH";
pub const ENV_TERMINATION_DELAY: &str = "TERMINATION_DELAY";
pub const ENV_UPSTREAM_PORT: &str = "UPSTREAM_PORT";
pub const ENV_UPSTREAM_HEALTHCHECK_PATH: &str = "UPSTREAM_HEALTHCHECK_PATH";
pub const ENV_UPSTREAM_TIMEOUT: &str = "UPSTREAM_TIMEOUT";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("error parsing {name}={value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Resolved sidecar settings, fixed for the lifetime of the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub listen_port: u16,
    pub health_path: String,
    pub termination_delay: Duration,
    pub upstream_url: String,
    pub upstream_timeout: Duration,
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    ///
    /// Tests pass a map-backed closure here instead of mutating the process
    /// environment, which races under parallel test execution.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_port = match lookup(ENV_PORT) {
            Some(value) => parse_port(ENV_PORT, value)?,
            None => DEFAULT_PORT,
        };

        let health_path = match lookup(ENV_HEALTHCHECK_PATH) {
            Some(value) => parse_route_path(ENV_HEALTHCHECK_PATH, value)?,
            None => DEFAULT_HEALTHCHECK_PATH.to_string(),
        };

        let termination_delay = match lookup(ENV_TERMINATION_DELAY) {
            Some(value) => match parse_duration(&value) {
                Ok(delay) => delay,
                Err(reason) => {
                    warn!(
                        name = ENV_TERMINATION_DELAY,
                        value = %value,
                        reason = %reason,
                        default = ?DEFAULT_TERMINATION_DELAY,
                        "Invalid termination delay, using default"
                    );
                    DEFAULT_TERMINATION_DELAY
                }
            },
            None => DEFAULT_TERMINATION_DELAY,
        };

        let upstream_port = parse_port(ENV_UPSTREAM_PORT, require(&lookup, ENV_UPSTREAM_PORT)?)?;
        let upstream_path = parse_path(
            ENV_UPSTREAM_HEALTHCHECK_PATH,
            require(&lookup, ENV_UPSTREAM_HEALTHCHECK_PATH)?,
        )?;

        let timeout_value = require(&lookup, ENV_UPSTREAM_TIMEOUT)?;
        let upstream_timeout =
            parse_duration(&timeout_value).map_err(|reason| ConfigError::Invalid {
                name: ENV_UPSTREAM_TIMEOUT,
                value: timeout_value.clone(),
                reason,
            })?;

        Ok(Self {
            listen_port,
            health_path,
            termination_delay,
            upstream_url: format!("http://localhost:{}{}", upstream_port, upstream_path),
            upstream_timeout,
        })
    }
}

fn require<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).ok_or(ConfigError::Missing(name))
}

fn parse_port(name: &'static str, value: String) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        })
}

fn parse_path(name: &'static str, value: String) -> Result<String, ConfigError> {
    if value.starts_with('/') {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            name,
            value,
            reason: "path must start with '/'".to_string(),
        })
    }
}

/// Validate a path the health endpoint is routed on
///
/// Literal paths only: axum treats `:x`, `*x` and `{x}` segments as
/// captures and panics on the legacy forms.
fn parse_route_path(name: &'static str, value: String) -> Result<String, ConfigError> {
    let value = parse_path(name, value)?;

    let reason = if value.contains('{') || value.contains('}') {
        Some("path must not contain '{' or '}'")
    } else if value
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        Some("path segments must not start with ':' or '*'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ConfigError::Invalid {
            name,
            value,
            reason: reason.to_string(),
        }),
        None => Ok(value),
    }
}

/// Parse a duration such as "300ms", "1.5h" or "2m30s"
///
/// Accepts a sequence of decimal numbers, each with an optional fraction and
/// a unit suffix (ns, us, µs, ms, s, m, h). A bare "0" is also accepted.
/// A well-formed negative duration clamps to zero.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    let (negative, mut rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(format!("invalid duration {:?}", input));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_end);

        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);

        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            "" => return Err(format!("missing unit in duration {:?}", input)),
            other => return Err(format!("unknown unit {:?} in duration {:?}", other, input)),
        };

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(format!("invalid duration {:?}", input));
        }

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| format!("invalid duration {:?}", input))?
        };
        let mut nanos = whole
            .checked_mul(scale)
            .ok_or_else(|| format!("duration {:?} out of range", input))?;

        if !fraction.is_empty() {
            let mut value: u128 = 0;
            let mut divisor: u128 = 1;
            // Digits past nanosecond precision of an hour contribute nothing
            for digit in fraction.bytes().take(18) {
                value = value * 10 + u128::from(digit - b'0');
                divisor *= 10;
            }
            nanos += value * scale / divisor;
        }

        total = total
            .checked_add(nanos)
            .ok_or_else(|| format!("duration {:?} out of range", input))?;
        rest = tail;
    }

    let nanos = u64::try_from(total).map_err(|_| format!("duration {:?} out of range", input))?;
    if negative {
        return Ok(Duration::ZERO);
    }
    Ok(Duration::from_nanos(nanos))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
