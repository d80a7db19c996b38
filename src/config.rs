use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::transport::{TlsPolicy, TlsVersions};

/// How much load to generate: a fixed request count or a time box.
/// Exactly one mode is active per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Count(u64),
    Duration(Duration),
}

/// Main configuration for the load test, loaded from environment
/// variables by the settings collaborator.
#[derive(Debug, Clone)]
pub struct Config {
    pub target_url: String,
    pub post_data: Option<String>,
    pub worker_count: usize,
    pub run_mode: RunMode,
    pub tls: TlsPolicy,
    pub silent: bool,
    pub verbose: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    /// Any [`ConfigError`] returned here is fatal: the caller aborts before
    /// generating load.
    pub fn from_env() -> Result<Self, ConfigError> {
        let target_url =
            env::var("TARGET_URL").map_err(|_| ConfigError::MissingVar("TARGET_URL"))?;

        let post_data = match env::var("POST_DATA") {
            Ok(body) if !body.is_empty() => {
                // The body is documented as JSON; catch typos before the run.
                serde_json::from_str::<serde_json::Value>(&body)?;
                Some(body)
            }
            _ => None,
        };

        let worker_count = parse_worker_count()?;
        let run_mode = parse_run_mode()?;

        let tls = TlsPolicy {
            verify_peer: !bool_var("SKIP_TLS_VERIFY"),
            debug_verify: bool_var("TLS_DEBUG_VERIFY"),
            override_on_failure: bool_var("TLS_OVERRIDE_VERIFY"),
            allowed_versions: parse_tls_versions()?,
        };

        Ok(Config {
            target_url,
            post_data,
            worker_count,
            run_mode,
            tls,
            silent: bool_var("SILENT"),
            verbose: bool_var("VERBOSE"),
        })
    }
}

fn bool_var(name: &str) -> bool {
    env::var(name)
        .unwrap_or_else(|_| "false".to_string())
        .to_lowercase()
        == "true"
}

/// Worker count defaults to the hardware concurrency; 4 is the fallback
/// when the hint cannot be computed.
fn parse_worker_count() -> Result<usize, ConfigError> {
    let raw = match env::var("NUM_WORKERS") {
        Ok(value) if !value.is_empty() => value,
        _ => return Ok(default_worker_count()),
    };
    let parsed = raw
        .parse::<usize>()
        .map_err(|e| ConfigError::InvalidValue {
            var: "NUM_WORKERS",
            value: raw.clone(),
            reason: e.to_string(),
        })?;
    if parsed == 0 {
        Ok(default_worker_count())
    } else {
        Ok(parsed)
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4)
}

/// Exactly one of REQUEST_COUNT / TEST_DURATION selects the dispatch mode.
fn parse_run_mode() -> Result<RunMode, ConfigError> {
    let count = env::var("REQUEST_COUNT").ok().filter(|v| !v.is_empty());
    let duration = env::var("TEST_DURATION").ok().filter(|v| !v.is_empty());

    match (count, duration) {
        (Some(count), None) => {
            let parsed = count.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
                var: "REQUEST_COUNT",
                value: count.clone(),
                reason: e.to_string(),
            })?;
            if parsed == 0 {
                return Err(ConfigError::InvalidValue {
                    var: "REQUEST_COUNT",
                    value: count,
                    reason: "must be greater than zero".to_string(),
                });
            }
            Ok(RunMode::Count(parsed))
        }
        (None, Some(duration)) => {
            let parsed = parse_duration(&duration).map_err(|reason| ConfigError::InvalidValue {
                var: "TEST_DURATION",
                value: duration.clone(),
                reason,
            })?;
            if parsed.is_zero() {
                return Err(ConfigError::InvalidValue {
                    var: "TEST_DURATION",
                    value: duration,
                    reason: "must be greater than zero".to_string(),
                });
            }
            Ok(RunMode::Duration(parsed))
        }
        _ => Err(ConfigError::AmbiguousRunMode),
    }
}

/// Parses "30s", "10m", "2h" or a bare number of seconds.
fn parse_duration(raw: &str) -> Result<Duration, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("duration cannot be empty".to_string());
    }

    let (value_text, multiplier) = match trimmed.chars().last() {
        Some('s') => (&trimmed[..trimmed.len() - 1], 1),
        Some('m') => (&trimmed[..trimmed.len() - 1], 60),
        Some('h') => (&trimmed[..trimmed.len() - 1], 60 * 60),
        Some(c) if c.is_ascii_digit() => (trimmed, 1),
        Some(c) => return Err(format!("unknown duration unit '{}'; use 's', 'm' or 'h'", c)),
        None => return Err("duration cannot be empty".to_string()),
    };

    let value = value_text
        .parse::<u64>()
        .map_err(|_| format!("invalid numeric value '{}'", value_text))?;
    Ok(Duration::from_secs(value * multiplier))
}

/// TLS_VERSIONS is a comma-separated subset of "1.2,1.3"; both by default.
fn parse_tls_versions() -> Result<TlsVersions, ConfigError> {
    let raw = match env::var("TLS_VERSIONS") {
        Ok(value) if !value.is_empty() => value,
        _ => return Ok(TlsVersions::default()),
    };

    let mut versions = TlsVersions {
        tls12: false,
        tls13: false,
    };
    for part in raw.split(',') {
        match part.trim() {
            "1.2" => versions.tls12 = true,
            "1.3" => versions.tls13 = true,
            other => {
                return Err(ConfigError::InvalidValue {
                    var: "TLS_VERSIONS",
                    value: raw.clone(),
                    reason: format!("unknown TLS version '{}'", other),
                })
            }
        }
    }
    if !versions.tls12 && !versions.tls13 {
        return Err(ConfigError::NoTlsVersions);
    }
    Ok(versions)
}
