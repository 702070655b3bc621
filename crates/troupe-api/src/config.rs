//! Server configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use troupe_session::CoordinatorConfig;

use crate::error::AppError;

/// Runtime configuration for the playground server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// YAML catalog to load instead of the built-in templates.
    pub templates_path: Option<PathBuf>,
    /// Simulated peers connected at startup.
    pub peers: Vec<String>,
    pub idle_timeout: Duration,
    /// `None` disables the background sweeper.
    pub sweep_interval: Option<Duration>,
    pub enforce_phase_deadlines: bool,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable holds an invalid value.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable holds an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "PORT", 3000_u16)?;
        let templates_path = lookup("TROUPE_TEMPLATES")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let peers = lookup("TROUPE_PEERS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        let idle_timeout = Duration::from_secs(parse_or(&lookup, "TROUPE_IDLE_TIMEOUT_SECS", 1800_u64)?);
        if idle_timeout.is_zero() {
            return Err(AppError::Config(
                "TROUPE_IDLE_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }
        let sweep_secs = parse_or(&lookup, "TROUPE_SWEEP_INTERVAL_SECS", 30_u64)?;
        let enforce_phase_deadlines = parse_or(&lookup, "TROUPE_ENFORCE_PHASE_DEADLINES", true)?;

        Ok(Self {
            host,
            port,
            templates_path,
            peers,
            idle_timeout,
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),
            enforce_phase_deadlines,
        })
    }

    /// The address to bind.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `host:port` is not a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }

    /// Coordinator tunables derived from this configuration.
    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            idle_timeout: self.idle_timeout,
            enforce_phase_deadlines: self.enforce_phase_deadlines,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
    }
}
