//! Coordinator configuration
//!
//! Defines the configurable parameters of the coordinator: bind address,
//! the concurrent pipeline cap and the long-poll timings of the runner
//! job request endpoint.

use std::path::PathBuf;
use std::time::Duration;

/// Coordinator configuration
///
/// Long-poll timings are parameters so tests can drive them in
/// milliseconds.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// Maximum number of pipelines that may be running at once
    pub max_pipelines: usize,

    /// How long a job request waits for a job before answering 204
    pub long_poll_timeout: Duration,

    /// How often a waiting job request checks the pending queue
    pub long_poll_interval: Duration,

    /// TLS certificate path; termination is left to the deployment
    pub tls_cert: Option<PathBuf>,

    /// TLS private key path
    pub tls_key: Option<PathBuf>,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - GITLABHUB_ADDR (default: 0.0.0.0:8080)
    /// - GITLABHUB_MAX_PIPELINES (positive integer, default: 10)
    /// - GITLABHUB_LONG_POLL_TIMEOUT_MS (default: 30000)
    /// - GITLABHUB_LONG_POLL_INTERVAL_MS (default: 500)
    /// - GLH_TLS_CERT / GLH_TLS_KEY
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr = lookup("GITLABHUB_ADDR")
            .filter(|addr| !addr.trim().is_empty())
            .unwrap_or(defaults.bind_addr);

        let max_pipelines = lookup("GITLABHUB_MAX_PIPELINES")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_pipelines);

        let long_poll_timeout = lookup("GITLABHUB_LONG_POLL_TIMEOUT_MS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.long_poll_timeout);

        let long_poll_interval = lookup("GITLABHUB_LONG_POLL_INTERVAL_MS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.long_poll_interval);

        Self {
            bind_addr,
            max_pipelines,
            long_poll_timeout,
            long_poll_interval,
            tls_cert: lookup("GLH_TLS_CERT").map(PathBuf::from),
            tls_key: lookup("GLH_TLS_KEY").map(PathBuf::from),
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.max_pipelines == 0 {
            anyhow::bail!("max_pipelines must be greater than 0");
        }

        if self.long_poll_interval.is_zero() {
            anyhow::bail!("long_poll_interval must be greater than 0");
        }

        if self.long_poll_interval > self.long_poll_timeout {
            anyhow::bail!("long_poll_interval cannot exceed long_poll_timeout");
        }

        if self.tls_cert.is_some() != self.tls_key.is_some() {
            anyhow::bail!("GLH_TLS_CERT and GLH_TLS_KEY must be set together");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            max_pipelines: 10,
            long_poll_timeout: Duration::from_secs(30),
            long_poll_interval: Duration::from_millis(500),
            tls_cert: None,
            tls_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_pipelines, 10);
        assert_eq!(config.long_poll_timeout, Duration::from_secs(30));
        assert_eq!(config.long_poll_interval, Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = from_pairs(&[
            ("GITLABHUB_ADDR", "127.0.0.1:9000"),
            ("GITLABHUB_MAX_PIPELINES", "3"),
            ("GITLABHUB_LONG_POLL_TIMEOUT_MS", "200"),
            ("GITLABHUB_LONG_POLL_INTERVAL_MS", "10"),
        ]);
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.max_pipelines, 3);
        assert_eq!(config.long_poll_timeout, Duration::from_millis(200));
        assert_eq!(config.long_poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_invalid_max_pipelines_falls_back_to_default() {
        assert_eq!(from_pairs(&[("GITLABHUB_MAX_PIPELINES", "0")]).max_pipelines, 10);
        assert_eq!(from_pairs(&[("GITLABHUB_MAX_PIPELINES", "lots")]).max_pipelines, 10);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.tls_cert = Some(PathBuf::from("/tls/cert.pem"));
        assert!(config.validate().is_err());

        config.tls_key = Some(PathBuf::from("/tls/key.pem"));
        assert!(config.validate().is_ok());

        config.long_poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
