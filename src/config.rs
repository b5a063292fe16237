//! Host configuration.
//!
//! Read from `$NAT_OVERLAY_CONFIG`, else `<data_dir>/config.yaml`. A missing
//! file means defaults. String values may use `${VAR}` or `${VAR:-default}`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::session::ledger::DEFAULT_LEDGER_CAPACITY;
use crate::session::watchdog::MAX_KEEPALIVE_PERIOD;

pub const CONFIG_ENV: &str = "NAT_OVERLAY_CONFIG";
pub const SCOPE_ENV: &str = "NAT_OVERLAY_SCOPE";

#[derive(Debug, Error)]
#[error("configuration error: {reason}")]
pub struct ConfigError {
    pub reason: String,
}

// ─── Public Types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Streaming endpoint of the remote agent service.
    pub agent_endpoint: String,
    /// Where confirm/reject decisions are posted. Defaults to
    /// `<agent_endpoint>/confirm`.
    #[serde(rename = "confirm_endpoint")]
    pub confirm_endpoint_override: Option<String>,
    pub keepalive_interval_secs: u64,
    pub ledger_capacity: usize,
    pub connect_timeout_secs: u64,
    pub stream_timeout_secs: u64,
    /// Tab-session identifier the ledger rows are keyed by.
    pub ledger_scope: Option<String>,
    pub db_path: Option<String>,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            agent_endpoint: "http://localhost:8787/agent/stream".into(),
            confirm_endpoint_override: None,
            keepalive_interval_secs: 20,
            ledger_capacity: DEFAULT_LEDGER_CAPACITY,
            connect_timeout_secs: 5,
            stream_timeout_secs: 300,
            ledger_scope: None,
            db_path: None,
        }
    }
}

impl OverlayConfig {
    pub fn confirm_endpoint(&self) -> String {
        match &self.confirm_endpoint_override {
            Some(endpoint) => endpoint.clone(),
            None => format!("{}/confirm", self.agent_endpoint.trim_end_matches('/')),
        }
    }

    pub fn keepalive_period(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    /// Configured scope, else `$NAT_OVERLAY_SCOPE`, else a fresh one.
    pub fn resolve_scope(&self) -> String {
        if let Some(scope) = self.ledger_scope.as_ref().filter(|s| !s.is_empty()) {
            return scope.clone();
        }
        match std::env::var(SCOPE_ENV) {
            Ok(scope) if !scope.is_empty() => scope,
            _ => uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn resolve_db_path(&self, data_dir: &Path) -> PathBuf {
        match &self.db_path {
            Some(path) => PathBuf::from(expand_tilde(path)),
            None => data_dir.join("overlay.db"),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent_endpoint.trim().is_empty() {
            return Err(ConfigError {
                reason: "agent_endpoint must not be empty".into(),
            });
        }
        if self.keepalive_interval_secs == 0
            || Duration::from_secs(self.keepalive_interval_secs) > MAX_KEEPALIVE_PERIOD
        {
            return Err(ConfigError {
                reason: format!(
                    "keepalive_interval_secs must be between 1 and {}, got {}",
                    MAX_KEEPALIVE_PERIOD.as_secs(),
                    self.keepalive_interval_secs
                ),
            });
        }
        if self.ledger_capacity == 0 {
            return Err(ConfigError {
                reason: "ledger_capacity must be at least 1".into(),
            });
        }
        if self.connect_timeout_secs == 0 || self.stream_timeout_secs == 0 {
            return Err(ConfigError {
                reason: "timeouts must be non-zero".into(),
            });
        }
        Ok(())
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// `$NAT_OVERLAY_CONFIG` if set, else `<data_dir>/config.yaml`.
pub fn config_path(data_dir: &Path) -> PathBuf {
    match std::env::var(CONFIG_ENV) {
        Ok(path) if !path.is_empty() => PathBuf::from(expand_tilde(&path)),
        _ => data_dir.join("config.yaml"),
    }
}

/// Load the config at `path`, or defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<OverlayConfig, ConfigError> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no config file, using defaults");
        let config = OverlayConfig::default();
        config.validate()?;
        return Ok(config);
    }

    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<OverlayConfig, ConfigError> {
    let interpolated = interpolate_env_vars(raw);
    if interpolated.trim().is_empty() {
        return Ok(OverlayConfig::default());
    }
    let config: OverlayConfig = serde_yaml::from_str(&interpolated).map_err(|e| ConfigError {
        reason: format!("failed to parse config: {e}"),
    })?;
    config.validate()?;
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Substitute `${VAR}` / `${VAR:-default}`. An unterminated `${` is kept as is.
fn interpolate_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find('}') {
            Some(close) => {
                out.push_str(&resolve_var_expr(&after[..close]));
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OverlayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.keepalive_interval_secs, 20);
        assert_eq!(config.ledger_capacity, 50);
        assert_eq!(
            config.confirm_endpoint(),
            "http://localhost:8787/agent/stream/confirm"
        );
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let config = parse_config(
            "agent_endpoint: https://agent.example.com/stream/\nledger_scope: tab-7\n",
        )
        .unwrap();
        assert_eq!(config.confirm_endpoint(), "https://agent.example.com/stream/confirm");
        assert_eq!(config.resolve_scope(), "tab-7");
        assert_eq!(config.stream_timeout_secs, 300);
    }

    #[test]
    fn test_explicit_confirm_endpoint_wins() {
        let config = parse_config("confirm_endpoint: http://x/decide\n").unwrap();
        assert_eq!(config.confirm_endpoint(), "http://x/decide");
    }

    #[test]
    fn test_keepalive_must_stay_under_a_minute() {
        let err = parse_config("keepalive_interval_secs: 60\n").unwrap_err();
        assert!(err.reason.contains("keepalive_interval_secs"));
        assert!(parse_config("keepalive_interval_secs: 59\n").is_ok());
        assert!(parse_config("keepalive_interval_secs: 0\n").is_err());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(parse_config("ledger_capacity: 0\n").is_err());
    }

    #[test]
    fn test_interpolation_with_default() {
        std::env::remove_var("__NAT_TEST_UNSET__");
        let config =
            parse_config("agent_endpoint: ${__NAT_TEST_UNSET__:-http://fallback/stream}\n").unwrap();
        assert_eq!(config.agent_endpoint, "http://fallback/stream");
    }

    #[test]
    fn test_interpolation_with_value() {
        std::env::set_var("__NAT_TEST_ENDPOINT__", "http://from-env/stream");
        let config =
            parse_config("agent_endpoint: ${__NAT_TEST_ENDPOINT__:-http://fallback}\n").unwrap();
        assert_eq!(config.agent_endpoint, "http://from-env/stream");
        std::env::remove_var("__NAT_TEST_ENDPOINT__");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("config.yaml")).unwrap();
        assert_eq!(config.ledger_capacity, 50);
    }

    #[test]
    fn test_load_from_file_and_db_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "db_path: /tmp/nat/ledger.db\nledger_capacity: 10\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.ledger_capacity, 10);
        assert_eq!(
            config.resolve_db_path(dir.path()),
            PathBuf::from("/tmp/nat/ledger.db")
        );
        assert_eq!(
            OverlayConfig::default().resolve_db_path(dir.path()),
            dir.path().join("overlay.db")
        );
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        assert_eq!(parse_config("\n").unwrap().keepalive_interval_secs, 20);
    }

    #[test]
    fn test_unterminated_placeholder_is_left_alone() {
        assert_eq!(interpolate_env_vars("a ${B c"), "a ${B c");
        assert_eq!(interpolate_env_vars("cost: $5"), "cost: $5");
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/overlay.db");
        assert!(!result.starts_with('~'));
        assert!(result.ends_with("/overlay.db"));
    }
}
