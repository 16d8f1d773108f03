//! Server configuration loaded from `pagewire.yaml`.

use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "pagewire.yaml";

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Load and validate a config file. A missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path.as_ref()).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Self::parse(&contents)
    }

    /// Parse config text after expanding environment variables.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        // An empty or comment-only file deserializes as null.
        if expanded.lines().all(|l| {
            let l = l.trim();
            l.is_empty() || l.starts_with('#')
        }) {
            return Ok(Self::default());
        }
        let config: Self = serde_saphyr::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sessions.sweep_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "sessions.sweep_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "server.max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Serde Defaults
// ============================================================================

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    50051
}

fn default_request_timeout() -> u64 {
    300
}

fn default_keep_alive_interval() -> u64 {
    15
}

fn default_max_connections() -> usize {
    1024
}

fn default_eviction_timeout() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Timeout for non-streaming API requests.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Interval of SSE keep-alive comments on operation streams.
    #[serde(default = "default_keep_alive_interval")]
    pub keep_alive_interval_seconds: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            keep_alive_interval_seconds: default_keep_alive_interval(),
            max_connections: default_max_connections(),
        }
    }
}

// ============================================================================
// SessionsConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SessionsConfig {
    /// Sessions idle this long with nothing in flight are evicted.
    #[serde(default = "default_eviction_timeout")]
    pub eviction_timeout_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            eviction_timeout_seconds: default_eviction_timeout(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl SessionsConfig {
    pub fn eviction_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.eviction_timeout_seconds).unwrap_or(i64::MAX))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variable references in config text.
///
/// - `${VAR}` must be set
/// - `${VAR:-default}` falls back to `default` (which may be empty)
/// - `$$` is a literal `$`
/// - any other `$` is kept as-is
///
/// Defaults are not expanded recursively.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            result.push('$');
            rest = tail;
        } else if let Some(body) = after.strip_prefix('{') {
            let end = body.find('}').ok_or(ConfigError::UnclosedVarReference)?;
            result.push_str(&lookup_var(&body[..end])?);
            rest = &body[end + 1..];
        } else {
            result.push('$');
            rest = after;
        }
    }

    result.push_str(rest);
    Ok(result)
}

/// Resolve the inside of `${...}`.
fn lookup_var(reference: &str) -> Result<String, ConfigError> {
    let (name, default) = match reference.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (reference, None),
    };

    match (std::env::var(name), default) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_string()),
        (Err(_), None) => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 50051);
        assert_eq!(config.server.request_timeout_seconds, 300);
        assert_eq!(config.server.keep_alive_interval_seconds, 15);
        assert_eq!(config.server.max_connections, 1024);
        assert_eq!(config.sessions.eviction_timeout_seconds, 300);
        assert_eq!(config.sessions.sweep_interval(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_defaults() {
        let tmp_dir = TempDir::new().unwrap();
        let missing = tmp_dir.path().join("missing.yaml");
        let config = Config::load(&missing).await.unwrap();
        assert_eq!(config.server.port, 50051);
    }

    #[tokio::test]
    async fn test_load_valid_yaml() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 3000
  keep_alive_interval_seconds: 5
sessions:
  eviction_timeout_seconds: 30
  sweep_interval_seconds: 10
"#
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.keep_alive_interval_seconds, 5);
        assert_eq!(config.server.request_timeout_seconds, 300);
        assert_eq!(config.sessions.eviction_timeout(), chrono::Duration::seconds(30));
        assert_eq!(config.sessions.sweep_interval_seconds, 10);
    }

    #[test]
    fn test_empty_file_is_default() {
        let config = Config::parse("# nothing here\n\n").unwrap();
        assert_eq!(config.server.port, 50051);
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            Config::parse("server: [port"),
            Err(ConfigError::Yaml(_))
        ));
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let err = Config::parse("sessions:\n  sweep_interval_seconds: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_expand_env_vars() {
        // SAFETY: test-only env mutation with a name no other test uses.
        unsafe { std::env::set_var("PAGEWIRE_TEST_PORT", "4000") };

        assert_eq!(
            expand_env_vars("port: ${PAGEWIRE_TEST_PORT}").unwrap(),
            "port: 4000"
        );
        assert_eq!(
            expand_env_vars("host: ${PAGEWIRE_TEST_UNSET_HOST:-127.0.0.1}").unwrap(),
            "host: 127.0.0.1"
        );
        assert_eq!(expand_env_vars("x: ${PAGEWIRE_TEST_UNSET_X:-}").unwrap(), "x: ");
        assert_eq!(expand_env_vars("price: $100 $${LIT}").unwrap(), "price: $100 ${LIT}");
    }

    #[test]
    fn test_expand_env_vars_errors() {
        assert!(matches!(
            expand_env_vars("${PAGEWIRE_TEST_DEFINITELY_UNSET}"),
            Err(ConfigError::MissingEnvVar(name)) if name == "PAGEWIRE_TEST_DEFINITELY_UNSET"
        ));
        assert!(matches!(
            expand_env_vars("port: ${UNCLOSED"),
            Err(ConfigError::UnclosedVarReference)
        ));
    }

    #[tokio::test]
    async fn test_env_vars_expanded_on_load() {
        // SAFETY: test-only env mutation with a name no other test uses.
        unsafe { std::env::set_var("PAGEWIRE_TEST_EVICTION", "42") };

        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "sessions:\n  eviction_timeout_seconds: ${{PAGEWIRE_TEST_EVICTION}}"
        )
        .unwrap();

        let config = Config::load(file.path()).await.unwrap();
        assert_eq!(config.sessions.eviction_timeout_seconds, 42);
    }
}
