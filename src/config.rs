//! Cluster connection settings.
//!
//! Each field resolves independently: command-line flag, then environment,
//! then an optional JSON config file, then the built-in default.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use url::Url;

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:8500";
pub const SERVER_ENV: &str = "CONSUL_HTTP_ADDR";
pub const TOKEN_ENV: &str = "CONSUL_HTTP_TOKEN";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClusterConfig {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid server address {address:?}: {message}")]
    InvalidServer { address: String, message: String },
}

impl ClusterConfig {
    /// Fill unset fields from `fallback`.
    pub fn or(self, fallback: ClusterConfig) -> ClusterConfig {
        ClusterConfig {
            server: non_empty(self.server).or_else(|| non_empty(fallback.server)),
            token: non_empty(self.token).or_else(|| non_empty(fallback.token)),
        }
    }

    /// Settings taken from `CONSUL_HTTP_ADDR` / `CONSUL_HTTP_TOKEN`.
    pub fn from_env() -> ClusterConfig {
        ClusterConfig {
            server: std::env::var(SERVER_ENV).ok(),
            token: std::env::var(TOKEN_ENV).ok(),
        }
    }

    pub fn server(&self) -> &str {
        self.server
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(DEFAULT_SERVER)
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|value| !value.is_empty())
    }

    /// Parse the server address; a bare `host:port` is taken as plain HTTP.
    pub fn server_url(&self) -> Result<Url, ConfigError> {
        let address = self.server().trim();
        let invalid = |message: String| ConfigError::InvalidServer {
            address: address.to_string(),
            message,
        };
        let candidate = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };
        let url = Url::parse(&candidate).map_err(|err| invalid(err.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(format!("unsupported scheme {other:?}"))),
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("missing host".to_string()));
        }
        Ok(url)
    }
}

/// Load a JSON config file (`{"server": "...", "token": "..."}`).
pub fn load_config(path: &Path) -> Result<ClusterConfig> {
    let bytes = std::fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: ClusterConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    Ok(config)
}

/// Resolve the effective settings: flags, environment, config file, defaults.
pub fn resolve_config(flags: ClusterConfig, config_path: Option<&Path>) -> Result<ClusterConfig> {
    let file = match config_path {
        Some(path) => load_config(path)?,
        None => ClusterConfig::default(),
    };
    Ok(flags.or(ClusterConfig::from_env()).or(file))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(server: Option<&str>, token: Option<&str>) -> ClusterConfig {
        ClusterConfig {
            server: server.map(str::to_string),
            token: token.map(str::to_string),
        }
    }

    #[test]
    fn flags_win_over_fallback_per_field() {
        let merged = config(Some("https://a:8501"), None).or(config(Some("b:8500"), Some("t")));
        assert_eq!(merged.server(), "https://a:8501");
        assert_eq!(merged.token(), Some("t"));
    }

    #[test]
    fn empty_values_fall_through_to_defaults() {
        let merged = config(Some(""), Some("")).or(ClusterConfig::default());
        assert_eq!(merged.server(), DEFAULT_SERVER);
        assert_eq!(merged.token(), None);
    }

    #[test]
    fn server_url_rejects_unknown_scheme() {
        let err = config(Some("ftp://consul"), None)
            .server_url()
            .expect_err("ftp rejected");
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn load_config_reads_file_and_rejects_unknown_fields() {
        let dir = tempfile::tempdir().expect("temp dir");
        let good = dir.path().join("good.json");
        std::fs::write(&good, br#"{"server":"consul:8500","token":"abc"}"#).expect("write");
        let loaded = load_config(&good).expect("load");
        assert_eq!(loaded, config(Some("consul:8500"), Some("abc")));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, br#"{"address":"consul:8500"}"#).expect("write");
        assert!(load_config(&bad).is_err());
    }
}
