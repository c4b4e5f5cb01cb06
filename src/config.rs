//! Configuration types for usenet-post
//!
//! The configuration is loaded once from a JSON file before the posting run
//! starts and passed explicitly into every component; no component reads
//! ambient global state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration for a posting run
///
/// Mirrors the on-disk JSON document. Server entries are keyed by a short
/// name which the `--server` flag and `default_server` refer to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// The `From` address placed on every posted article
    pub from: String,

    /// Newsgroups posted to when no `-g` override is given
    pub default_groups: Vec<String>,

    /// String placed at the start of every subject line (a space is added)
    #[serde(default)]
    pub subject_prefix: String,

    /// Default path for the generated NZB index
    #[serde(default)]
    pub default_output: Option<PathBuf>,

    /// Name of the server entry used when `--server` is not given.
    /// When absent, every configured server is posted to concurrently.
    #[serde(default)]
    pub default_server: Option<String>,

    /// Maximum raw bytes per article (default: 768000)
    #[serde(default = "default_article_size")]
    pub article_size: u64,

    /// Write granularity for the wire connection in bytes (default: 10240)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// NNTP server configurations, keyed by name (at least one required)
    pub servers: HashMap<String, ServerConfig>,
}

/// NNTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname
    pub host: String,

    /// Server port (typically 119 for unencrypted, 563 for TLS)
    pub port: u16,

    /// Use TLS (implicit TLS, not STARTTLS)
    #[serde(default)]
    pub tls: bool,

    /// Skip certificate verification (self-signed servers)
    #[serde(default)]
    pub allow_insecure_tls: bool,

    /// Username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Number of concurrent connections to open (default: 1)
    #[serde(default = "default_connections")]
    pub connections: usize,
}

fn default_article_size() -> u64 {
    768_000
}

fn default_chunk_size() -> u64 {
    10_240
}

fn default_connections() -> usize {
    1
}

impl Config {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the rest of the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.from.is_empty() {
            return Err(Error::config_key("from address must not be empty", "from"));
        }
        if self.default_groups.is_empty() {
            return Err(Error::config_key(
                "at least one default group is required",
                "default_groups",
            ));
        }
        if self.article_size == 0 {
            return Err(Error::config_key(
                "article_size must be greater than zero",
                "article_size",
            ));
        }
        if self.chunk_size == 0 {
            return Err(Error::config_key(
                "chunk_size must be greater than zero",
                "chunk_size",
            ));
        }
        if self.servers.is_empty() {
            return Err(Error::config_key(
                "at least one server must be configured",
                "servers",
            ));
        }
        for (name, server) in &self.servers {
            if server.host.is_empty() {
                return Err(Error::config_key(
                    format!("server {name} has an empty host"),
                    "servers",
                ));
            }
            if server.connections == 0 {
                return Err(Error::config_key(
                    format!("server {name} must have at least one connection"),
                    "servers",
                ));
            }
        }
        Ok(())
    }

    /// Resolve which servers this run posts to.
    ///
    /// Precedence: explicit `--server` override, then `default_server`, then
    /// every configured server. Returned in name order so concurrent runs are
    /// deterministic. An unknown name is fatal.
    pub fn select_servers(&self, override_name: Option<&str>) -> Result<Vec<(String, ServerConfig)>> {
        let chosen = override_name.or(self.default_server.as_deref());
        if let Some(name) = chosen {
            let server = self.servers.get(name).ok_or_else(|| {
                Error::config_key(format!("unknown server: {name}"), "servers")
            })?;
            return Ok(vec![(name.to_string(), server.clone())]);
        }

        let mut all: Vec<(String, ServerConfig)> = self
            .servers
            .iter()
            .map(|(name, server)| (name.clone(), server.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        serde_json::from_str(
            r#"{
                "from": "poster <poster@example.com>",
                "default_groups": ["alt.binaries.test"],
                "servers": {
                    "main": { "host": "news.example.com", "port": 563, "tls": true,
                              "username": "u", "password": "p", "connections": 4 },
                    "backup": { "host": "news.backup.example", "port": 119 }
                }
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn defaults_are_applied() {
        let config = sample_config();
        assert_eq!(config.article_size, 768_000);
        assert_eq!(config.chunk_size, 10_240);
        assert_eq!(config.subject_prefix, "");
        let backup = &config.servers["backup"];
        assert_eq!(backup.connections, 1);
        assert!(!backup.tls);
        assert!(!backup.allow_insecure_tls);
        assert!(backup.username.is_none());
    }

    #[test]
    fn validate_rejects_zero_article_size() {
        let mut config = sample_config();
        config.article_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("article_size"));
    }

    #[test]
    fn validate_rejects_zero_connections() {
        let mut config = sample_config();
        config.servers.get_mut("main").unwrap().connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn select_servers_prefers_override() {
        let config = sample_config();
        let selected = config.select_servers(Some("backup")).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0, "backup");
    }

    #[test]
    fn select_servers_rejects_unknown_name() {
        let config = sample_config();
        assert!(config.select_servers(Some("nope")).is_err());
    }

    #[test]
    fn select_servers_defaults_to_all_in_name_order() {
        let config = sample_config();
        let selected = config.select_servers(None).unwrap();
        let names: Vec<&str> = selected.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["backup", "main"]);
    }

    #[test]
    fn select_servers_uses_default_server() {
        let mut config = sample_config();
        config.default_server = Some("main".to_string());
        let selected = config.select_servers(None).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0, "main");
    }
}
