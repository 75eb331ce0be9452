//! Sidecar configuration.
//!
//! One schema, read from TOML (or JSON, by extension), then overridden by
//! `CAPA_*` environment variables and finally by command-line flags.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use capa_core::{ResiliencyConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_APP_ID: &str = "capa";
pub const DEFAULT_HTTP_PORT: u16 = 3500;
pub const DEFAULT_RPC_PORT: u16 = 50001;
pub const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapaConfig {
    pub app: AppConfig,
    pub sidecar: SidecarConfig,
    pub resiliency: ResiliencyConfig,
}

/// The application the sidecar fronts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app_id: String,
    /// Port of the application's HTTP server. Enables the app channel.
    pub callback_port: Option<u16>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            callback_port: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    pub api_listen_addresses: Vec<String>,
    pub http_port: u16,
    /// Serves the public endpoints only.
    pub public_port: Option<u16>,
    pub rpc_port: u16,
    pub graceful_shutdown_secs: u64,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            api_listen_addresses: vec!["127.0.0.1".to_string()],
            http_port: DEFAULT_HTTP_PORT,
            public_port: None,
            rpc_port: DEFAULT_RPC_PORT,
            graceful_shutdown_secs: DEFAULT_GRACEFUL_SHUTDOWN_SECS,
        }
    }
}

impl CapaConfig {
    /// Load configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let parsed = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            toml::from_str(&content).map_err(|e| e.to_string())
        };
        parsed.map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Defaults or `path`, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply `CAPA_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(app_id) = lookup("CAPA_APP_ID") {
            self.app.app_id = app_id;
        }
        if let Some(value) = lookup("CAPA_APP_PORT") {
            self.app.callback_port = Some(parse_env("CAPA_APP_PORT", &value)?);
        }
        if let Some(value) = lookup("CAPA_LISTEN_ADDRESSES") {
            self.sidecar.api_listen_addresses = value
                .split(',')
                .map(str::trim)
                .filter(|address| !address.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = lookup("CAPA_HTTP_PORT") {
            self.sidecar.http_port = parse_env("CAPA_HTTP_PORT", &value)?;
        }
        if let Some(value) = lookup("CAPA_PUBLIC_PORT") {
            self.sidecar.public_port = Some(parse_env("CAPA_PUBLIC_PORT", &value)?);
        }
        if let Some(value) = lookup("CAPA_RPC_PORT") {
            self.sidecar.rpc_port = parse_env("CAPA_RPC_PORT", &value)?;
        }
        if let Some(value) = lookup("CAPA_GRACEFUL_SHUTDOWN_SECS") {
            self.sidecar.graceful_shutdown_secs =
                parse_env("CAPA_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.app_id.trim().is_empty() {
            return Err(ConfigError::Invalid("app_id must not be empty".to_string()));
        }
        if self.sidecar.api_listen_addresses.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one listen address is required".to_string(),
            ));
        }

        let mut ports = vec![
            ("http_port", self.sidecar.http_port),
            ("rpc_port", self.sidecar.rpc_port),
        ];
        if let Some(port) = self.sidecar.public_port {
            ports.push(("public_port", port));
        }
        if let Some(port) = self.app.callback_port {
            ports.push(("callback_port", port));
        }
        let mut seen = HashSet::new();
        for (name, port) in ports {
            if port == 0 {
                return Err(ConfigError::Invalid(format!("{name} must not be zero")));
            }
            if !seen.insert(port) {
                return Err(ConfigError::Invalid(format!(
                    "{name} {port} is already used by another listener"
                )));
            }
        }

        validate_policy("resiliency.actor_pre_lock", &self.resiliency.actor_pre_lock)?;
        for (actor_type, policy) in &self.resiliency.actor_types {
            validate_policy(&format!("resiliency.actor_types.{actor_type}"), policy)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}

fn validate_policy(name: &str, policy: &RetryPolicy) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&policy.jitter_factor) {
        return Err(ConfigError::Invalid(format!(
            "{name}.jitter_factor must be between 0 and 1"
        )));
    }
    if policy.base_delay_ms > policy.max_delay_ms {
        return Err(ConfigError::Invalid(format!(
            "{name}.base_delay_ms exceeds max_delay_ms"
        )));
    }
    Ok(())
}
