//! CLI definitions using clap.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{CapaConfig, ConfigError};
use crate::telemetry::LogFormat;

/// Capa - actor API sidecar
#[derive(Parser, Debug)]
#[command(name = "capa")]
#[command(version)]
#[command(about = "Actor API sidecar serving HTTP and RPC")]
pub struct Cli {
    /// Configuration file (TOML, or JSON by extension)
    #[arg(short, long, env = "CAPA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Application id reported in metadata
    #[arg(long)]
    pub app_id: Option<String>,

    /// Port of the application's HTTP server
    #[arg(long)]
    pub app_port: Option<u16>,

    /// Internal HTTP API port
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Public HTTP API port
    #[arg(long)]
    pub public_port: Option<u16>,

    /// RPC API port
    #[arg(long)]
    pub rpc_port: Option<u16>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "CAPA_LOG_FORMAT")]
    pub log_format: LogFormat,
}

impl Cli {
    /// File, then environment, then flags; validated.
    pub fn load_config(&self) -> Result<CapaConfig, ConfigError> {
        let mut config = CapaConfig::load(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, config: &mut CapaConfig) {
        if let Some(app_id) = &self.app_id {
            config.app.app_id.clone_from(app_id);
        }
        if let Some(port) = self.app_port {
            config.app.callback_port = Some(port);
        }
        if let Some(port) = self.http_port {
            config.sidecar.http_port = port;
        }
        if let Some(port) = self.public_port {
            config.sidecar.public_port = Some(port);
        }
        if let Some(port) = self.rpc_port {
            config.sidecar.rpc_port = port;
        }
    }
}
