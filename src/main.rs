//! # Capa - sidecar entry point
//!
//! ## Startup
//!
//! 1. **Configuration** - file, `CAPA_*` environment, then flags
//! 2. **Telemetry** - text or JSON logs filtered by `RUST_LOG`
//! 3. **Listeners** - best-effort bind on every listen address
//! 4. **Sidecar** - gateway with the in-memory runtime, then every server
//!
//! ## Shutdown
//!
//! SIGTERM/SIGINT or a shutdown request stops the actor runtime and gives
//! in-flight requests the configured grace period. The process exits `0`
//! after a graceful shutdown and `1` on any fatal error.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use capa::{Cli, Listeners, Sidecar, telemetry};
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = telemetry::init(cli.log_format) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = format!("{e:#}"), "capa exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let start_time = Instant::now();
    let config = cli.load_config().context("failed to load configuration")?;
    info!(app_id = %config.app.app_id, "capa sidecar starting");

    let listeners = Listeners::bind(&config.sidecar)
        .await
        .context("failed to bind API listeners")?;
    let sidecar = Sidecar::new(config).context("failed to compose sidecar")?;
    info!(startup_ms = start_time.elapsed().as_millis(), "listeners bound");

    let stats = sidecar.run(listeners).await?;
    info!(
        forced = stats.forced,
        duration_ms = stats.total_duration_ms,
        "capa sidecar stopped"
    );
    Ok(())
}
