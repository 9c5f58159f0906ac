mod cli;
mod error;

use std::path::Path;

use clap::Parser;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use velbus_core::{AccessoryRegistry, Bridge, ConnectionManager, CoreError, RelayClient};

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let guard = match init_tracing(cli.log_level(), cli.logfile.as_deref()) {
        Ok(guard) => guard,
        Err(err) => exit(err, None),
    };

    if let Err(err) = run(cli).await {
        exit(err, guard);
    }
}

fn exit(err: CliError, guard: Option<WorkerGuard>) -> ! {
    let code = err.exit_code();
    tracing::error!(error = %err, "bridge stopped");
    // Flush the log file before the process goes away.
    drop(guard);
    eprintln!("{:?}", miette::Report::new(err));
    std::process::exit(code);
}

/// Log to stderr, or to `logfile` without ANSI colours. `RUST_LOG`
/// overrides `level`.
fn init_tracing(level: &str, logfile: Option<&Path>) -> Result<Option<WorkerGuard>, CliError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let Some(path) = logfile else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let file_name = path.file_name().ok_or_else(|| CliError::Validation {
        field: "logfile".into(),
        reason: format!("not a file path: {}", path.display()),
    })?;
    let log_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    Ok(Some(guard))
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut settings = velbus_config::load_settings(cli.config.as_deref())?;
    if let Some(ws) = cli.websocket_url {
        settings.websocket_url = Some(ws);
    }
    let config = velbus_config::to_bridge_config(&settings, &cli.base_url)?;

    let controls = velbus_config::load_controls(&cli.controls_file, &config.transport).await?;
    let client =
        RelayClient::new(config.gateway_url.clone(), &config.transport).map_err(CoreError::from)?;

    let bridge = Bridge::from_controls(&AccessoryRegistry::builtin(), &controls, &client);
    if bridge.is_empty() {
        return Err(CliError::NoAccessories);
    }

    let manager = ConnectionManager::new(config.connection);
    // Subscribe requests go out once the stream connects.
    bridge.attach(&manager)?;

    let mut states = manager.watch_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            debug!(%state, "gateway connection state changed");
        }
    });

    manager.start();
    info!(
        gateway = %config.gateway_url,
        websocket = %manager.config().websocket_url,
        accessories = bridge.len(),
        "bridge running"
    );

    shutdown_signal().await?;

    info!("shutting down");
    manager.shutdown().await;
    Ok(())
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() -> Result<(), CliError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => debug!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}
