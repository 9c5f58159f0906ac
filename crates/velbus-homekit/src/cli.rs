//! Clap derive structures for the `velbus-homekit` binary.

use std::path::PathBuf;

use clap::Parser;

/// Velbus HomeKit bridge
#[derive(Debug, Parser)]
#[command(
    name = "velbus-homekit",
    version,
    about = "Velbus HomeKit bridge",
    long_about = "Mirrors the state of a Velbus gateway over its WebSocket stream and\n\
        exposes the configured channels as HomeKit accessories."
)]
pub struct Cli {
    // ── Inputs ──────────────────────────────────────────────────────
    /// Base URL for the Velbus REST interface (e.g. http://velbus.local:8080)
    pub base_url: String,

    /// YAML file describing the available controls. If this starts with
    /// http:// or https:// it is fetched as a URL
    pub controls_file: String,

    // ── Connection ──────────────────────────────────────────────────
    /// Patch-stream WebSocket URL (default: derived from the base URL)
    #[arg(long, env = "VELBUS_WEBSOCKET_URL")]
    pub websocket_url: Option<String>,

    /// Settings file (default: platform config directory)
    #[arg(long, short = 'c', env = "VELBUS_CONFIG")]
    pub config: Option<PathBuf>,

    // ── Logging ─────────────────────────────────────────────────────
    /// Log to the given file instead of stderr
    #[arg(long)]
    pub logfile: Option<PathBuf>,

    /// Enable verbose mode
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Enable debug mode
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Default log filter for the selected verbosity.
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_wins_over_verbose() {
        let cli = Cli::parse_from(["velbus-homekit", "-v", "--debug", "http://gw", "c.yaml"]);
        assert_eq!(cli.log_level(), "debug");

        let cli = Cli::parse_from(["velbus-homekit", "--verbose", "http://gw", "c.yaml"]);
        assert_eq!(cli.log_level(), "info");

        let cli = Cli::parse_from(["velbus-homekit", "http://gw", "c.yaml"]);
        assert_eq!(cli.log_level(), "warn");
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
