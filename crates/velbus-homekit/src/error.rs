//! Bridge error types with miette diagnostics.

use miette::Diagnostic;
use thiserror::Error;

use velbus_config::ConfigError;
use velbus_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Could not find `controls` in {source_name}")]
    #[diagnostic(
        code(velbus::no_controls),
        help(
            "The controls file needs a top-level `controls:` mapping, e.g.\n\
             controls:\n  Kitchen:\n    type: relay\n    icon: light\n    address: [0x0b, 1]"
        )
    )]
    NoControls { source_name: String },

    #[error("Could not fetch controls from {url}: {reason}")]
    #[diagnostic(
        code(velbus::fetch_failed),
        help("Check that the URL is reachable and returns the YAML controls file.")
    )]
    FetchFailed { url: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(velbus::validation))]
    Validation { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(velbus::config))]
    Config(ConfigError),

    // ── Accessories ──────────────────────────────────────────────────
    #[error("None of the configured controls is supported")]
    #[diagnostic(
        code(velbus::no_accessories),
        help("Supported (type, icon) pairs are listed in the log with --verbose.")
    )]
    NoAccessories,

    // ── Runtime ──────────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(velbus::core))]
    Core(#[from] CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoControls { source_name } => Self::NoControls { source_name },
            ConfigError::Fetch { url, reason } => Self::FetchFailed { url, reason },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } => exit_code::USAGE,
            Self::NoControls { .. } | Self::Config(_) | Self::NoAccessories => exit_code::CONFIG,
            Self::FetchFailed { .. } => exit_code::CONNECTION,
            Self::Core(CoreError::ConnectionFailed { .. } | CoreError::Timeout) => {
                exit_code::CONNECTION
            }
            Self::Core(_) | Self::Io(_) => exit_code::GENERAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_map_to_diagnostics() {
        let err: CliError = ConfigError::NoControls {
            source_name: "controls.yaml".into(),
        }
        .into();
        assert!(matches!(err, CliError::NoControls { .. }));
        assert_eq!(err.exit_code(), exit_code::CONFIG);

        let err: CliError = ConfigError::Validation {
            field: "base_url".into(),
            reason: "invalid URL".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }

    #[test]
    fn fetch_failure_is_a_connection_error() {
        let err: CliError = ConfigError::Fetch {
            url: "http://gw/controls.yaml".into(),
            reason: "Not Found".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
    }
}
