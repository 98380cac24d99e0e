//! Error types and handling
//!
//! Common error types used across the crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::output::OutputError;
use crate::plugin::PluginError;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),
}

/// Error report for hosts that surface errors as structured text
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Output(_) => "OUTPUT_ERROR",
            AppError::Plugin(_) => "PLUGIN_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_codes() {
        let response: ErrorResponse = AppError::Output(OutputError::StartFailed {
            kind: "adv_file_output".into(),
            reason: "encoder busy".into(),
        })
        .into();
        assert_eq!(response.code, "OUTPUT_ERROR");
        assert_eq!(
            response.message,
            "Output error: Failed to start output 'adv_file_output': encoder busy"
        );

        let response: ErrorResponse = AppError::Plugin(PluginError::AlreadyLoaded).into();
        assert_eq!(response.code, "PLUGIN_ERROR");
        assert_eq!(response.message, "Plugin error: AutoSplit is already loaded");
    }
}
