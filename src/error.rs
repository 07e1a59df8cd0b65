//! Error types for packdiag

use thiserror::Error;

/// Errors that can occur while loading or analysing a pack log
#[derive(Debug, Error)]
pub enum DiagnosticError {
    /// Malformed or ambiguous input: wrong column count, unparseable cell,
    /// zero or several current-column matches.
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// Input that is well-formed but too small to analyse.
    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl DiagnosticError {
    /// Short machine-readable code for the error family
    pub fn code(&self) -> &'static str {
        match self {
            DiagnosticError::DataFormat(_) => "DATA_FORMAT_ERROR",
            DiagnosticError::DegenerateInput(_) => "DEGENERATE_INPUT",
            DiagnosticError::Config(_) => "CONFIG_ERROR",
            DiagnosticError::Io(_) => "IO_ERROR",
            DiagnosticError::JsonError(_) => "JSON_ERROR",
        }
    }
}
