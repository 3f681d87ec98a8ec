//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent
//! formatting and appropriate exit codes.

use imageforge::convert::ConvertError;
use std::fmt;
use std::path::PathBuf;
use std::process;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Invalid pipeline configuration
    Config(ConvertError),
    /// Failed to read an input file
    FileRead { path: PathBuf, error: std::io::Error },
    /// Input file extension is not a supported image format
    UnsupportedInput(PathBuf),
    /// Failed to import an image into the pipeline
    Import { path: PathBuf, error: ConvertError },
    /// Some items of the bulk conversion failed
    Convert { failed: usize, total: usize },
    /// Failed to write an output file
    FileWrite { path: PathBuf, error: std::io::Error },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Convert { .. } = self {
            eprintln!();
            eprintln!("Failed items are listed above and can be retried individually.");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Invalid configuration: {}", e),
            CliError::FileRead { path, error } => {
                write!(f, "Failed to read {}: {}", path.display(), error)
            }
            CliError::UnsupportedInput(path) => write!(
                f,
                "Unsupported input format: {} (expected png, jpg, webp, gif, or bmp)",
                path.display()
            ),
            CliError::Import { path, error } => {
                write!(f, "Failed to import {}: {}", path.display(), error)
            }
            CliError::Convert { failed, total } => {
                write!(f, "{} of {} conversions failed", failed, total)
            }
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write {}: {}", path.display(), error)
            }
        }
    }
}

impl std::error::Error for CliError {}
