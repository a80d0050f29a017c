//! Errors raised by Conan backends.
//!
//! These never cross the [`ConanApi`](crate::api::ConanApi) boundary: the
//! facade logs them and answers with an empty value instead.

use conan_schema::ReferenceError;
use thiserror::Error;

/// Failure of a single backend call.
#[derive(Error, Debug)]
pub enum BackendError {
    /// No `conan` on `PATH` and none configured.
    #[error("Conan executable not found: {0}")]
    NotFound(#[from] which::Error),

    /// Spawning or talking to the process failed.
    #[error("Failed to run conan: {0}")]
    Io(#[from] std::io::Error),

    /// Non-zero exit; `stderr` is the last line written.
    #[error("'conan {command}' failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("'conan {command}' timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("Invalid JSON from conan: {0}")]
    Json(#[from] serde_json::Error),

    /// Output did not have the expected shape.
    #[error("Unexpected conan output: {0}")]
    Parse(String),

    /// A remote answered with an error, e.g. an unknown recipe.
    #[error("Remote '{remote}': {message}")]
    Remote { remote: String, message: String },

    /// Neither Conan 1 nor Conan 2.
    #[error("Unsupported Conan version {0}")]
    UnsupportedVersion(String),

    #[error("Invalid reference: {0}")]
    Reference(#[from] ReferenceError),
}

impl BackendError {
    /// Shorthand for output that did not have the expected shape.
    pub fn parse(msg: impl std::fmt::Display) -> Self {
        Self::Parse(msg.to_string())
    }
}
