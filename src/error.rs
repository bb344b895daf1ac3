//! Error types for envmgr operations

use std::path::PathBuf;
use thiserror::Error;

// Internal use only
use envmgr_core::ParseError;

/// The main error type for envmgr operations
///
/// Configuration problems, backend failures and operator interaction
/// failures all end up here. Per-key precondition violations are not errors;
/// they are reported as skipped keys on the reconciliation result.
#[derive(Error, Debug)]
pub enum EnvMgrError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(
        "No configuration found at {}.\n\nCreate it with your projects, then run 'envmgr config init' to add credentials.",
        .0.display()
    )]
    NoConfig(PathBuf),
    #[error("Project '{project}' not found. Available projects: {available}")]
    ProjectNotFound { project: String, available: String },
    #[error(
        "Environment '{environment}' not found in project '{project}'. Available environments: {available}"
    )]
    EnvironmentNotFound {
        project: String,
        environment: String,
        available: String,
    },
    #[error("Malformed key=value text: {0}")]
    Syntax(String),
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),
    #[error("Missing setting: {0}")]
    MissingSetting(String),
    #[error(
        "Invalid input file {}: {message}\nAre you sure the file is in INI format (<key>=<value>)?",
        path.display()
    )]
    InvalidInput { path: PathBuf, message: String },
    #[error("{backend} operation failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
    #[error("Conflict while writing {0}")]
    Conflict(String),
    #[error("Gave up writing {resource} after {attempts} conflicting attempts")]
    RetriesExhausted { resource: String, attempts: u32 },
    #[error("Unsupported resource: {0}")]
    UnsupportedResource(String),
    #[error("{failed} of {total} environment(s) failed")]
    EnvironmentsFailed { failed: usize, total: usize },
    #[error("User interaction error: {0}")]
    InquireError(#[from] inquire::InquireError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EnvMgrError {
    pub(crate) fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        EnvMgrError::Backend {
            backend,
            message: message.into(),
        }
    }
}

/// A type alias for `Result<T, EnvMgrError>`
pub type Result<T> = std::result::Result<T, EnvMgrError>;

impl From<ParseError> for EnvMgrError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Io(io_err) => EnvMgrError::Io(io_err),
            ParseError::Toml(toml_err) => EnvMgrError::Toml(toml_err),
            err @ ParseError::Syntax { .. } => EnvMgrError::Syntax(err.to_string()),
            err @ ParseError::InvalidEntry { .. } => EnvMgrError::InvalidEntry(err.to_string()),
            ParseError::Validation(msg) => EnvMgrError::InvalidConfig(msg),
        }
    }
}
