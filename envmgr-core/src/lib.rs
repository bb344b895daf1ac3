//! # envmgr core
//!
//! Pure building blocks for envmgr: the project configuration, the ordered
//! key-value [`Snapshot`] every backend is read into, and the reconciler that
//! applies create/update/delete requests to a snapshot.
//!
//! Nothing in this crate talks to a backend. Backends fetch a snapshot,
//! hand it to [`reconcile`], and persist the result themselves.
//!
//! ```
//! use envmgr_core::{Mutation, Snapshot, reconcile};
//!
//! let mut existing = Snapshot::parse_ini("FOO=1\nBAR=2").unwrap();
//! let proposed = Snapshot::from_iter([("BAZ", "3")]);
//! let outcome = reconcile(&mut existing, &Mutation::Create(proposed));
//!
//! assert!(outcome.any_change());
//! assert_eq!(existing.to_ini_string(), "FOO=1\nBAR=2\nBAZ=3");
//! ```

use std::io;

pub mod config;
pub mod reconcile;
pub mod snapshot;

pub use config::{
    ALL_ENVIRONMENTS, AccessKeys, AwsCredentials, BackendKind, ClusterTarget, Config,
    Credentials, ObjectStoreSettings, ProjectConfig, TargetSpec, TokenCredentials, ValueKind,
};
pub use reconcile::{
    Mutation, MutationKind, Reconciliation, SkipReason, Skipped, reconcile, reconcile_create,
    reconcile_delete, reconcile_update,
};
pub use snapshot::Snapshot;

/// Errors raised while reading configuration files or INI text.
#[derive(Debug)]
pub enum ParseError {
    /// I/O error when reading a file
    Io(io::Error),
    /// TOML parsing error
    Toml(toml::de::Error),
    /// Malformed `key=value` text
    Syntax { line: usize, message: String },
    /// A key or value that cannot be stored as a `key=value` line
    InvalidEntry { key: String, message: String },
    /// Structurally valid configuration that breaks a rule
    Validation(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Io(e) => write!(f, "I/O error: {}", e),
            ParseError::Toml(e) => write!(f, "TOML parsing error: {}", e),
            ParseError::Syntax { line, message } => write!(f, "line {}: {}", line, message),
            ParseError::InvalidEntry { key, message } => write!(f, "key {:?}: {}", key, message),
            ParseError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::Io(e) => Some(e),
            ParseError::Toml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        ParseError::Io(e)
    }
}

impl From<toml::de::Error> for ParseError {
    fn from(e: toml::de::Error) -> Self {
        ParseError::Toml(e)
    }
}
