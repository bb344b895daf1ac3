//! envmgr - create, read, update and delete environment variables and secrets
//! wherever a project keeps them
//!
//! Every project environment lives in one backend:
//!
//! - **Object store**: an INI file per environment and value kind in a bucket
//! - **Branch env**: branch-level environment variables of a hosted app
//! - **App platform**: the `envs` list of one component in a managed app spec
//! - **Cluster**: a ConfigMap (envs) or Secret (secrets)
//!
//! A cluster resource can also mirror the changes made to an object-store
//! file. Each command fetches the current values into a
//! [`Snapshot`](envmgr_core::Snapshot), reconciles the request against it,
//! and writes back only when something changed.
//!
//! # Example
//!
//! ```no_run
//! use envmgr::{EnvManager, MutateOptions, Selection};
//! use envmgr_core::{Snapshot, ValueKind};
//!
//! fn main() -> envmgr::Result<()> {
//!     let manager = EnvManager::load()?;
//!     let selection = Selection::new("shop", "all", ValueKind::Envs);
//!     let pairs = Snapshot::from_iter([("FEATURE_X", "on")]);
//!     manager.create(&selection, &pairs, MutateOptions { mirror: true, quiet: false })?;
//!     Ok(())
//! }
//! ```

mod error;
mod manager;

pub mod backend;
pub mod prompt;

pub use error::{EnvMgrError, Result};
pub use manager::{EnvManager, MutateOptions, Outcome, Query, Selection, read_pairs};

use envmgr_core::Config;
use directories::ProjectDirs;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Overrides the configuration file location.
pub const CONFIG_ENV: &str = "ENVMGR_CONFIG";

/// Location of `config.toml`: `$ENVMGR_CONFIG`, or the platform config
/// directory (typically `~/.config/envmgr/config.toml`).
pub fn config_path() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    let dirs = ProjectDirs::from("", "", "envmgr").ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "Could not find config directory")
    })?;
    Ok(dirs.config_dir().join("config.toml"))
}

/// Loads and validates the configuration file.
pub fn load_config() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        return Err(EnvMgrError::NoConfig(path));
    }
    Ok(Config::try_from(path.as_path())?)
}

/// Loads the configuration file if there is one.
pub fn load_config_if_present() -> Result<Option<Config>> {
    match load_config() {
        Ok(config) => Ok(Some(config)),
        Err(EnvMgrError::NoConfig(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Writes the configuration file, creating parent directories. The file holds
/// credentials, so on Unix it is readable by the owner only.
pub fn save_config(config: &Config) -> Result<PathBuf> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(&path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut permissions = fs::metadata(&path)?.permissions();
        permissions.set_mode(0o600);
        fs::set_permissions(&path, permissions)?;
    }

    Ok(path)
}
