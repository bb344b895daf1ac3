use crate::Result;
use envmgr_core::{BackendKind, Reconciliation, Snapshot, ValueKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub mod app_platform;
pub mod branch_env;
pub mod cluster;
pub mod connector;
pub mod object_store;
pub mod registry;


pub use app_platform::{AppPlatformBackend, PlatformApi, PlatformApp};
pub use branch_env::{AmplifyClient, BranchEnvBackend};
pub use cluster::{ClusterBackend, ClusterResource, KubeClient, ResourceKind, RetryPolicy};
pub use connector::CloudConnector;
pub use object_store::{ObjectStoreBackend, S3CompatibleStore};
pub use registry::{BackendInfo, BackendRegistry};

/// One environment file: a project, one of its environments and a value kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub project: String,
    pub environment: String,
    pub kind: ValueKind,
}

impl Target {
    pub fn new(project: impl Into<String>, environment: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            project: project.into(),
            environment: environment.into(),
            kind,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "project \"{}\" in \"{}\" environment ({})",
            self.project, self.environment, self.kind
        )
    }
}

/// A place that holds the values of one [`Target`].
///
/// Backends only read and write. Deciding what changes is the reconciler's
/// job; `persist` is only called when the reconciliation changed something.
pub trait Backend {
    fn kind(&self) -> BackendKind;

    /// Reads the current values into a fresh snapshot.
    fn fetch(&self) -> Result<Snapshot>;

    /// Writes the reconciled state back. `snapshot` is the full new state and
    /// `outcome` lists exactly what changed; each backend uses whichever its
    /// write API needs.
    fn persist(&self, snapshot: &Snapshot, outcome: &Reconciliation) -> Result<()>;
}

/// Object storage holding INI files.
pub trait ObjectStore: Send + Sync {
    fn get_object(&self, key: &str) -> Result<Vec<u8>>;
    fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()>;
}

/// Branch-level environment variables of a hosted app. Writes replace the
/// whole map.
pub trait BranchEnvClient: Send + Sync {
    fn fetch_env(&self, app: &str, branch: &str) -> Result<HashMap<String, String>>;
    fn replace_env(&self, app: &str, branch: &str, env: HashMap<String, String>) -> Result<()>;
}

/// Managed app platform exposing the whole app spec.
pub trait AppPlatformClient: Send + Sync {
    fn fetch_app(&self, name: &str) -> Result<PlatformApp>;
    fn update_app(&self, app: &PlatformApp) -> Result<()>;
}

/// Cluster ConfigMaps and Secrets.
///
/// `replace` must fail with [`crate::EnvMgrError::Conflict`] when the
/// resource changed since it was read.
pub trait ClusterClient: Send + Sync {
    fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<ClusterResource>;
    fn replace(&self, namespace: &str, name: &str, resource: &ClusterResource) -> Result<()>;
}

/// Hands out the collaborator clients, creating them on first use.
pub trait Connector {
    fn object_store(&self) -> Result<Arc<dyn ObjectStore>>;
    fn branch_env(&self) -> Result<Arc<dyn BranchEnvClient>>;
    fn app_platform(&self) -> Result<Arc<dyn AppPlatformClient>>;
    fn cluster(&self) -> Result<Arc<dyn ClusterClient>>;
}
