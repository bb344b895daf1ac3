use super::{Backend, ClusterClient};
use crate::{EnvMgrError, Result};
use envmgr_core::{BackendKind, MutationKind, Reconciliation, Snapshot, ValueKind};
use k8s_openapi::ByteString;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, PostParams};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

const BACKEND: &str = "cluster";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    ConfigMap,
    Secret,
}

impl From<ValueKind> for ResourceKind {
    fn from(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Envs => ResourceKind::ConfigMap,
            ValueKind::Secrets => ResourceKind::Secret,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::ConfigMap => f.write_str("ConfigMap"),
            ResourceKind::Secret => f.write_str("Secret"),
        }
    }
}

/// A fetched ConfigMap or Secret. Values are viewed as strings; Secret bytes
/// are converted on the way in and out.
#[derive(Debug, Clone)]
pub enum ClusterResource {
    Config(ConfigMap),
    Secret(Secret),
}

impl ClusterResource {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ClusterResource::Config(_) => ResourceKind::ConfigMap,
            ClusterResource::Secret(_) => ResourceKind::Secret,
        }
    }

    pub fn to_snapshot(&self) -> Snapshot {
        match self {
            ClusterResource::Config(cm) => cm
                .data
                .iter()
                .flatten()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ClusterResource::Secret(secret) => secret
                .data
                .iter()
                .flatten()
                .map(|(k, v)| (k.clone(), String::from_utf8_lossy(&v.0).into_owned()))
                .collect(),
        }
    }

    /// Applies only the keys in `outcome`; everything else in the resource is
    /// left as fetched.
    pub fn apply(&mut self, outcome: &Reconciliation) {
        let removing = outcome.kind() == MutationKind::Delete;
        match self {
            ClusterResource::Config(cm) => {
                let data = cm.data.get_or_insert_with(BTreeMap::new);
                for (key, value) in outcome.changed() {
                    if removing {
                        data.remove(key);
                    } else {
                        data.insert(key.clone(), value.clone());
                    }
                }
            }
            ClusterResource::Secret(secret) => {
                let data = secret.data.get_or_insert_with(BTreeMap::new);
                for (key, value) in outcome.changed() {
                    if removing {
                        data.remove(key);
                    } else {
                        data.insert(key.clone(), ByteString(value.clone().into_bytes()));
                    }
                }
            }
        }
    }
}

/// How often a conflicting write is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(10),
        }
    }
}

/// One ConfigMap or Secret, used as a primary backend or as a mirror of
/// another backend's changes.
pub struct ClusterBackend {
    client: Arc<dyn ClusterClient>,
    kind: ResourceKind,
    namespace: String,
    name: String,
    retry: RetryPolicy,
}

impl ClusterBackend {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        kind: ResourceKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            kind,
            namespace: namespace.into(),
            name: name.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human readable `Kind namespace/name`.
    pub fn resource(&self) -> String {
        format!("{} {}/{}", self.kind, self.namespace, self.name)
    }

    /// Copies the changed keys of a reconciliation that already reached the
    /// primary backend.
    pub fn mirror(&self, outcome: &Reconciliation) -> Result<()> {
        if !outcome.any_change() {
            return Ok(());
        }
        self.write_changes(outcome)?;
        debug!(resource = %self.resource(), keys = outcome.changed().len(), "mirrored changes");
        Ok(())
    }

    fn fetch_resource(&self) -> Result<ClusterResource> {
        let resource = self.client.get(self.kind, &self.namespace, &self.name)?;
        if resource.kind() != self.kind {
            return Err(EnvMgrError::UnsupportedResource(format!(
                "{} is a {}, expected {}",
                self.resource(),
                resource.kind(),
                self.kind
            )));
        }
        Ok(resource)
    }

    /// Fetch, apply and replace, starting over whenever the resource moved
    /// underneath us.
    fn write_changes(&self, outcome: &Reconciliation) -> Result<()> {
        for attempt in 1..=self.retry.attempts {
            let mut resource = self.fetch_resource()?;
            resource.apply(outcome);

            match self.client.replace(&self.namespace, &self.name, &resource) {
                Ok(()) => return Ok(()),
                Err(EnvMgrError::Conflict(reason)) => {
                    warn!(resource = %self.resource(), attempt, %reason, "write conflict, retrying");
                    if attempt < self.retry.attempts {
                        std::thread::sleep(self.retry.delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(EnvMgrError::RetriesExhausted {
            resource: self.resource(),
            attempts: self.retry.attempts,
        })
    }
}

impl Backend for ClusterBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Cluster
    }

    fn fetch(&self) -> Result<Snapshot> {
        let snapshot = self.fetch_resource()?.to_snapshot();
        debug!(resource = %self.resource(), entries = snapshot.len(), "fetched cluster resource");
        Ok(snapshot)
    }

    fn persist(&self, _snapshot: &Snapshot, outcome: &Reconciliation) -> Result<()> {
        self.write_changes(outcome)?;
        debug!(resource = %self.resource(), keys = outcome.changed().len(), "wrote cluster resource");
        Ok(())
    }
}

/// Cluster access through the ambient kubeconfig or in-cluster service
/// account.
pub struct KubeClient {
    runtime: Arc<Runtime>,
    client: kube::Client,
}

impl KubeClient {
    pub fn new(runtime: Arc<Runtime>) -> Result<Self> {
        let client = runtime
            .block_on(kube::Client::try_default())
            .map_err(|e| EnvMgrError::backend(BACKEND, format!("failed to create client: {}", e)))?;
        Ok(Self { runtime, client })
    }
}

fn kube_error(context: String, err: kube::Error) -> EnvMgrError {
    match err {
        kube::Error::Api(ae) if ae.code == http::StatusCode::CONFLICT.as_u16() => {
            EnvMgrError::Conflict(format!("{}: {}", context, ae.message))
        }
        other => EnvMgrError::backend(BACKEND, format!("{}: {}", context, other)),
    }
}

impl ClusterClient for KubeClient {
    fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<ClusterResource> {
        let context = format!("failed to get {} {}/{}", kind, namespace, name);
        self.runtime.block_on(async {
            match kind {
                ResourceKind::ConfigMap => {
                    let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
                    let cm = api.get(name).await.map_err(|e| kube_error(context, e))?;
                    Ok(ClusterResource::Config(cm))
                }
                ResourceKind::Secret => {
                    let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
                    let secret = api.get(name).await.map_err(|e| kube_error(context, e))?;
                    Ok(ClusterResource::Secret(secret))
                }
            }
        })
    }

    fn replace(&self, namespace: &str, name: &str, resource: &ClusterResource) -> Result<()> {
        let context = format!("failed to replace {} {}/{}", resource.kind(), namespace, name);
        self.runtime.block_on(async {
            match resource {
                ClusterResource::Config(cm) => {
                    let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
                    api.replace(name, &PostParams::default(), cm)
                        .await
                        .map_err(|e| kube_error(context, e))?;
                }
                ClusterResource::Secret(secret) => {
                    let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
                    api.replace(name, &PostParams::default(), secret)
                        .await
                        .map_err(|e| kube_error(context, e))?;
                }
            }
            Ok(())
        })
    }
}
