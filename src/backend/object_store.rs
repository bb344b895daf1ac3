use super::{Backend, ObjectStore, Target};
use crate::{EnvMgrError, Result};
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use envmgr_core::{AccessKeys, BackendKind, ObjectStoreSettings, Reconciliation, Snapshot};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::debug;

const BACKEND: &str = "object store";

/// Environment file stored as INI text at
/// `{project}/env-files/.{environment}_{type}`.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>, target: &Target) -> Self {
        Self {
            store,
            key: Self::object_key(target),
        }
    }

    pub fn object_key(target: &Target) -> String {
        format!(
            "{}/env-files/.{}_{}",
            target.project, target.environment, target.kind
        )
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Backend for ObjectStoreBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ObjectStore
    }

    fn fetch(&self) -> Result<Snapshot> {
        let bytes = self.store.get_object(&self.key)?;
        let text = String::from_utf8(bytes).map_err(|e| {
            EnvMgrError::backend(BACKEND, format!("{} is not valid UTF-8: {}", self.key, e))
        })?;

        let snapshot = Snapshot::parse_ini(&text).map_err(|e| {
            EnvMgrError::backend(BACKEND, format!("failed to parse {}: {}", self.key, e))
        })?;
        debug!(key = %self.key, entries = snapshot.len(), "fetched environment file");
        Ok(snapshot)
    }

    fn persist(&self, snapshot: &Snapshot, _outcome: &Reconciliation) -> Result<()> {
        let body = snapshot.to_ini_string().into_bytes();
        self.store.put_object(&self.key, body)?;
        debug!(key = %self.key, entries = snapshot.len(), "wrote environment file");
        Ok(())
    }
}

/// Object storage reached through its S3-compatible API.
pub struct S3CompatibleStore {
    runtime: Arc<Runtime>,
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3CompatibleStore {
    pub fn new(runtime: Arc<Runtime>, settings: &ObjectStoreSettings, keys: &AccessKeys) -> Self {
        let credentials = Credentials::new(
            keys.access_key_id.clone(),
            keys.secret_access_key.clone(),
            None,
            None,
            "envmgr",
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .endpoint_url(settings.endpoint())
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            runtime,
            client: aws_sdk_s3::Client::from_conf(config),
            bucket: settings.bucket.clone(),
        }
    }
}

impl ObjectStore for S3CompatibleStore {
    fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.runtime.block_on(async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| {
                    EnvMgrError::backend(
                        BACKEND,
                        format!("failed to get {}/{}: {}", self.bucket, key, DisplayErrorContext(&e)),
                    )
                })?;

            let data = output.body.collect().await.map_err(|e| {
                EnvMgrError::backend(BACKEND, format!("failed to read {}/{}: {}", self.bucket, key, e))
            })?;
            Ok(data.into_bytes().to_vec())
        })
    }

    fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.runtime.block_on(async {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .body(ByteStream::from(body))
                .send()
                .await
                .map_err(|e| {
                    EnvMgrError::backend(
                        BACKEND,
                        format!("failed to put {}/{}: {}", self.bucket, key, DisplayErrorContext(&e)),
                    )
                })?;
            Ok(())
        })
    }
}
