use super::{
    AmplifyClient, AppPlatformClient, BranchEnvClient, ClusterClient, Connector, KubeClient, ObjectStore,
    PlatformApi, S3CompatibleStore,
};
use crate::{EnvMgrError, Result};
use envmgr_core::Config;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tracing::debug;

/// Builds the live clients from the configured credentials on first use, so
/// a command that only touches the object store never needs cluster access.
pub struct CloudConnector {
    config: Config,
    runtime: OnceCell<Arc<Runtime>>,
    object_store: OnceCell<Arc<dyn ObjectStore>>,
    branch_env: OnceCell<Arc<dyn BranchEnvClient>>,
    app_platform: OnceCell<Arc<dyn AppPlatformClient>>,
    cluster: OnceCell<Arc<dyn ClusterClient>>,
}

impl CloudConnector {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            runtime: OnceCell::new(),
            object_store: OnceCell::new(),
            branch_env: OnceCell::new(),
            app_platform: OnceCell::new(),
            cluster: OnceCell::new(),
        }
    }

    fn runtime(&self) -> Result<Arc<Runtime>> {
        self.runtime
            .get_or_try_init(|| {
                let runtime = Builder::new_current_thread().enable_all().build()?;
                Ok::<_, EnvMgrError>(Arc::new(runtime))
            })
            .cloned()
    }
}

fn missing(what: &str) -> EnvMgrError {
    EnvMgrError::MissingSetting(format!("{} (run 'envmgr config init')", what))
}

impl Connector for CloudConnector {
    fn object_store(&self) -> Result<Arc<dyn ObjectStore>> {
        self.object_store
            .get_or_try_init(|| {
                let settings = self
                    .config
                    .object_store
                    .as_ref()
                    .ok_or_else(|| missing("[object_store] settings"))?;
                let keys = self
                    .config
                    .credentials
                    .object_store
                    .as_ref()
                    .ok_or_else(|| missing("object store credentials"))?;
                debug!(bucket = %settings.bucket, endpoint = %settings.endpoint(), "connecting to object store");
                let store = S3CompatibleStore::new(self.runtime()?, settings, keys);
                Ok::<Arc<dyn ObjectStore>, EnvMgrError>(Arc::new(store))
            })
            .cloned()
    }

    fn branch_env(&self) -> Result<Arc<dyn BranchEnvClient>> {
        self.branch_env
            .get_or_try_init(|| {
                let credentials = self
                    .config
                    .credentials
                    .aws
                    .as_ref()
                    .ok_or_else(|| missing("AWS credentials"))?;
                debug!(region = %credentials.region, "connecting to branch env API");
                let client = AmplifyClient::new(self.runtime()?, credentials);
                Ok::<Arc<dyn BranchEnvClient>, EnvMgrError>(Arc::new(client))
            })
            .cloned()
    }

    fn app_platform(&self) -> Result<Arc<dyn AppPlatformClient>> {
        self.app_platform
            .get_or_try_init(|| {
                let credentials = self
                    .config
                    .credentials
                    .app_platform
                    .as_ref()
                    .ok_or_else(|| missing("app platform token"))?;
                let client = PlatformApi::new(credentials)?;
                Ok::<Arc<dyn AppPlatformClient>, EnvMgrError>(Arc::new(client))
            })
            .cloned()
    }

    fn cluster(&self) -> Result<Arc<dyn ClusterClient>> {
        self.cluster
            .get_or_try_init(|| {
                debug!("connecting to cluster");
                let client = KubeClient::new(self.runtime()?)?;
                Ok::<Arc<dyn ClusterClient>, EnvMgrError>(Arc::new(client))
            })
            .cloned()
    }
}
