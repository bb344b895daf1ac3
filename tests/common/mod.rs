#![allow(dead_code)]

use envmgr::backend::{
    AppPlatformClient, BranchEnvClient, ClusterClient, ClusterResource, Connector, ObjectStore, PlatformApp,
    ResourceKind,
};
use envmgr::prompt::Confirm;
use envmgr::{EnvManager, EnvMgrError, Result};
use envmgr_core::Config;
use k8s_openapi::api::core::v1::ConfigMap;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const CONFIG: &str = r#"
[object_store]
bucket = "kube-files"
namespace = "tenancy"
region = "sa-saopaulo-1"

[projects.shop]
environments = ["prod", "homolog", "dev"]
backend = "object-store"
cluster = { namespace = "{environment}", config_map = "{project}-envs", secret = "{project}-secrets" }

[projects.site]
environments = ["main"]
backend = "branch-env"
cluster = { namespace = "web", config_map = "site-envs" }
"#;

/// Every write any fake receives, in order.
pub type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<HashMap<String, String>>,
    pub failing_puts: bool,
    pub journal: Journal,
}

impl MemoryStore {
    pub fn put_text(&self, key: &str, text: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), text.to_string());
    }

    pub fn text(&self, key: &str) -> String {
        self.objects.lock().unwrap()[key].clone()
    }
}

impl ObjectStore for MemoryStore {
    fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        match self.objects.lock().unwrap().get(key) {
            Some(text) => Ok(text.clone().into_bytes()),
            None => Err(EnvMgrError::Backend {
                backend: "object store",
                message: format!("no such key {}", key),
            }),
        }
    }

    fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()> {
        if self.failing_puts {
            return Err(EnvMgrError::Backend {
                backend: "object store",
                message: "bucket is read-only".into(),
            });
        }
        self.journal.lock().unwrap().push(format!("put {}", key));
        self.put_text(key, &String::from_utf8(body).unwrap());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBranchEnv {
    pub env: Mutex<HashMap<String, String>>,
    pub journal: Journal,
}

impl BranchEnvClient for MemoryBranchEnv {
    fn fetch_env(&self, _app: &str, _branch: &str) -> Result<HashMap<String, String>> {
        Ok(self.env.lock().unwrap().clone())
    }

    fn replace_env(&self, app: &str, branch: &str, env: HashMap<String, String>) -> Result<()> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("replace {}/{}", app, branch));
        *self.env.lock().unwrap() = env;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCluster {
    pub resources: Mutex<HashMap<String, ClusterResource>>,
    pub journal: Journal,
}

impl MemoryCluster {
    pub fn add_config_map(&self, namespace: &str, name: &str, pairs: &[(&str, &str)]) {
        let data: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let resource = ClusterResource::Config(ConfigMap {
            data: Some(data),
            ..Default::default()
        });
        self.resources
            .lock()
            .unwrap()
            .insert(format!("{}/{}", namespace, name), resource);
    }

    pub fn config_map_value(&self, namespace: &str, name: &str, key: &str) -> Option<String> {
        let resources = self.resources.lock().unwrap();
        resources[&format!("{}/{}", namespace, name)]
            .to_snapshot()
            .get(key)
            .map(str::to_string)
    }
}

impl ClusterClient for MemoryCluster {
    fn get(&self, kind: ResourceKind, namespace: &str, name: &str) -> Result<ClusterResource> {
        let resources = self.resources.lock().unwrap();
        resources
            .get(&format!("{}/{}", namespace, name))
            .cloned()
            .ok_or_else(|| EnvMgrError::Backend {
                backend: "cluster",
                message: format!("{} {}/{} not found", kind, namespace, name),
            })
    }

    fn replace(&self, namespace: &str, name: &str, resource: &ClusterResource) -> Result<()> {
        let id = format!("{}/{}", namespace, name);
        self.journal.lock().unwrap().push(format!("replace {}", id));
        self.resources.lock().unwrap().insert(id, resource.clone());
        Ok(())
    }
}

pub struct NoPlatform;

impl AppPlatformClient for NoPlatform {
    fn fetch_app(&self, name: &str) -> Result<PlatformApp> {
        Err(EnvMgrError::Backend {
            backend: "app platform",
            message: format!("app \"{}\" not found", name),
        })
    }

    fn update_app(&self, _app: &PlatformApp) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct Fakes {
    pub store: Arc<MemoryStore>,
    pub branch_env: Arc<MemoryBranchEnv>,
    pub cluster: Arc<MemoryCluster>,
    pub journal: Journal,
}

impl Fakes {
    pub fn new() -> Self {
        Self::with_store(|_| {})
    }

    /// Builds the fakes, letting the caller adjust the store before it is
    /// shared.
    pub fn with_store(adjust: impl FnOnce(&mut MemoryStore)) -> Self {
        let journal = Journal::default();
        let mut store = MemoryStore {
            journal: journal.clone(),
            ..Default::default()
        };
        adjust(&mut store);
        Self {
            store: Arc::new(store),
            branch_env: Arc::new(MemoryBranchEnv {
                journal: journal.clone(),
                ..Default::default()
            }),
            cluster: Arc::new(MemoryCluster {
                journal: journal.clone(),
                ..Default::default()
            }),
            journal,
        }
    }

    pub fn writes(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

impl Connector for Fakes {
    fn object_store(&self) -> Result<Arc<dyn ObjectStore>> {
        Ok(self.store.clone())
    }

    fn branch_env(&self) -> Result<Arc<dyn BranchEnvClient>> {
        Ok(self.branch_env.clone())
    }

    fn app_platform(&self) -> Result<Arc<dyn AppPlatformClient>> {
        Ok(Arc::new(NoPlatform))
    }

    fn cluster(&self) -> Result<Arc<dyn ClusterClient>> {
        Ok(self.cluster.clone())
    }
}

/// Answers with a fixed reply and remembers every question.
#[derive(Clone, Default)]
pub struct ScriptedConfirm {
    pub answer: bool,
    pub asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConfirm {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: Arc::default(),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, message: &str) -> Result<bool> {
        self.asked.lock().unwrap().push(message.to_string());
        Ok(self.answer)
    }
}

pub fn manager(fakes: &Fakes, confirm: &ScriptedConfirm) -> EnvManager {
    let config: Config = CONFIG.parse().unwrap();
    EnvManager::new(config, Box::new(fakes.clone()), Box::new(confirm.clone()))
}

/// Keys present in an INI text, for order-insensitive checks.
pub fn ini_keys(text: &str) -> HashSet<String> {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, _)| k.to_string())
        .collect()
}

/// Test helper for creating temporary directories with input files
pub struct TestFixture {
    _temp_dir: TempDir,
    pub base_path: PathBuf,
}

impl TestFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let base_path = temp_dir.path().to_path_buf();
        Self {
            _temp_dir: temp_dir,
            base_path,
        }
    }

    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.base_path.join(name);
        fs::write(&path, content).unwrap();
        path
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
