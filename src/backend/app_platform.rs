use super::{AppPlatformClient, Backend};
use crate::{EnvMgrError, Result};
use envmgr_core::{BackendKind, Reconciliation, Snapshot, TokenCredentials, ValueKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const BACKEND: &str = "app platform";

/// Sections of an app spec that hold components with an `envs` list.
const COMPONENT_SECTIONS: [&str; 4] = ["services", "static_sites", "workers", "jobs"];

/// An app as returned by the platform. Only `id` and the spec's component
/// envs are interpreted; everything else in `spec` is sent back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformApp {
    pub id: String,
    pub spec: Value,
}

impl PlatformApp {
    pub fn name(&self) -> Option<&str> {
        self.spec.get("name").and_then(Value::as_str)
    }
}

/// One entry of a component's `envs` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct AppEnv {
    key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<String>,
    /// `scope`, `type` and anything else the platform attaches
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl AppEnv {
    fn new(key: &str, value: &str, kind: ValueKind) -> Self {
        let mut extra = Map::new();
        extra.insert("scope".into(), Value::String("RUN_AND_BUILD_TIME".into()));
        let env_type = if kind.is_secret() { "SECRET" } else { "GENERAL" };
        extra.insert("type".into(), Value::String(env_type.into()));
        Self {
            key: key.to_string(),
            value: Some(value.to_string()),
            extra,
        }
    }
}

/// The `envs` list of the first allow-listed component in an app spec.
pub struct AppPlatformBackend {
    client: Arc<dyn AppPlatformClient>,
    app: String,
    components: Vec<String>,
    kind: ValueKind,
    fetched: RefCell<Option<PlatformApp>>,
}

impl AppPlatformBackend {
    pub fn new(
        client: Arc<dyn AppPlatformClient>,
        app: impl Into<String>,
        components: Vec<String>,
        kind: ValueKind,
    ) -> Self {
        Self {
            client,
            app: app.into(),
            components,
            kind,
            fetched: RefCell::new(None),
        }
    }

    fn component_envs(&self, app: &PlatformApp) -> Result<Vec<AppEnv>> {
        let (section, index) = locate_component(&app.spec, &self.components).ok_or_else(|| {
            EnvMgrError::backend(
                BACKEND,
                format!(
                    "app \"{}\" has no component named any of: {}",
                    self.app,
                    self.components.join(", ")
                ),
            )
        })?;

        match app.spec[section][index].get("envs") {
            Some(envs) => Ok(serde_json::from_value(envs.clone())?),
            None => Ok(Vec::new()),
        }
    }
}

impl Backend for AppPlatformBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::AppPlatform
    }

    fn fetch(&self) -> Result<Snapshot> {
        let app = self.client.fetch_app(&self.app)?;
        let envs = self.component_envs(&app)?;

        let snapshot: Snapshot = envs
            .into_iter()
            .map(|env| (env.key, env.value.unwrap_or_default()))
            .collect();
        debug!(app = %self.app, entries = snapshot.len(), "fetched component envs");

        *self.fetched.borrow_mut() = Some(app);
        Ok(snapshot)
    }

    fn persist(&self, snapshot: &Snapshot, _outcome: &Reconciliation) -> Result<()> {
        let cached = self.fetched.borrow_mut().take();
        let mut app = match cached {
            Some(app) => app,
            None => self.client.fetch_app(&self.app)?,
        };

        let existing = self.component_envs(&app)?;
        let envs = rebuild_envs(existing, snapshot, self.kind);
        // component_envs succeeded, so the component is there
        if let Some((section, index)) = locate_component(&app.spec, &self.components) {
            app.spec[section][index]["envs"] = serde_json::to_value(envs)?;
        }

        self.client.update_app(&app)?;
        debug!(app = %self.app, entries = snapshot.len(), "updated app spec");
        Ok(())
    }
}

/// Finds the first component whose name is allow-listed, returning its
/// section and index inside that section.
pub(crate) fn locate_component(spec: &Value, allowed: &[String]) -> Option<(&'static str, usize)> {
    for section in COMPONENT_SECTIONS {
        let Some(items) = spec.get(section).and_then(Value::as_array) else {
            continue;
        };
        for (index, item) in items.iter().enumerate() {
            let name = item.get("name").and_then(Value::as_str);
            if name.is_some_and(|n| allowed.iter().any(|a| a == n)) {
                return Some((section, index));
            }
        }
    }
    None
}

/// Builds the new `envs` list in snapshot order, keeping the metadata of
/// entries that survive.
pub(crate) fn rebuild_envs(existing: Vec<AppEnv>, snapshot: &Snapshot, kind: ValueKind) -> Vec<AppEnv> {
    let mut by_key: HashMap<String, AppEnv> = existing
        .into_iter()
        .map(|env| (env.key.clone(), env))
        .collect();

    snapshot
        .iter()
        .map(|(key, value)| match by_key.remove(key) {
            Some(mut env) => {
                env.value = Some(value.clone());
                env
            }
            None => AppEnv::new(key, value, kind),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct AppList {
    #[serde(default)]
    apps: Vec<PlatformApp>,
}

/// Platform REST API authenticated with a bearer token.
pub struct PlatformApi {
    agent: ureq::Agent,
    base_url: Url,
    token: String,
}

impl PlatformApi {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.digitalocean.com/";
    const PAGE_SIZE: usize = 100;

    pub fn new(credentials: &TokenCredentials) -> Result<Self> {
        Self::with_base_url(credentials, Self::DEFAULT_BASE_URL)
    }

    pub fn with_base_url(credentials: &TokenCredentials, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| EnvMgrError::InvalidConfig(format!("invalid API URL '{}': {}", base_url, e)))?;
        let agent = ureq::AgentBuilder::new()
            .timeout_read(Duration::from_secs(30))
            .timeout_write(Duration::from_secs(30))
            .build();

        Ok(Self {
            agent,
            base_url,
            token: credentials.token.clone(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| EnvMgrError::backend(BACKEND, format!("invalid URL for {}: {}", path, e)))
    }

    fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

fn http_error(context: &str, err: ureq::Error) -> EnvMgrError {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            EnvMgrError::backend(BACKEND, format!("{}: HTTP {} {}", context, code, body.trim()))
        }
        ureq::Error::Transport(transport) => {
            EnvMgrError::backend(BACKEND, format!("{}: {}", context, transport))
        }
    }
}

impl AppPlatformClient for PlatformApi {
    fn fetch_app(&self, name: &str) -> Result<PlatformApp> {
        let mut page = 1;
        loop {
            let mut url = self.url("v2/apps")?;
            url.query_pairs_mut()
                .append_pair("page", &page.to_string())
                .append_pair("per_page", &Self::PAGE_SIZE.to_string());

            let list: AppList = self
                .agent
                .get(url.as_str())
                .set("Authorization", &self.authorization())
                .call()
                .map_err(|e| http_error("failed to list apps", e))?
                .into_json()?;

            let count = list.apps.len();
            if let Some(app) = list.apps.into_iter().find(|app| app.name() == Some(name)) {
                return Ok(app);
            }
            if count < Self::PAGE_SIZE {
                return Err(EnvMgrError::backend(
                    BACKEND,
                    format!("app \"{}\" not found", name),
                ));
            }
            page += 1;
        }
    }

    fn update_app(&self, app: &PlatformApp) -> Result<()> {
        let url = self.url(&format!("v2/apps/{}", app.id))?;
        self.agent
            .put(url.as_str())
            .set("Authorization", &self.authorization())
            .send_json(serde_json::json!({ "spec": &app.spec }))
            .map_err(|e| http_error("failed to update app", e))?;
        Ok(())
    }
}
