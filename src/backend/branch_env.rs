use super::{Backend, BranchEnvClient};
use crate::{EnvMgrError, Result};
use aws_sdk_amplify::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_amplify::error::DisplayErrorContext;
use envmgr_core::{AwsCredentials, BackendKind, Reconciliation, Snapshot};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing::debug;

const BACKEND: &str = "branch env";

/// Environment variables attached to one branch of a hosted app.
///
/// The write API replaces the whole map, so `persist` always sends the full
/// snapshot, which was seeded from the fetched map.
pub struct BranchEnvBackend {
    client: Arc<dyn BranchEnvClient>,
    app: String,
    branch: String,
}

impl BranchEnvBackend {
    pub fn new(client: Arc<dyn BranchEnvClient>, app: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            client,
            app: app.into(),
            branch: branch.into(),
        }
    }
}

impl Backend for BranchEnvBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::BranchEnv
    }

    fn fetch(&self) -> Result<Snapshot> {
        let env = self.client.fetch_env(&self.app, &self.branch)?;
        debug!(app = %self.app, branch = %self.branch, entries = env.len(), "fetched branch env");
        Ok(Snapshot::from_unordered(env))
    }

    fn persist(&self, snapshot: &Snapshot, _outcome: &Reconciliation) -> Result<()> {
        let env: HashMap<String, String> = snapshot
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.client.replace_env(&self.app, &self.branch, env)?;
        debug!(app = %self.app, branch = %self.branch, entries = snapshot.len(), "replaced branch env");
        Ok(())
    }
}

/// AWS Amplify branch environment variables.
pub struct AmplifyClient {
    runtime: Arc<Runtime>,
    client: aws_sdk_amplify::Client,
}

impl AmplifyClient {
    pub fn new(runtime: Arc<Runtime>, credentials: &AwsCredentials) -> Self {
        let provider = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            None,
            None,
            "envmgr",
        );
        let config = aws_sdk_amplify::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(credentials.region.clone()))
            .credentials_provider(provider)
            .build();

        Self {
            runtime,
            client: aws_sdk_amplify::Client::from_conf(config),
        }
    }

    async fn app_id(&self, name: &str) -> Result<String> {
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_apps()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| {
                    EnvMgrError::backend(BACKEND, format!("failed to list apps: {}", DisplayErrorContext(&e)))
                })?;

            if let Some(app) = page.apps().iter().find(|app| app.name() == name) {
                return Ok(app.app_id().to_string());
            }

            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => {
                    return Err(EnvMgrError::backend(
                        BACKEND,
                        format!("app \"{}\" not found", name),
                    ));
                }
            }
        }
    }
}

impl BranchEnvClient for AmplifyClient {
    fn fetch_env(&self, app: &str, branch: &str) -> Result<HashMap<String, String>> {
        self.runtime.block_on(async {
            let app_id = self.app_id(app).await?;
            let output = self
                .client
                .get_branch()
                .app_id(&app_id)
                .branch_name(branch)
                .send()
                .await
                .map_err(|e| {
                    EnvMgrError::backend(
                        BACKEND,
                        format!(
                            "failed to get branch \"{}\" of app \"{}\": {}",
                            branch,
                            app,
                            DisplayErrorContext(&e)
                        ),
                    )
                })?;

            let branch_info = output.branch().ok_or_else(|| {
                EnvMgrError::backend(BACKEND, format!("branch \"{}\" of app \"{}\" not found", branch, app))
            })?;
            Ok(branch_info.environment_variables().clone())
        })
    }

    fn replace_env(&self, app: &str, branch: &str, env: HashMap<String, String>) -> Result<()> {
        self.runtime.block_on(async {
            let app_id = self.app_id(app).await?;
            self.client
                .update_branch()
                .app_id(&app_id)
                .branch_name(branch)
                .set_environment_variables(Some(env))
                .send()
                .await
                .map_err(|e| {
                    EnvMgrError::backend(
                        BACKEND,
                        format!(
                            "failed to update branch \"{}\" of app \"{}\": {}",
                            branch,
                            app,
                            DisplayErrorContext(&e)
                        ),
                    )
                })?;
            Ok(())
        })
    }
}
