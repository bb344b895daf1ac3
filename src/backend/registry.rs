use super::{
    AppPlatformBackend, Backend, BranchEnvBackend, ClusterBackend, Connector, ObjectStoreBackend, Target,
};
use crate::{EnvMgrError, Result};
use envmgr_core::{BackendKind, Config, ProjectConfig, TargetSpec};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BackendInfo {
    pub kind: BackendKind,
    pub description: &'static str,
    pub examples: Vec<&'static str>,
}

impl BackendInfo {
    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn display_with_examples(&self) -> String {
        if self.examples.is_empty() {
            format!("{}: {}", self.name(), self.description)
        } else {
            format!(
                "{}: {} (e.g., {})",
                self.name(),
                self.description,
                self.examples.join(", ")
            )
        }
    }
}

pub struct BackendRegistry;

impl BackendRegistry {
    pub fn backends() -> Vec<BackendInfo> {
        vec![
            BackendInfo {
                kind: BackendKind::ObjectStore,
                description: "INI files in an object storage bucket",
                examples: vec!["<project>/env-files/.<environment>_envs"],
            },
            BackendInfo {
                kind: BackendKind::BranchEnv,
                description: "Branch environment variables of a hosted app",
                examples: vec!["backend = \"branch-env\", branches = { prod = \"main\" }"],
            },
            BackendInfo {
                kind: BackendKind::AppPlatform,
                description: "Component envs inside a managed app spec",
                examples: vec!["backend = \"app-platform\", components = [\"api\"]"],
            },
            BackendInfo {
                kind: BackendKind::Cluster,
                description: "A ConfigMap (envs) or Secret (secrets), also used as a mirror",
                examples: vec!["cluster = { namespace = \"{environment}\", config_map = \"{project}-envs\" }"],
            },
        ]
    }

    pub fn get_info(kind: BackendKind) -> Option<BackendInfo> {
        Self::backends().into_iter().find(|b| b.kind == kind)
    }

    /// Builds the backend holding `target`, following the project's
    /// per-environment overrides.
    pub fn resolve(config: &Config, connector: &dyn Connector, target: &Target) -> Result<Box<dyn Backend>> {
        let project = project_for(config, target)?;
        let spec = project.target_for(&target.environment);
        debug!(target = %target, backend = %spec.kind(), "resolving backend");

        let backend: Box<dyn Backend> = match spec {
            TargetSpec::ObjectStore => Box::new(ObjectStoreBackend::new(connector.object_store()?, target)),
            TargetSpec::BranchEnv { app, branches } => {
                let app = app.as_deref().unwrap_or(&target.project);
                let branch = branches
                    .get(&target.environment)
                    .map(String::as_str)
                    .unwrap_or(&target.environment);
                Box::new(BranchEnvBackend::new(connector.branch_env()?, app, branch))
            }
            TargetSpec::AppPlatform { app, components } => {
                let app = app.as_deref().unwrap_or(&target.project);
                Box::new(AppPlatformBackend::new(
                    connector.app_platform()?,
                    app,
                    components.clone(),
                    target.kind,
                ))
            }
            TargetSpec::Cluster => Box::new(Self::cluster(project, connector, target)?),
        };
        Ok(backend)
    }

    /// The cluster resource mirroring `target`.
    pub fn mirror(config: &Config, connector: &dyn Connector, target: &Target) -> Result<ClusterBackend> {
        let project = project_for(config, target)?;
        Self::cluster(project, connector, target)
    }

    fn cluster(project: &ProjectConfig, connector: &dyn Connector, target: &Target) -> Result<ClusterBackend> {
        let cluster = project.cluster.as_ref().ok_or_else(|| {
            EnvMgrError::MissingSetting(format!(
                "cluster settings for project '{}' ([projects.\"{}\".cluster])",
                target.project, target.project
            ))
        })?;
        let name = cluster
            .resource_for(target.kind, &target.project, &target.environment)
            .ok_or_else(|| {
                EnvMgrError::UnsupportedResource(format!(
                    "project '{}' has no cluster resource configured for {}",
                    target.project, target.kind
                ))
            })?;
        let namespace = cluster.namespace_for(&target.project, &target.environment);

        Ok(ClusterBackend::new(
            connector.cluster()?,
            target.kind.into(),
            namespace,
            name,
        ))
    }
}

fn project_for<'a>(config: &'a Config, target: &Target) -> Result<&'a ProjectConfig> {
    config
        .project(&target.project)
        .ok_or_else(|| EnvMgrError::ProjectNotFound {
            project: target.project.clone(),
            available: config.project_names().collect::<Vec<_>>().join(", "),
        })
}
