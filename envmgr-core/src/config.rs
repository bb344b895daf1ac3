//! The `config.toml` file: which projects exist, which environments they
//! have, and which backend holds each environment's values.
//!
//! ```toml
//! [object_store]
//! bucket = "collection-kubernetes-files"
//! namespace = "axaxaxaxax"
//! region = "sa-saopaulo-1"
//!
//! [projects."collection-back-end-v2.1"]
//! environments = ["prod", "beta", "homolog", "dev"]
//! backend = "object-store"
//! cluster = { namespace = "{environment}", config_map = "{project}-envs", secret = "{project}-secrets" }
//!
//! [projects."app-memorial-collection-v2"]
//! environments = ["prod", "dev"]
//! backend = "branch-env"
//! branches = { dev = "development", prod = "main" }
//!
//! [projects."app-memorial-collection-v2".overrides.prod]
//! backend = "app-platform"
//! app = "collection-memorial-app"
//! components = ["collection-memorial-white-screen"]
//! ```

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Environment selector that expands to every configured environment.
pub const ALL_ENVIRONMENTS: &str = "all";

/// Root of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_store: Option<ObjectStoreSettings>,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,
}

impl Config {
    /// Validate the configuration.
    ///
    /// Ensures that:
    /// - Every project declares at least one environment, without duplicates
    /// - No environment is called `all`
    /// - Overrides only name declared environments
    /// - App platform targets list at least one component
    pub fn validate(&self) -> Result<(), ParseError> {
        for (name, project) in &self.projects {
            project
                .validate()
                .map_err(|e| ParseError::Validation(format!("Project '{}': {}", name, e)))?;
        }
        Ok(())
    }

    pub fn project(&self, name: &str) -> Option<&ProjectConfig> {
        self.projects.get(name)
    }

    pub fn project_names(&self) -> impl Iterator<Item = &str> {
        self.projects.keys().map(String::as_str)
    }
}

impl FromStr for Config {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl TryFrom<&Path> for Config {
    type Error = ParseError;

    fn try_from(path: &Path) -> Result<Self, Self::Error> {
        let content = fs::read_to_string(path)?;
        content.parse()
    }
}

/// Where the object-store backend keeps its environment files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreSettings {
    pub bucket: String,
    /// Object storage namespace (tenancy-level identifier).
    pub namespace: String,
    pub region: String,
    /// Overrides the endpoint derived from `namespace` and `region`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl ObjectStoreSettings {
    pub fn endpoint(&self) -> String {
        self.endpoint.clone().unwrap_or_else(|| {
            format!(
                "https://{}.compat.objectstorage.{}.oraclecloud.com",
                self.namespace, self.region
            )
        })
    }
}

/// Access keys for each cloud. Every section is optional so a project that
/// only uses one backend only needs that backend's credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_store: Option<AccessKeys>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_platform: Option<TokenCredentials>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKeys {
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCredentials {
    pub token: String,
}

/// One project: its environments and the backend holding each of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub environments: Vec<String>,
    /// Backend used by every environment without an override
    #[serde(flatten)]
    pub target: TargetSpec,
    /// Cluster resources that mirror the object-store files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterTarget>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<String, TargetSpec>,
}

impl ProjectConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.environments.is_empty() {
            return Err("at least one environment must be defined".into());
        }

        let mut seen = HashSet::new();
        for env in &self.environments {
            if env.is_empty() {
                return Err("environment names cannot be empty".into());
            }
            if env == ALL_ENVIRONMENTS {
                return Err(format!("'{}' is reserved and cannot be an environment", env));
            }
            if !seen.insert(env.as_str()) {
                return Err(format!("environment '{}' is listed twice", env));
            }
        }

        for env in self.overrides.keys() {
            if !seen.contains(env.as_str()) {
                return Err(format!("override for undeclared environment '{}'", env));
            }
        }

        for target in std::iter::once(&self.target).chain(self.overrides.values()) {
            if let TargetSpec::AppPlatform { components, .. } = target {
                if components.is_empty() {
                    return Err("app-platform targets must list at least one component".into());
                }
            }
        }

        Ok(())
    }

    pub fn has_environment(&self, environment: &str) -> bool {
        self.environments.iter().any(|e| e == environment)
    }

    /// Backend addressing for `environment`, honouring overrides.
    pub fn target_for(&self, environment: &str) -> &TargetSpec {
        self.overrides.get(environment).unwrap_or(&self.target)
    }
}

/// Backend selection plus the addressing that backend needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum TargetSpec {
    /// INI file at `{project}/env-files/.{environment}_{type}`
    ObjectStore,
    /// Branch-level environment variables of a hosted app
    BranchEnv {
        /// App name, defaults to the project name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app: Option<String>,
        /// Environment to branch name mapping, defaults to the environment
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        branches: BTreeMap<String, String>,
    },
    /// Environment list of one component in a managed app spec
    AppPlatform {
        /// App name on the platform, defaults to the project name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        app: Option<String>,
        /// Component names eligible as targets
        components: Vec<String>,
    },
    /// A ConfigMap or Secret used directly as the primary store
    Cluster,
}

impl TargetSpec {
    pub fn kind(&self) -> BackendKind {
        match self {
            TargetSpec::ObjectStore => BackendKind::ObjectStore,
            TargetSpec::BranchEnv { .. } => BackendKind::BranchEnv,
            TargetSpec::AppPlatform { .. } => BackendKind::AppPlatform,
            TargetSpec::Cluster => BackendKind::Cluster,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    ObjectStore,
    BranchEnv,
    AppPlatform,
    Cluster,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::ObjectStore => "object-store",
            BackendKind::BranchEnv => "branch-env",
            BackendKind::AppPlatform => "app-platform",
            BackendKind::Cluster => "cluster",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster resources for a project. Names may use `{project}` and
/// `{environment}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterTarget {
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl ClusterTarget {
    pub fn namespace_for(&self, project: &str, environment: &str) -> String {
        expand(&self.namespace, project, environment)
    }

    /// Resource name for `kind`, or `None` when this project does not
    /// mirror that kind.
    pub fn resource_for(&self, kind: ValueKind, project: &str, environment: &str) -> Option<String> {
        let template = match kind {
            ValueKind::Envs => self.config_map.as_deref(),
            ValueKind::Secrets => self.secret.as_deref(),
        }?;
        Some(expand(template, project, environment))
    }
}

fn expand(template: &str, project: &str, environment: &str) -> String {
    template
        .replace("{project}", project)
        .replace("{environment}", environment)
}

/// The two kinds of values an environment file can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Envs,
    Secrets,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Envs => "envs",
            ValueKind::Secrets => "secrets",
        }
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, ValueKind::Secrets)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "envs" => Ok(ValueKind::Envs),
            "secrets" => Ok(ValueKind::Secrets),
            _ => Err(format!("invalid type '{}'. Options are: envs, secrets", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
[object_store]
bucket = "collection-kubernetes-files"
namespace = "tenancyns"
region = "sa-saopaulo-1"

[credentials.aws]
access_key_id = "AKIA"
secret_access_key = "shh"
region = "us-east-1"

[projects."collection-back-end-v2.1"]
environments = ["prod", "beta", "homolog", "dev"]
backend = "object-store"
cluster = { namespace = "{environment}", config_map = "{project}-envs", secret = "{project}-secrets" }

[projects."app-memorial-collection-v2"]
environments = ["prod", "dev"]
backend = "branch-env"
branches = { dev = "development", prod = "main" }

[projects."app-memorial-collection-v2".overrides.prod]
backend = "app-platform"
app = "collection-memorial-app"
components = ["collection-memorial-white-screen"]
"#;

    #[test]
    fn test_parse_sample_config() {
        let config: Config = SAMPLE.parse().unwrap();

        assert_eq!(
            config.project_names().collect::<Vec<_>>(),
            vec!["app-memorial-collection-v2", "collection-back-end-v2.1"]
        );
        assert_eq!(config.object_store.as_ref().unwrap().bucket, "collection-kubernetes-files");
        assert!(config.credentials.aws.is_some());
        assert!(config.credentials.object_store.is_none());

        let backend = config.project("collection-back-end-v2.1").unwrap();
        assert_eq!(backend.target_for("dev"), &TargetSpec::ObjectStore);
        assert!(backend.has_environment("homolog"));
        assert!(!backend.has_environment("staging"));
    }

    #[test]
    fn test_overrides_replace_default_target() {
        let config: Config = SAMPLE.parse().unwrap();
        let project = config.project("app-memorial-collection-v2").unwrap();

        assert_eq!(project.target_for("dev").kind(), BackendKind::BranchEnv);
        match project.target_for("prod") {
            TargetSpec::AppPlatform { app, components } => {
                assert_eq!(app.as_deref(), Some("collection-memorial-app"));
                assert_eq!(components, &vec!["collection-memorial-white-screen".to_string()]);
            }
            other => panic!("Expected app platform target, got {:?}", other),
        }
    }

    #[test]
    fn test_cluster_target_placeholders() {
        let config: Config = SAMPLE.parse().unwrap();
        let cluster = config
            .project("collection-back-end-v2.1")
            .unwrap()
            .cluster
            .clone()
            .unwrap();

        assert_eq!(cluster.namespace_for("svc", "dev"), "dev");
        assert_eq!(
            cluster.resource_for(ValueKind::Secrets, "svc", "dev").as_deref(),
            Some("svc-secrets")
        );

        let partial = ClusterTarget {
            namespace: "ns".into(),
            config_map: Some("cm".into()),
            secret: None,
        };
        assert!(partial.resource_for(ValueKind::Secrets, "svc", "dev").is_none());
    }

    #[test]
    fn test_object_store_endpoint() {
        let mut settings = ObjectStoreSettings {
            bucket: "b".into(),
            namespace: "ns".into(),
            region: "r1".into(),
            endpoint: None,
        };
        assert_eq!(settings.endpoint(), "https://ns.compat.objectstorage.r1.oraclecloud.com");

        settings.endpoint = Some("http://localhost:9000".into());
        assert_eq!(settings.endpoint(), "http://localhost:9000");
    }

    #[test]
    fn test_validation_rejects_bad_projects() {
        let reserved = r#"
[projects.p]
environments = ["dev", "all"]
backend = "object-store"
"#;
        assert!(matches!(reserved.parse::<Config>(), Err(ParseError::Validation(_))));

        let duplicate = r#"
[projects.p]
environments = ["dev", "dev"]
backend = "object-store"
"#;
        assert!(duplicate.parse::<Config>().is_err());

        let stray_override = r#"
[projects.p]
environments = ["dev"]
backend = "object-store"

[projects.p.overrides.prod]
backend = "cluster"
"#;
        let err = stray_override.parse::<Config>().unwrap_err();
        assert!(err.to_string().contains("undeclared environment 'prod'"));

        let no_components = r#"
[projects.p]
environments = ["dev"]
backend = "app-platform"
components = []
"#;
        assert!(no_components.parse::<Config>().is_err());
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let config = r#"
[projects.p]
environments = ["dev"]
backend = "ftp"
"#;
        assert!(matches!(config.parse::<Config>(), Err(ParseError::Toml(_))));
    }

    #[test]
    fn test_load_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, SAMPLE).unwrap();

        let config = Config::try_from(path.as_path()).unwrap();
        assert_eq!(config.projects.len(), 2);

        let missing = Config::try_from(dir.path().join("nope.toml").as_path());
        assert!(matches!(missing, Err(ParseError::Io(_))));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config: Config = SAMPLE.parse().unwrap();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let reparsed: Config = rendered.parse().unwrap();

        assert_eq!(reparsed.projects.len(), config.projects.len());
        assert_eq!(
            reparsed.project("app-memorial-collection-v2").unwrap().target_for("prod"),
            config.project("app-memorial-collection-v2").unwrap().target_for("prod")
        );
    }

    #[test]
    fn test_value_kind_from_str() {
        assert_eq!("envs".parse::<ValueKind>().unwrap(), ValueKind::Envs);
        assert_eq!("secrets".parse::<ValueKind>().unwrap(), ValueKind::Secrets);
        assert!("passwords".parse::<ValueKind>().is_err());
        assert!(ValueKind::Secrets.is_secret());
    }
}
