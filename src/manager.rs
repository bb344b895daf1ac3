//! Per-environment pipeline behind every command

use crate::backend::{Backend, BackendRegistry, ClusterBackend, CloudConnector, Connector, Target};
use crate::prompt::{Confirm, InquireConfirm};
use crate::{EnvMgrError, Result};
use colored::Colorize;
use envmgr_core::{
    ALL_ENVIRONMENTS, BackendKind, Config, Mutation, MutationKind, Reconciliation, SkipReason, Snapshot,
    ValueKind, reconcile,
};
use std::fs;
use std::path::Path;
use tracing::{debug, info, info_span};

/// Which project, environment (or `all`) and value kind a command addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub project: String,
    pub environment: String,
    pub kind: ValueKind,
}

impl Selection {
    pub fn new(project: impl Into<String>, environment: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            project: project.into(),
            environment: environment.into(),
            kind,
        }
    }

    fn is_all(&self) -> bool {
        self.environment == ALL_ENVIRONMENTS
    }
}

/// What `get` should print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    All,
    Names(Vec<String>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutateOptions {
    /// Copy the changed keys to the project's cluster resource
    pub mirror: bool,
    /// Skip the delete confirmation
    pub quiet: bool,
}

/// How one environment's pipeline ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied { changed: usize, mirrored: bool },
    Unchanged,
    Declined,
}

/// Runs create/get/update/delete against the backends of configured
/// projects.
///
/// # Example
///
/// ```no_run
/// use envmgr::{EnvManager, MutateOptions, Selection};
/// use envmgr_core::{Snapshot, ValueKind};
///
/// let manager = EnvManager::load().unwrap();
/// let selection = Selection::new("shop", "dev", ValueKind::Envs);
/// let pairs = Snapshot::from_iter([("LOG_LEVEL", "debug")]);
/// manager.update(&selection, &pairs, MutateOptions::default()).unwrap();
/// ```
pub struct EnvManager {
    config: Config,
    connector: Box<dyn Connector>,
    confirm: Box<dyn Confirm>,
}

impl EnvManager {
    pub fn new(config: Config, connector: Box<dyn Connector>, confirm: Box<dyn Confirm>) -> Self {
        Self {
            config,
            connector,
            confirm,
        }
    }

    /// Loads the configuration file and wires the live clients.
    pub fn load() -> Result<Self> {
        let config = crate::load_config()?;
        let connector = CloudConnector::new(&config);
        Ok(Self::new(config, Box::new(connector), Box::new(InquireConfirm)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Expands `environment` (or `all`) into the project's environments.
    pub fn environments(&self, project: &str, environment: &str) -> Result<Vec<String>> {
        let project_config = self
            .config
            .project(project)
            .ok_or_else(|| EnvMgrError::ProjectNotFound {
                project: project.to_string(),
                available: self.config.project_names().collect::<Vec<_>>().join(", "),
            })?;

        if environment == ALL_ENVIRONMENTS {
            return Ok(project_config.environments.clone());
        }
        if !project_config.has_environment(environment) {
            return Err(EnvMgrError::EnvironmentNotFound {
                project: project.to_string(),
                environment: environment.to_string(),
                available: project_config.environments.join(", "),
            });
        }
        Ok(vec![environment.to_string()])
    }

    /// Prints the requested values of every selected environment and returns
    /// what was shown. Secret values are masked.
    pub fn get(&self, selection: &Selection, query: &Query) -> Result<Vec<(String, Snapshot)>> {
        self.fan_out(selection, |target| {
            let backend = BackendRegistry::resolve(&self.config, self.connector.as_ref(), target)?;
            let current = backend.fetch()?;

            let shown: Snapshot = match query {
                Query::All => current,
                Query::Names(names) => {
                    let mut shown = Snapshot::new();
                    for name in names {
                        match current.get(name) {
                            Some(value) => {
                                shown.insert(name.as_str(), value);
                            }
                            None => eprintln!("{} {} not found in {}", "!".yellow(), name, target),
                        }
                    }
                    shown
                }
            };

            if selection.is_all() {
                println!("{}", format!("# {}", target.environment).bold());
            }
            for (key, value) in &shown {
                println!("{}", display_line(key, value, target.kind));
            }
            Ok(shown)
        })
    }

    /// Adds pairs whose keys are not present yet.
    pub fn create(
        &self,
        selection: &Selection,
        pairs: &Snapshot,
        options: MutateOptions,
    ) -> Result<Vec<(String, Outcome)>> {
        pairs.validate()?;
        let mutation = Mutation::Create(pairs.clone());
        self.fan_out(selection, |target| self.run_pipeline(target, &mutation, options))
    }

    /// Overwrites pairs whose keys already exist.
    pub fn update(
        &self,
        selection: &Selection,
        pairs: &Snapshot,
        options: MutateOptions,
    ) -> Result<Vec<(String, Outcome)>> {
        pairs.validate()?;
        let mutation = Mutation::Update(pairs.clone());
        self.fan_out(selection, |target| self.run_pipeline(target, &mutation, options))
    }

    /// Removes keys by name, asking first unless `options.quiet` is set.
    pub fn delete(
        &self,
        selection: &Selection,
        names: &[String],
        options: MutateOptions,
    ) -> Result<Vec<(String, Outcome)>> {
        let mutation = Mutation::Delete(names.to_vec());
        self.fan_out(selection, |target| self.run_pipeline(target, &mutation, options))
    }

    /// Runs `f` once per selected environment, in configuration order.
    ///
    /// A single environment returns its error as is. With `all`, a failing
    /// environment is reported and the rest still run; the call fails at the
    /// end if any of them did.
    fn fan_out<T, F>(&self, selection: &Selection, mut f: F) -> Result<Vec<(String, T)>>
    where
        F: FnMut(&Target) -> Result<T>,
    {
        let environments = self.environments(&selection.project, &selection.environment)?;

        if !selection.is_all() {
            let target = Target::new(&selection.project, &selection.environment, selection.kind);
            let value = f(&target)?;
            return Ok(vec![(target.environment, value)]);
        }

        let total = environments.len();
        let mut results = Vec::with_capacity(total);
        let mut failed = 0;
        for environment in environments {
            let target = Target::new(&selection.project, environment, selection.kind);
            match f(&target) {
                Ok(value) => results.push((target.environment, value)),
                Err(e) => {
                    failed += 1;
                    debug!(selection = %target, error = %e, "environment failed");
                    eprintln!("{} {}: {}", "✗".red(), target, e);
                }
            }
        }

        if failed > 0 {
            return Err(EnvMgrError::EnvironmentsFailed { failed, total });
        }
        Ok(results)
    }

    /// resolve, fetch, reconcile, report skips, confirm deletes, persist,
    /// mirror.
    fn run_pipeline(&self, target: &Target, mutation: &Mutation, options: MutateOptions) -> Result<Outcome> {
        let span = info_span!(
            "pipeline",
            project = %target.project,
            environment = %target.environment,
            kind = %target.kind
        );
        let _enter = span.enter();

        let backend = BackendRegistry::resolve(&self.config, self.connector.as_ref(), target)?;
        let mirror = self.mirror_for(backend.as_ref(), target, options)?;

        let mut snapshot = backend.fetch()?;
        let outcome = reconcile(&mut snapshot, mutation);
        report_skips(target, &outcome);

        if !outcome.any_change() {
            debug!("nothing changed");
            println!("{} No changes for {}", "○".yellow(), target);
            return Ok(Outcome::Unchanged);
        }

        let keys = outcome.changed_keys().collect::<Vec<_>>().join(", ");
        if outcome.kind() == MutationKind::Delete && !options.quiet {
            let question = format!("Delete {} from {}?", keys, target);
            if !self.confirm.confirm(&question)? {
                println!("{} Skipped {}", "○".yellow(), target);
                return Ok(Outcome::Declined);
            }
        }

        backend.persist(&snapshot, &outcome)?;
        info!(backend = %backend.kind(), changed = outcome.changed().len(), "persisted");
        println!(
            "{} {} {} in {}",
            "✓".green(),
            capitalize(outcome.kind().past_tense()),
            keys,
            target
        );

        let mirrored = match mirror {
            Some(cluster) => {
                cluster.mirror(&outcome)?;
                println!("{} Mirrored to {}", "✓".green(), cluster.resource());
                true
            }
            None => false,
        };

        Ok(Outcome::Applied {
            changed: outcome.changed().len(),
            mirrored,
        })
    }

    /// The cluster resource to mirror into, resolved before anything is
    /// written so a missing setting fails the environment up front.
    fn mirror_for(
        &self,
        backend: &dyn Backend,
        target: &Target,
        options: MutateOptions,
    ) -> Result<Option<ClusterBackend>> {
        if !options.mirror {
            return Ok(None);
        }
        if backend.kind() != BackendKind::ObjectStore {
            eprintln!(
                "{} Mirroring only applies to {} projects, {} uses {}",
                "!".yellow(),
                BackendKind::ObjectStore,
                target,
                backend.kind()
            );
            return Ok(None);
        }
        BackendRegistry::mirror(&self.config, self.connector.as_ref(), target).map(Some)
    }
}

fn report_skips(target: &Target, outcome: &Reconciliation) {
    for skipped in outcome.skipped() {
        debug!(key = %skipped.key, reason = %skipped.reason, "key skipped");
        let hint = match skipped.reason {
            SkipReason::AlreadyExists => "use 'update' to change it",
            SkipReason::NotFound => "nothing to do",
        };
        eprintln!(
            "{} {} {} in {}, skipping ({})",
            "!".yellow(),
            skipped.key,
            skipped.reason,
            target,
            hint
        );
    }
}

/// One `key=value` line of `get` output; secret values never reach stdout.
fn display_line(key: &str, value: &str, kind: ValueKind) -> String {
    if kind.is_secret() {
        format!("{}=***", key)
    } else {
        format!("{}={}", key, value)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Reads an operator-supplied file of `key=value` pairs.
pub fn read_pairs(path: &Path) -> Result<Snapshot> {
    let invalid = |message: String| EnvMgrError::InvalidInput {
        path: path.to_path_buf(),
        message,
    };
    let text = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    Snapshot::parse_ini(&text).map_err(|e| invalid(e.to_string()))
}
