use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use colored::Colorize;
use envmgr::backend::BackendRegistry;
use envmgr::{EnvManager, MutateOptions, Query, Selection, prompt, read_pairs};
use envmgr_core::{
    AccessKeys, AwsCredentials, BackendKind, Config, ObjectStoreSettings, Snapshot, TokenCredentials,
    ValueKind,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Log filter variable, e.g. `ENVMGR_LOG=envmgr=debug`.
const LOG_ENV: &str = "ENVMGR_LOG";

/// Manage environment variables and secrets of configured projects.
#[derive(Parser)]
#[command(name = "envmgr", version)]
#[command(about = "Manage envs and secrets across object storage, hosted apps and clusters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Project, environment and value kind a command works on.
#[derive(Args)]
struct TargetArgs {
    /// Project name as configured in config.toml
    #[arg(short, long, env = "ENVMGR_PROJECT")]
    project: String,
    /// Environment name, or "all" for every configured environment
    #[arg(short, long)]
    environment: String,
    /// Kind of values to work with
    #[arg(short = 't', long = "type", default_value = "envs")]
    kind: ValueKind,
}

impl TargetArgs {
    fn selection(&self) -> Selection {
        Selection::new(&self.project, &self.environment, self.kind)
    }
}

/// Pairs to create or update: one name/value or a file of them.
#[derive(Args)]
struct PairArgs {
    /// Name of the variable
    #[arg(short, long, required_unless_present = "file")]
    name: Option<String>,
    /// Value of the variable (will prompt if not provided)
    #[arg(short, long, requires = "name")]
    value: Option<String>,
    /// File of key=value lines; takes precedence over --name/--value
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Also apply the changes to the project's cluster resource
    #[arg(short = 'k', long)]
    mirror: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create variables that do not exist yet
    Create {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        pairs: PairArgs,
    },
    /// Print variables
    Get {
        #[command(flatten)]
        target: TargetArgs,
        /// Names of the variables to print
        #[arg(required_unless_present = "get_all", conflicts_with = "get_all")]
        names: Vec<String>,
        /// Print every variable
        #[arg(short = 'A', long)]
        get_all: bool,
    },
    /// Change variables that already exist
    Update {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        pairs: PairArgs,
    },
    /// Delete variables
    Delete {
        #[command(flatten)]
        target: TargetArgs,
        /// Names of the variables to delete
        #[arg(required_unless_present = "file")]
        names: Vec<String>,
        /// File whose keys are deleted; takes precedence over names
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Also remove the keys from the project's cluster resource
        #[arg(short = 'k', long)]
        mirror: bool,
        /// Do not ask for confirmation
        #[arg(long)]
        quiet: bool,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Set object storage settings and credentials interactively
    Init,
    /// Show the current configuration without secret values
    Show,
    /// Print the configuration file location
    Path,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Builds the proposed pairs before any backend is touched, so a bad file
/// aborts the whole command.
fn proposed_pairs(args: &PairArgs) -> envmgr::Result<Snapshot> {
    if let Some(path) = &args.file {
        return read_pairs(path);
    }
    let name = args
        .name
        .as_deref()
        .ok_or_else(|| envmgr::EnvMgrError::MissingSetting("--name or --file".into()))?;
    let value = match &args.value {
        Some(value) => value.clone(),
        None => prompt::read_hidden_value(name)?,
    };
    Ok(Snapshot::from_iter([(name, value)]))
}

fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Create { target, pairs } => {
            let proposed = proposed_pairs(&pairs).wrap_err("Failed to read input")?;
            let manager = EnvManager::load().wrap_err("Failed to load envmgr configuration")?;
            let options = MutateOptions {
                mirror: pairs.mirror,
                quiet: false,
            };
            manager
                .create(&target.selection(), &proposed, options)
                .wrap_err("Failed to create variables")?;
            Ok(())
        }
        Commands::Get {
            target,
            names,
            get_all,
        } => {
            let manager = EnvManager::load().wrap_err("Failed to load envmgr configuration")?;
            let query = if get_all { Query::All } else { Query::Names(names) };
            manager
                .get(&target.selection(), &query)
                .wrap_err("Failed to get variables")?;
            Ok(())
        }
        Commands::Update { target, pairs } => {
            let proposed = proposed_pairs(&pairs).wrap_err("Failed to read input")?;
            let manager = EnvManager::load().wrap_err("Failed to load envmgr configuration")?;
            let options = MutateOptions {
                mirror: pairs.mirror,
                quiet: false,
            };
            manager
                .update(&target.selection(), &proposed, options)
                .wrap_err("Failed to update variables")?;
            Ok(())
        }
        Commands::Delete {
            target,
            names,
            file,
            mirror,
            quiet,
        } => {
            let names = match file {
                Some(path) => {
                    let pairs = read_pairs(&path).wrap_err("Failed to read input")?;
                    pairs.keys().map(str::to_string).collect()
                }
                None => names,
            };
            let manager = EnvManager::load().wrap_err("Failed to load envmgr configuration")?;
            manager
                .delete(&target.selection(), &names, MutateOptions { mirror, quiet })
                .wrap_err("Failed to delete variables")?;
            Ok(())
        }
        Commands::Config { action } => match action {
            ConfigAction::Init => config_init(),
            ConfigAction::Show => config_show(),
            ConfigAction::Path => {
                println!("{}", envmgr::config_path()?.display());
                Ok(())
            }
        },
    }
}

fn config_init() -> Result<()> {
    use inquire::{MultiSelect, Password, Text};

    let mut config = envmgr::load_config_if_present()
        .wrap_err("Failed to read existing configuration")?
        .unwrap_or_default();

    // The cluster uses the ambient kubeconfig and needs nothing here.
    let choices: Vec<String> = BackendRegistry::backends()
        .into_iter()
        .filter(|info| info.kind != BackendKind::Cluster)
        .map(|info| info.display_with_examples())
        .collect();
    let selected = MultiSelect::new("Configure credentials for:", choices).prompt()?;

    for choice in selected {
        let name = choice.split(':').next().unwrap_or_default();
        match name {
            "object-store" => {
                let current = config.object_store.clone();
                let bucket = Text::new("Bucket:")
                    .with_default(current.as_ref().map(|s| s.bucket.as_str()).unwrap_or_default())
                    .prompt()?;
                let namespace = Text::new("Object storage namespace:")
                    .with_default(current.as_ref().map(|s| s.namespace.as_str()).unwrap_or_default())
                    .prompt()?;
                let region = Text::new("Region:")
                    .with_default(current.as_ref().map(|s| s.region.as_str()).unwrap_or_default())
                    .prompt()?;
                let access_key_id = Text::new("Access key id:").prompt()?;
                let secret_access_key = Password::new("Secret access key:")
                    .without_confirmation()
                    .prompt()?;

                config.object_store = Some(ObjectStoreSettings {
                    bucket,
                    namespace,
                    region,
                    endpoint: current.and_then(|s| s.endpoint),
                });
                config.credentials.object_store = Some(AccessKeys {
                    access_key_id,
                    secret_access_key,
                });
            }
            "branch-env" => {
                let access_key_id = Text::new("AWS access key id:").prompt()?;
                let secret_access_key = Password::new("AWS secret access key:")
                    .without_confirmation()
                    .prompt()?;
                let region = Text::new("AWS region:").with_default("us-east-1").prompt()?;
                config.credentials.aws = Some(AwsCredentials {
                    access_key_id,
                    secret_access_key,
                    region,
                });
            }
            "app-platform" => {
                let token = Password::new("App platform API token:")
                    .without_confirmation()
                    .prompt()?;
                config.credentials.app_platform = Some(TokenCredentials { token });
            }
            _ => {}
        }
    }

    let path = envmgr::save_config(&config).wrap_err("Failed to save configuration")?;
    println!("\n{} Configuration saved to {}", "✓".green(), path.display());
    if config.projects.is_empty() {
        println!("\nNext steps:");
        println!("  1. Add your projects to {}", path.display());
        println!("     [projects.\"my-app\"]");
        println!("     environments = [\"prod\", \"dev\"]");
        println!("     backend = \"object-store\"");
        println!("  2. envmgr get -p my-app -e dev -A");
    }
    Ok(())
}

fn config_show() -> Result<()> {
    let path = envmgr::config_path()?;
    let Some(config) = envmgr::load_config_if_present().wrap_err("Failed to read configuration")? else {
        println!("No configuration found. Run 'envmgr config init' to create one.");
        return Ok(());
    };

    println!("Configuration file: {}\n", path.display());
    match &config.object_store {
        Some(settings) => {
            println!("Object store: {} ({})", settings.bucket, settings.endpoint());
        }
        None => println!("Object store: (not configured)"),
    }

    let status = |configured: bool| {
        if configured {
            "configured".green()
        } else {
            "missing".yellow()
        }
    };
    println!("Credentials:");
    println!("  object-store: {}", status(config.credentials.object_store.is_some()));
    println!("  branch-env:   {}", status(config.credentials.aws.is_some()));
    println!("  app-platform: {}", status(config.credentials.app_platform.is_some()));

    print_projects(&config);
    Ok(())
}

fn print_projects(config: &Config) {
    if config.projects.is_empty() {
        println!("\nProjects: (none)");
        return;
    }
    println!("\nProjects:");
    for (name, project) in &config.projects {
        println!("  {} [{}]", name.bold(), project.target.kind());
        for environment in &project.environments {
            let backend = project.target_for(environment).kind();
            println!("    - {} ({})", environment, backend);
        }
        if let Some(cluster) = &project.cluster {
            println!("    mirror namespace: {}", cluster.namespace);
        }
    }
}
