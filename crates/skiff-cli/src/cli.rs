//! skiff CLI.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use skiff::{cancellable, ContainerDescriptor, SkiffClient};
use skiff_common::config::ENV_HOST;
use skiff_common::{ContainerId, EngineEndpoint, SkiffConfig, SkiffError, labels};
use tabled::{Table, Tabled};
use tokio_util::sync::CancellationToken;

/// skiff - Inspect and clean up Skiff-managed test containers
#[derive(Parser, Debug)]
#[command(name = "skiff")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Docker engine endpoint (unix://, tcp:// or http://)
    #[arg(short = 'H', long, global = true, env = ENV_HOST)]
    pub host: Option<EngineEndpoint>,

    /// Path to a skiff.toml configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// skiff commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Remove containers left behind by crashed or killed test runs
    Purge {
        /// Only list what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove containers, tolerating ones already gone or being removed
    Rm {
        /// Container IDs or names
        #[arg(required = true)]
        ids: Vec<ContainerId>,
    },

    /// List managed containers
    Ps {
        /// Only show IDs
        #[arg(short, long)]
        quiet: bool,
    },
}

/// Row for `skiff ps` and `skiff purge --dry-run`.
#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "CONTAINER ID")]
    id: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "IMAGE")]
    image: String,
    #[tabled(rename = "STATE")]
    state: String,
    #[tabled(rename = "CLEANUP")]
    cleanup: String,
    #[tabled(rename = "SESSION")]
    session: String,
}

impl From<&ContainerDescriptor> for ContainerRow {
    fn from(container: &ContainerDescriptor) -> Self {
        let label = |key: &str| container.labels.get(key).cloned().unwrap_or_default();
        Self {
            id: container.id.chars().take(12).collect(),
            name: container.names.first().cloned().unwrap_or_default(),
            image: container.image.clone(),
            state: container.state.clone(),
            cleanup: label(labels::CLEANUP),
            session: label(labels::SESSION).chars().take(8).collect(),
        }
    }
}

fn print_containers(containers: &[ContainerDescriptor]) {
    let rows: Vec<ContainerRow> = containers.iter().map(ContainerRow::from).collect();
    println!("{}", Table::new(rows));
}

impl Cli {
    /// Resolve configuration: file, environment, then command-line flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be loaded.
    pub fn resolve_config(&self) -> Result<SkiffConfig> {
        let mut config = match &self.config {
            Some(path) => SkiffConfig::load(path)?,
            None => SkiffConfig::from_env(),
        };
        if let Some(host) = &self.host {
            config = config.with_endpoint(host.clone());
        }
        Ok(config)
    }

    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is unreachable or any removal fails.
    pub async fn execute(self) -> Result<()> {
        let config = self.resolve_config()?;
        let client = skiff_docker::connect_client(config).await?;

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, cancelling");
                on_interrupt.cancel();
            }
        });

        let result = match self.command {
            Commands::Purge { dry_run } => purge(&client, dry_run, &cancel).await,
            Commands::Rm { ids } => remove(&client, &ids, &cancel).await,
            Commands::Ps { quiet } => list(&client, quiet, &cancel).await,
        };
        client.close();
        result
    }
}

async fn purge(client: &SkiffClient, dry_run: bool, cancel: &CancellationToken) -> Result<()> {
    let reconciler = client.reconciler();
    let orphans = cancellable(cancel, "find orphans", reconciler.find_orphans()).await?;

    if orphans.is_empty() {
        println!("No orphaned containers");
        return Ok(());
    }
    if dry_run {
        print_containers(&orphans);
        println!("{} container(s) would be removed", orphans.len());
        return Ok(());
    }

    let report = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(SkiffError::cancelled("purge orphans").into()),
        report = reconciler.purge_all(&orphans) => report,
    };
    for id in &report.removed {
        println!("{id}");
    }
    for (id, e) in &report.failed {
        eprintln!("Failed to remove {id}: {e}");
    }
    report.into_result()?;
    Ok(())
}

async fn remove(client: &SkiffClient, ids: &[ContainerId], cancel: &CancellationToken) -> Result<()> {
    let mut failed = 0usize;
    for id in ids {
        match client.remove(id.as_str(), cancel).await {
            Ok(()) => println!("{id}"),
            Err(e) => {
                eprintln!("Failed to remove {id}: {e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(eyre!("{failed} of {} container(s) could not be removed", ids.len()));
    }
    Ok(())
}

async fn list(client: &SkiffClient, quiet: bool, cancel: &CancellationToken) -> Result<()> {
    let filter = labels::managed_filter();
    let containers = cancellable(
        cancel,
        "list containers",
        client.engine().containers.list_by_labels(&filter),
    )
    .await?;

    if quiet {
        for container in &containers {
            println!("{}", container.id);
        }
    } else if containers.is_empty() {
        println!("No managed containers");
    } else {
        print_containers(&containers);
    }
    Ok(())
}
