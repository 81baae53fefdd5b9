use anyhow::{Context, Result};
use clap::Parser;
use regmigrate::{
    cli::{Cli, Commands, StateArgs},
    config::Config,
    planner::summarize,
    registry::{Retrying, SkopeoClient},
    service::MigrationService,
    state::{MigrationStatus, StateStore},
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Migrate { args, dry_run } => {
            let (config, state_path) = load_config(&args)?;
            let client = registry_client(&config)?;
            let mut store = StateStore::open(&state_path)?;
            info!("Using state file {}", state_path.display());

            let report = MigrationService::new(&config, &client)
                .run(&mut store, dry_run)
                .await?;

            for discovered in &report.discovery {
                info!(
                    "{}: {} tag(s) listed, {} selected, {} resolved, {} cached, {} unrecognized, {} failed",
                    discovered.repo,
                    discovered.listed,
                    discovered.selected,
                    discovered.resolved,
                    discovered.cached,
                    discovered.unrecognized,
                    discovered.failed
                );
            }
            if report.discovery_failures > 0 {
                warn!(
                    "{} repository(ies) could not be listed",
                    report.discovery_failures
                );
            }

            let execution = report.execution;
            if dry_run {
                info!("Dry run complete: {} image(s) would be copied", execution.would_copy);
            } else {
                info!(
                    "Migration finished: {} copied, {} already present, {} failed",
                    execution.copied, execution.already_present, execution.failed
                );
            }
            if execution.failed > 0 {
                warn!("Failed items are marked `error` and will be retried on the next run");
            }
        }
        Commands::Plan { args } => {
            let (config, state_path) = load_config(&args)?;
            let client = registry_client(&config)?;
            let mut store = StateStore::open(&state_path)?;

            let items = MigrationService::new(&config, &client)
                .plan(&mut store)
                .await?;

            info!("{} item(s) remaining", items.len());
            for item in items {
                println!("{}", item);
            }
        }
        Commands::Status { args } => {
            let state_path = match &args.state {
                Some(path) => path.clone(),
                None => load_config(&args)?.1,
            };
            let store = StateStore::open(&state_path)?;
            let state = store.state();

            println!("{}", summarize(state));
            for (repo, tag, record) in state.iter() {
                if record.status == Some(MigrationStatus::Error) {
                    println!("error: {}:{}", repo, tag);
                }
            }
        }
        Commands::Version => {
            println!("regmigrate {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// Load the config and resolve the state file: `--state` wins over the config
fn load_config(args: &StateArgs) -> Result<(Config, PathBuf)> {
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_path()
            .context("Could not determine config directory; pass --config")?,
    };
    let config = Config::load(&config_path)?;
    let state_path = args
        .state
        .clone()
        .unwrap_or_else(|| config.state_path(&config_path));
    Ok((config, state_path))
}

fn registry_client(config: &Config) -> Result<Retrying<SkopeoClient>> {
    let skopeo = SkopeoClient::new()
        .context("skopeo is required for registry access")?
        .with_tls_verify(&config.source_host, config.source_tls_verify)
        .with_tls_verify(&config.target_host, config.target_tls_verify);
    Ok(Retrying::new(skopeo, config.retry.policy()))
}
