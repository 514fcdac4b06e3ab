//! # Velt Migration CLI
//!
//! Runs migration batches against the CRM and the post-migration repairs.
//! One invocation processes one batch unless `--until-done` is given, so an
//! operator can inspect the run log between batches.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};
use velt_migration::config::{ConfigManager, ReferenceIds};
use velt_migration::logging::init_structured_logging;
use velt_migration::maintenance::{
    clear_memberships, correct_membership_defaults, fix_household_relationships,
    fix_shared_addresses, remove_surplus_heads,
};
use velt_migration::orchestration::BatchRunner;
use velt_migration::staging::{MySqlStaging, SourceKind};
use velt_migration::store::CiviRestStore;
use velt_migration::{MigrationContext, RunLog};

#[derive(Parser)]
#[command(name = "velt-migrate")]
#[command(about = "Migrate legacy Velt member records into CiviCRM")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration directory (default: $VELT_CONFIG_DIR or ./config)
    #[arg(short, long, env = "VELT_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Environment section to apply (default: $VELT_ENV, then development)
    #[arg(short, long)]
    environment: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process a batch of one staging table
    Migrate {
        /// Staging table: migratie_adres, leven, gratis, archief, actief, mandaat or giften
        source: SourceKind,

        /// Rows to claim (default from configuration, at most 500)
        #[arg(short, long)]
        batch_size: Option<u32>,

        /// Keep running batches until no unprocessed rows are left
        #[arg(long)]
        until_done: bool,
    },

    /// Remove member relationships that repeat a head of household relationship
    FixRelationships,

    /// Give every household member a shared copy of the household address
    FixSharedAddresses,

    /// Delete head of household individuals that hold no membership
    RemoveSurplusHeads,

    /// Set seasons by post and the default origin on every membership
    CorrectDefaults,

    /// Delete one batch of memberships before a fresh run
    ClearMemberships {
        /// Memberships to delete (default from configuration, at most 500)
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Load the configuration and resolve the CRM reference data
    CheckConfig,
}

fn main() {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        error!(error = %format!("{e:#}"), "Migration run failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let manager = match cli.environment.as_deref() {
        Some(environment) => {
            ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), environment)
        }
        None => ConfigManager::load_from_directory(cli.config_dir.clone()),
    }
    .context("loading configuration")?;

    let config = Arc::new(manager.config().clone());
    init_structured_logging(
        manager.environment(),
        &config.logging.level,
        &config.logging.log_directory,
    );
    info!(
        environment = %manager.environment(),
        config_dir = %manager.config_directory().display(),
        "Configuration loaded"
    );

    let store = Arc::new(CiviRestStore::new(&config.crm).context("creating CRM client")?);
    let refs = Arc::new(
        ReferenceIds::resolve(store.as_ref(), &config)
            .await
            .context("resolving CRM reference data")?,
    );

    if let Commands::CheckConfig = cli.command {
        println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
        println!("Reference data resolved for environment {}", manager.environment());
        return Ok(());
    }

    let log = Arc::new(
        RunLog::create_in(&config.logging.run_log_directory).with_context(|| {
            format!(
                "opening run log in {}",
                config.logging.run_log_directory.display()
            )
        })?,
    );
    if let Some(path) = log.path() {
        info!(run_log = %path.display(), "Run log opened");
    }
    let ctx = MigrationContext::new(store, refs, config.clone(), log);

    match cli.command {
        Commands::Migrate {
            source,
            batch_size,
            until_done,
        } => {
            let staging = Arc::new(
                MySqlStaging::connect(&config.staging)
                    .await
                    .context("connecting to the staging database")?,
            );
            let runner = BatchRunner::new(ctx, staging);
            if until_done {
                for summary in runner.run_until_done(source, batch_size).await? {
                    println!("{summary}");
                }
            } else {
                println!("{}", runner.run(source, batch_size).await?);
            }
        }
        Commands::FixRelationships => {
            let removed = fix_household_relationships(&ctx).await?;
            println!("{removed} dubbele relaties verwijderd");
        }
        Commands::FixSharedAddresses => {
            let rebuilt = fix_shared_addresses(&ctx).await?;
            println!("{rebuilt} gedeelde adressen hersteld");
        }
        Commands::RemoveSurplusHeads => {
            let removed = remove_surplus_heads(&ctx).await?;
            println!("{removed} overbodige hoofden van het huishouden verwijderd");
        }
        Commands::CorrectDefaults => {
            let corrected = correct_membership_defaults(&ctx).await?;
            println!("{corrected} lidmaatschappen bijgewerkt");
        }
        Commands::ClearMemberships { limit } => {
            let cleared = clear_memberships(&ctx, limit).await?;
            println!("{cleared} lidmaatschappen verwijderd");
        }
        Commands::CheckConfig => {}
    }

    Ok(())
}
