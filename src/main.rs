/// Cospend main entry point
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cospend_core::config::{ClusterConfig, ConfigManager, LogConfig};
use cospend_core::ledger::{JsonLinesLedger, LedgerSource};
use cospend_core::types::{Address, AddressId};
use cospend_pipeline::{ClusterPipeline, Exporter};
use cospend_storage::{AddressIndex, ClusterAssignment, RocksConfig, RocksStore};

#[derive(Parser)]
#[command(name = "cospend")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = "cospend.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index addresses, cluster co-spent inputs and write the roots file
    Run {
        /// Export cluster rows once the roots file is written
        #[arg(long)]
        export: bool,
    },

    /// Export cluster rows from an existing index and roots file
    Export,

    /// Show the identity and cluster of an address
    Lookup {
        address: String,
    },

    /// Show the cluster root of an identity
    ClusterOf {
        identity: AddressId,
    },

    /// Check the configuration and report every problem
    ValidateConfig,

    /// Write a default configuration file
    InitConfig {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { path } = &cli.command {
        ConfigManager::generate_default_config(path)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let manager = ConfigManager::load_or_default(&cli.config)?;
    init_logging(&manager.config().logging)?;
    info!("Using configuration {}", manager.config_path().display());

    if let Err(errors) = manager.validate() {
        for e in &errors {
            error!("{}", e);
        }
        bail!("Configuration has {} error(s)", errors.len());
    }
    let config = manager.into_config();

    let result = match cli.command {
        Commands::Run { export } => run(&config, export).await,
        Commands::Export => export(&config).await,
        Commands::Lookup { address } => lookup(&config, &address),
        Commands::ClusterOf { identity } => cluster_of(&config, identity),
        Commands::ValidateConfig => {
            println!("Configuration is valid");
            Ok(())
        }
        Commands::InitConfig { .. } => Ok(()),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level '{}'", config.level))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match config.format.as_str() {
        "json" => builder.json().init(),
        "compact" => builder.compact().init(),
        _ => builder.pretty().init(),
    }
    Ok(())
}

async fn run(config: &ClusterConfig, with_export: bool) -> Result<()> {
    let pipeline = ClusterPipeline::open(config).context("Failed to open clustering pipeline")?;
    let outcome = pipeline
        .run(&config.cluster_file)
        .await
        .context("Clustering run failed")?;

    println!("{}", serde_json::to_string_pretty(&outcome.stats())?);

    if with_export {
        let exporter = Exporter::new(config.export.clone(), config.pipeline.clone())
            .with_total_blocks(Some(outcome.stats().indexing.blocks));
        let stats = exporter
            .run(outcome.ledger(), outcome.index(), outcome.assignment())
            .await
            .context("Export failed")?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Ok(())
}

/// Open the persisted index without creating or clearing it
fn open_index(config: &ClusterConfig) -> Result<AddressIndex<RocksStore>> {
    let path: &Path = &config.index.path;
    if !path.exists() {
        bail!(
            "Address index {} does not exist; run `cospend run` with index.scratch = false first",
            path.display()
        );
    }
    let rocks = RocksConfig {
        create_if_missing: false,
        ..RocksConfig::from(&config.index)
    };
    let store = RocksStore::open(&rocks)?;
    Ok(AddressIndex::open(store, config.index.key_encoding)?)
}

fn load_assignment(config: &ClusterConfig) -> Result<ClusterAssignment> {
    ClusterAssignment::load(&config.cluster_file)
        .with_context(|| format!("Failed to load roots file {}", config.cluster_file.as_ref().display()))
}

async fn export(config: &ClusterConfig) -> Result<()> {
    let index = open_index(config)?;
    let assignment = load_assignment(config)?;
    let ledger = JsonLinesLedger::new(&config.ledger.path).with_max_height(config.ledger.max_height);
    let total = ledger.block_count();

    let stats = Exporter::new(config.export.clone(), config.pipeline.clone())
        .with_total_blocks(total)
        .run(Arc::new(ledger), &index, &assignment)
        .await
        .context("Export failed")?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn lookup(config: &ClusterConfig, address: &str) -> Result<()> {
    let index = open_index(config)?;
    let id = index.lookup(&Address::from(address))?;
    match load_assignment(config)?.cluster_of(id) {
        Some(root) => println!("{}\tidentity={}\tcluster={}", address, id, root),
        None => bail!("Identity {} is outside the roots file", id),
    }
    Ok(())
}

fn cluster_of(config: &ClusterConfig, identity: AddressId) -> Result<()> {
    let assignment = load_assignment(config)?;
    let (Some(root), Some(size)) = (assignment.cluster_of(identity), assignment.cluster_size(identity)) else {
        bail!("Identity {} is outside the roots file ({} identities)", identity, assignment.len());
    };
    println!("identity={}\tcluster={}\tcluster_size={}", identity, root, size);
    Ok(())
}
