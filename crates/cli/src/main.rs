use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use alloy::primitives::hex;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokamak_state_manager::{
    snapshot::format_root,
    storage::{btree::BTreeStorage, sled::SledStorage, StorageWriter, TransactionalStorage},
    validate_snapshot_json, ChannelStateConfig, InitSource, L2StateManager, RpcSource,
    StateSnapshot,
};
use tokamak_transaction::Serializable;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod tx;

#[derive(Debug, Parser)]
#[command(name = "tokamak", about = "Tokamak L2 channel tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Builds and signs a transfer transaction, printing its RLP encoding.
    CreateTx {
        /// Transaction config (JSON).
        config: PathBuf,
    },

    /// Initialises a state manager from an Ethereum node or a snapshot and prints its roots.
    CreateStateManager {
        /// Channel state config (JSON).
        config: PathBuf,

        #[arg(long, env = "RPC_URL", conflicts_with = "snapshot")]
        rpc_url: Option<String>,

        /// Snapshot to restore instead of reading the state from a node.
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Persists the state in a sled database at this path.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Writes a snapshot of the initialised state to this path.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Channel id recorded in the written snapshot.
        #[arg(long, default_value = "0x")]
        channel_id: String,
    },

    /// Checks the structure of a snapshot file.
    ValidateSnapshot {
        snapshot: PathBuf,
    },
}

#[derive(Debug)]
struct StateManagerArgs {
    config: ChannelStateConfig,
    rpc_url: Option<String>,
    snapshot: Option<StateSnapshot>,
    out: Option<PathBuf>,
    channel_id: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Configure logging.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tokamak=debug"));
    tracing_subscriber::fmt()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::CreateTx { config } => create_tx(&config)?,
        Command::CreateStateManager {
            config,
            rpc_url,
            snapshot,
            db,
            out,
            channel_id,
        } => {
            let args = StateManagerArgs {
                config: ChannelStateConfig::from_json(&read(&config)?)?,
                rpc_url,
                snapshot: snapshot
                    .map(|path| -> Result<StateSnapshot> {
                        Ok(StateSnapshot::from_json(&read(path)?)?)
                    })
                    .transpose()?,
                out,
                channel_id,
            };

            match db {
                Some(path) => {
                    let storage = SledStorage::open(&path).with_context(|| {
                        format!("failed to open the database at {}", path.display())
                    })?;
                    create_state_manager(storage, args).await?
                }
                None => create_state_manager(BTreeStorage::new(), args).await?,
            }
        }
        Command::ValidateSnapshot { snapshot } => return validate_snapshot(&snapshot),
    }

    Ok(ExitCode::SUCCESS)
}

fn create_tx(config: &Path) -> Result<()> {
    let config: tx::TxConfig = serde_json::from_str(&read(config)?)?;
    let tx = config.signed_transaction()?;
    println!("Signed tx RLP: 0x{}", hex::encode(tx.serialize()));
    Ok(())
}

async fn create_state_manager<S>(storage: S, args: StateManagerArgs) -> Result<()>
where
    S: StorageWriter + TransactionalStorage,
{
    let opts = args.config.to_state_manager_opts()?;
    let mut manager = L2StateManager::new(storage, args.config.common())?;

    match &args.snapshot {
        Some(snapshot) => {
            manager
                .init_from_source(InitSource::Snapshot(snapshot), opts)
                .await?
        }
        None => {
            let rpc_url = args
                .rpc_url
                .as_deref()
                .context("either --rpc-url (or RPC_URL) or --snapshot is required")?;
            let source = RpcSource::new(rpc_url)?;
            manager
                .init_from_source(InitSource::Upstream(&source), opts)
                .await?
        }
    }

    println!("TokamakL2StateManager created.");
    let forest = manager.initial_forest()?;
    for (address, root) in forest.keys().zip(forest.roots()) {
        println!("Merkle root of {address}: {}", format_root(&root));
    }

    if let Some(out) = &args.out {
        let prior = match args.snapshot {
            Some(snapshot) => snapshot,
            None => args
                .config
                .snapshot_template(&args.channel_id, manager.registered_keys()?)?,
        };
        let snapshot = manager.capture_snapshot(&prior)?;
        fs::write(out, snapshot.to_json()?)
            .with_context(|| format!("failed to write {}", out.display()))?;
        info!(path = %out.display(), "Snapshot written");
    }

    Ok(())
}

/// Exits with code 2 when the snapshot is malformed.
fn validate_snapshot(path: &Path) -> Result<ExitCode> {
    let snapshot: serde_json::Value = serde_json::from_str(&read(path)?)
        .with_context(|| format!("failed to parse snapshot file {}", path.display()))?;

    match validate_snapshot_json(&snapshot) {
        Ok(summary) => {
            println!("Snapshot validation passed: {}", path.display());
            println!("- addresses: {}", summary.addresses);
            println!("- roots: {}", summary.roots);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("Snapshot validation failed:");
            for failure in &err.failures {
                eprintln!("- {failure}");
            }
            Ok(ExitCode::from(2))
        }
    }
}

fn read(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
