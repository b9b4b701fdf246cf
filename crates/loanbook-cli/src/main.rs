//! Loanbook CLI - Claim tree tooling and a scripted lending scenario
//!
//! The genesis config is read from `--genesis`, then `LOANBOOK_GENESIS`
//! (a `.env` file is honoured), and falls back to the built-in default.
//!
//! ```bash
//! loanbook root
//! loanbook proof --account alice --asset 1
//! loanbook verify --root 0x... --account alice --asset 1 --proof 0x..,0x..
//! loanbook scenario
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use loanbook_protocol::GenesisConfig;
use tracing::debug;

mod commands;
mod display;

use commands::{scenario, tree};

const GENESIS_ENV: &str = "LOANBOOK_GENESIS";

/// Loanbook - collateral-backed lending with Merkle-gated claims
#[derive(Parser)]
#[command(name = "loanbook")]
#[command(version)]
#[command(about = "Collateral-backed lending ledger with Merkle-gated asset claims", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Genesis config JSON (overrides LOANBOOK_GENESIS)
    #[arg(long, global = true)]
    genesis: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the claim root from the genesis allowlist
    Root,

    /// Print the proof for one allowlist entry
    Proof {
        /// Leaf index in the allowlist
        #[arg(long, conflicts_with_all = ["account", "asset"])]
        index: Option<usize>,

        /// Claimant account (`alice`, `user:alice`, `component:vault`)
        #[arg(long, requires = "asset")]
        account: Option<String>,

        /// Asset id
        #[arg(long, requires = "account")]
        asset: Option<u64>,
    },

    /// Check a proof against a root
    Verify {
        /// Root as 0x-prefixed hex
        #[arg(long)]
        root: String,

        /// Claimant account
        #[arg(long)]
        account: String,

        /// Asset id
        #[arg(long)]
        asset: u64,

        /// Sibling hashes, comma separated, leaf level first
        #[arg(long, value_delimiter = ',')]
        proof: Vec<String>,
    },

    /// Run the lending and claim scenario against an in-memory protocol
    Scenario,

    /// Print the effective genesis config as JSON
    Genesis,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

fn load_genesis(path: Option<PathBuf>) -> anyhow::Result<GenesisConfig> {
    let path = path.or_else(|| std::env::var_os(GENESIS_ENV).map(PathBuf::from));
    match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading genesis config");
            GenesisConfig::from_file(&path)
                .with_context(|| format!("loading genesis config from {}", path.display()))
        }
        None => Ok(GenesisConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = load_genesis(cli.genesis)?;

    match cli.command {
        Commands::Root => tree::show_root(&config)?,
        Commands::Proof {
            index,
            account,
            asset,
        } => tree::show_proof(&config, index, account.as_deref(), asset)?,
        Commands::Verify {
            root,
            account,
            asset,
            proof,
        } => tree::verify(&root, &account, asset, &proof)?,
        Commands::Scenario => scenario::run(config).await?,
        Commands::Genesis => println!("{}", config.to_json()?),
    }

    Ok(())
}
