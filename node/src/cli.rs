//! # CLI Interface
//!
//! Command-line arguments for `nova-chain-node`, via `clap` derive. Every
//! `run` flag can also come from a `NOVA_CHAIN_*` environment variable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use nova_chain::Network;

use crate::logging::LogFormat;

/// NOVA chain index node.
///
/// Tracks the block tree, follows the heaviest chain, and answers
/// block and confirmation queries over JSON-RPC, REST and WebSocket.
#[derive(Parser, Debug)]
#[command(
    name = "nova-chain-node",
    about = "NOVA block-tree index and confirmation node",
    version,
    propagate_version = true
)]
pub struct NovaChainCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Network to join: main, testnet or regtest.
    #[arg(long, short = 'n', env = "NOVA_CHAIN_NETWORK", default_value = "regtest")]
    pub network: Network,

    /// Directory for the entry log. A per-network subdirectory is used.
    ///
    /// Created on first run if it does not exist.
    #[arg(long, short = 'd', env = "NOVA_CHAIN_DATA_DIR", default_value = ".nova-chain")]
    pub data_dir: PathBuf,

    /// Keep everything in memory. Nothing survives a restart.
    #[arg(long, env = "NOVA_CHAIN_MEMORY")]
    pub memory: bool,

    /// Port for the JSON-RPC and REST API. Defaults to the network's port.
    #[arg(long, env = "NOVA_CHAIN_RPC_PORT")]
    pub rpc_port: Option<u16>,

    /// Port for the Prometheus metrics endpoint. Defaults to the network's port.
    #[arg(long, env = "NOVA_CHAIN_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Extend the active tip with a fresh header every N milliseconds.
    /// 0 disables the producer. Regtest only.
    #[arg(long, env = "NOVA_CHAIN_PRODUCE_INTERVAL_MS", default_value_t = 0)]
    pub produce_interval_ms: u64,

    /// Log output format.
    #[arg(long, env = "NOVA_CHAIN_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}
