// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NOVA Chain Node
//!
//! Entry point for the `nova-chain-node` binary. Parses CLI arguments,
//! initializes logging and metrics, opens (or replays) the block tree,
//! and serves the HTTP/WS API.
//!
//! The binary supports two subcommands:
//!
//! - `run`: start the node
//! - `version`: print build version information

mod api;
mod cli;
mod events;
mod logging;
mod metrics;
mod producer;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;

use nova_chain::{ChainQuery, ChainTree, EntryDb, Network, NetworkParams};

use cli::{Commands, NovaChainCli};
use events::NodeListener;
use metrics::NodeMetrics;
use producer::HeaderProducer;

/// Broadcast channel capacity for live event streaming.
/// Large enough to absorb a deep reorg burst without dropping events
/// for connected WebSocket clients.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = NovaChainCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: block tree, API server, metrics endpoint, and the
/// optional regtest header producer.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(logging::DEFAULT_FILTER, args.log_format)
        .context("failed to initialize logging")?;

    let params = NetworkParams::for_network(args.network);
    let rpc_port = args.rpc_port.unwrap_or(params.rpc_port);
    let metrics_port = args.metrics_port.unwrap_or(params.metrics_port);

    tracing::info!(
        network = %args.network,
        rpc_port,
        metrics_port,
        genesis = %params.genesis_hash(),
        "starting nova-chain-node"
    );

    // --- Metrics & events ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register metrics")?);
    let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let listener = Arc::new(NodeListener::new(Arc::clone(&node_metrics), event_tx.clone()));

    // --- Block tree ---
    let mut builder = ChainTree::builder(params).with_listener(listener);
    if args.memory {
        tracing::warn!("running in memory, nothing will survive a restart");
    } else {
        let db_path = args.data_dir.join(args.network.as_str());
        std::fs::create_dir_all(&db_path).with_context(|| {
            format!("failed to create data directory: {}", db_path.display())
        })?;
        let db = EntryDb::open(&db_path)
            .with_context(|| format!("failed to open entry log at {}", db_path.display()))?;
        tracing::info!(path = %db_path.display(), "entry log opened");
        builder = builder.with_db(db);
    }

    let tree = Arc::new(builder.build().context("failed to load block tree")?);
    node_metrics.observe_tree(&tree);

    // --- Application state ---
    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        network: args.network.to_string(),
        query: ChainQuery::new(Arc::clone(&tree)),
        event_tx,
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC/API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Header producer ---
    let producer = match (args.produce_interval_ms, args.network) {
        (0, _) => None,
        (ms, Network::Regtest) => {
            let producer = HeaderProducer::new(
                Arc::clone(&tree),
                Arc::clone(&node_metrics),
                Duration::from_millis(ms),
            );
            Some(tokio::spawn(producer.run()))
        }
        (_, network) => {
            tracing::warn!(%network, "header producer is regtest only, ignoring interval");
            None
        }
    };

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    if let Some(handle) = producer {
        handle.abort();
    }
    tracing::info!(height = tree.height(), "nova-chain-node stopped");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("nova-chain-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc           {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported. If a handler cannot be
/// installed, that branch never completes.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
