//! # Prometheus Metrics
//!
//! Exposes chain-index metrics for the node. Scraped by Prometheus at the
//! `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] with
//! the `nova_chain` namespace so they do not collide with any default
//! global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;

use nova_chain::ChainTree;

/// Holds all Prometheus metric handles for the node.
///
/// Prometheus handles are reference counted internally, so cloning is
/// cheap and every clone updates the same series.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Height of the active tip.
    pub chain_height: IntGauge,
    /// Number of branch tips, active one included.
    pub chain_tips: IntGauge,
    /// Number of stored entries across all branches.
    pub chain_entries: IntGauge,
    /// Blocks that joined the main chain.
    pub blocks_connected_total: IntCounter,
    /// Blocks that left the main chain.
    pub blocks_disconnected_total: IntCounter,
    /// Tip changes that disconnected at least one block.
    pub reorgs_total: IntCounter,
    /// Blocks disconnected per reorg.
    pub reorg_depth: Histogram,
    /// Wall time of `insert_header`, reorg included.
    pub header_insert_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("nova_chain".into()), None)?;

        let chain_height = IntGauge::new("chain_height", "Height of the active chain tip")?;
        registry.register(Box::new(chain_height.clone()))?;

        let chain_tips = IntGauge::new("chain_tips", "Number of known branch tips")?;
        registry.register(Box::new(chain_tips.clone()))?;

        let chain_entries =
            IntGauge::new("chain_entries", "Number of stored block entries, all branches")?;
        registry.register(Box::new(chain_entries.clone()))?;

        let blocks_connected_total = IntCounter::new(
            "blocks_connected_total",
            "Total number of blocks connected to the main chain",
        )?;
        registry.register(Box::new(blocks_connected_total.clone()))?;

        let blocks_disconnected_total = IntCounter::new(
            "blocks_disconnected_total",
            "Total number of blocks disconnected from the main chain",
        )?;
        registry.register(Box::new(blocks_disconnected_total.clone()))?;

        let reorgs_total = IntCounter::new("reorgs_total", "Total number of reorganizations")?;
        registry.register(Box::new(reorgs_total.clone()))?;

        let reorg_depth = Histogram::with_opts(
            HistogramOpts::new("reorg_depth", "Blocks disconnected per reorganization")
                .buckets(vec![1.0, 2.0, 3.0, 6.0, 10.0, 25.0, 100.0, 1_000.0]),
        )?;
        registry.register(Box::new(reorg_depth.clone()))?;

        let header_insert_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "header_insert_seconds",
                "Time to insert one header, including any reorganization, in seconds",
            )
            .buckets(vec![
                0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
            ]),
        )?;
        registry.register(Box::new(header_insert_seconds.clone()))?;

        Ok(Self {
            registry,
            chain_height,
            chain_tips,
            chain_entries,
            blocks_connected_total,
            blocks_disconnected_total,
            reorgs_total,
            reorg_depth,
            header_insert_seconds,
        })
    }

    /// Refresh the gauges that describe the tree as a whole.
    pub fn observe_tree(&self, tree: &ChainTree) {
        self.chain_height.set(tree.height() as i64);
        self.chain_tips.set(tree.store().tip_count() as i64);
        self.chain_entries.set(tree.store().len() as i64);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
