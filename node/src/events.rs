//! # Chain Events
//!
//! Bridges the chain tree's listener callbacks into the node's outer
//! world: Prometheus counters and the broadcast channel that feeds `/ws`
//! subscribers.
//!
//! ```text
//!  ChainTree ── on_tip_changed ──► block counters, gauges, histogram
//!                               └► broadcast::Sender<NodeEvent>
//! ```
//!
//! The listener never refuses a reorg. It only observes.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use nova_chain::{
    BlockHeader, ChainListener, ChainResult, ChainTree, ChainUpdate, InsertOutcome,
};

use crate::metrics::SharedMetrics;

/// Events pushed to WebSocket subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeEvent {
    /// The active tip moved.
    #[serde(rename = "new_tip")]
    NewTip {
        height: u64,
        hash: String,
        chainwork: String,
        timestamp: u64,
    },
    /// The active tip moved to a different branch.
    #[serde(rename = "reorganized")]
    Reorganized {
        fork_height: u64,
        depth: u64,
        old_tip: String,
        new_tip: String,
        height: u64,
        timestamp: u64,
    },
}

/// [`ChainListener`] that records metrics and publishes [`NodeEvent`]s.
pub struct NodeListener {
    metrics: SharedMetrics,
    event_tx: broadcast::Sender<NodeEvent>,
}

impl NodeListener {
    pub fn new(metrics: SharedMetrics, event_tx: broadcast::Sender<NodeEvent>) -> Self {
        Self { metrics, event_tx }
    }
}

impl ChainListener for NodeListener {
    // Connect/disconnect calls can be undone when another listener refuses,
    // so block counters only move once the tip change is final.
    fn on_tip_changed(&self, update: &ChainUpdate) {
        let timestamp = chrono::Utc::now().timestamp_millis() as u64;
        let tip = &update.new_tip;

        self.metrics
            .blocks_connected_total
            .inc_by(update.connected.len() as u64);
        self.metrics
            .blocks_disconnected_total
            .inc_by(update.disconnected.len() as u64);
        self.metrics.chain_height.set(tip.height as i64);

        if update.is_reorg() {
            self.metrics.reorgs_total.inc();
            self.metrics.reorg_depth.observe(update.depth() as f64);
            // No subscribers is fine.
            let _ = self.event_tx.send(NodeEvent::Reorganized {
                fork_height: update.fork_point.height,
                depth: update.depth() as u64,
                old_tip: update.old_tip.hash.to_hex(),
                new_tip: tip.hash.to_hex(),
                height: tip.height,
                timestamp,
            });
        }

        let _ = self.event_tx.send(NodeEvent::NewTip {
            height: tip.height,
            hash: tip.hash.to_hex(),
            chainwork: tip.chainwork_hex(),
            timestamp,
        });
    }
}

/// Insert a header, timing it and refreshing the tree-level gauges.
///
/// Blocking: call from `spawn_blocking` inside async code.
pub fn submit_header(
    tree: &ChainTree,
    metrics: &SharedMetrics,
    header: BlockHeader,
) -> ChainResult<InsertOutcome> {
    let started = Instant::now();
    let result = tree.insert_header(header);
    metrics
        .header_insert_seconds
        .observe(started.elapsed().as_secs_f64());
    metrics.observe_tree(tree);
    result
}

/// Same as [`submit_header`], but on the blocking pool.
pub async fn submit_header_async(
    tree: Arc<ChainTree>,
    metrics: SharedMetrics,
    header: BlockHeader,
) -> anyhow::Result<ChainResult<InsertOutcome>> {
    let outcome =
        tokio::task::spawn_blocking(move || submit_header(&tree, &metrics, header)).await?;
    Ok(outcome)
}
