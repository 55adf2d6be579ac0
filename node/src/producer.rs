//! # Devnet Header Producer
//!
//! A stand-in for the miner on regtest. Every tick it builds a header on
//! top of the active tip and submits it like any other header, so a lone
//! node has a moving chain to serve. There is no proof-of-work search:
//! headers are accepted as already validated.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use nova_chain::{BlockHeader, ChainEntry, ChainTree};

use crate::events::submit_header_async;
use crate::metrics::SharedMetrics;

/// Header for the next block on top of `tip`.
///
/// Keeps timestamps strictly increasing along the chain even if the wall
/// clock is behind the tip.
pub fn next_header(tip: &ChainEntry, now_secs: u64, nonce: u32) -> BlockHeader {
    let time = now_secs.max(tip.time() + 1);
    BlockHeader::extending(tip, time, tip.header.bits, nonce)
}

/// Periodically extends the active tip of a shared tree.
pub struct HeaderProducer {
    tree: Arc<ChainTree>,
    metrics: SharedMetrics,
    interval: Duration,
}

impl HeaderProducer {
    pub fn new(tree: Arc<ChainTree>, metrics: SharedMetrics, interval: Duration) -> Self {
        Self {
            tree,
            metrics,
            interval,
        }
    }

    /// Produce one header. Returns the new tip height on success.
    pub async fn produce_once(&self) -> anyhow::Result<u64> {
        let tip = self.tree.tip();
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        let header = next_header(&tip, now, rand::random());

        let outcome = submit_header_async(
            Arc::clone(&self.tree),
            Arc::clone(&self.metrics),
            header,
        )
        .await??;

        let entry = outcome.entry();
        debug!(height = entry.height, hash = %entry.hash, "header produced");
        Ok(entry.height)
    }

    /// Run until the task is aborted.
    pub async fn run(self) {
        info!(interval_ms = self.interval.as_millis() as u64, "header producer starting");

        let mut interval = tokio::time::interval(self.interval);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            if let Err(e) = self.produce_once().await {
                warn!(error = %e, "header production failed");
            }
        }
    }
}
