//! # Network Parameters & Constants
//!
//! Every number the chain index depends on lives here. The genesis header
//! of each network is defined in this file and nowhere else. If two nodes
//! disagree about it, they are not on the same network, full stop.

use std::fmt;
use std::str::FromStr;

use crate::crypto::blake3_hash;
use crate::storage::entry::{BlockHash, BlockHeader, Hash256};

// ---------------------------------------------------------------------------
// Protocol Constants
// ---------------------------------------------------------------------------

/// Length of a block hash in bytes.
pub const HASH_LENGTH: usize = 32;

/// Number of blocks (the entry itself plus its ancestors) whose timestamps
/// feed the median-time-past computation.
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Compact target of the mainnet genesis block. Same value Bitcoin started
/// with, which makes the work arithmetic easy to cross-check.
pub const MAINNET_BITS: u32 = 0x1d00_ffff;

/// Compact target of the testnet genesis block.
pub const TESTNET_BITS: u32 = 0x1f00_ffff;

/// Regtest target: the easiest target that still decodes to positive work.
/// Every regtest block contributes exactly 2 units of work.
pub const REGTEST_BITS: u32 = 0x207f_ffff;

/// Header version stamped on genesis blocks.
pub const GENESIS_VERSION: u32 = 1;

/// Message whose hash is used as the genesis merkle root.
pub const GENESIS_MESSAGE: &[u8] = b"ALAS/2026: The future of payments belongs to everyone";

/// Interval of the devnet header producer, in milliseconds.
pub const DEVNET_BLOCK_INTERVAL_MS: u64 = 2_000;

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// The networks a node can be started on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    /// Production network.
    Main,
    /// Public test network.
    Testnet,
    /// Local regression-test network with trivial difficulty.
    Regtest,
}

impl Network {
    /// Lowercase name, as accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Main => "main",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "main" | "mainnet" => Ok(Network::Main),
            "testnet" => Ok(Network::Testnet),
            "regtest" | "devnet" => Ok(Network::Regtest),
            other => Err(format!("unknown network: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// NetworkParams
// ---------------------------------------------------------------------------

/// Static parameters of one network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkParams {
    /// Which network these parameters describe.
    pub network: Network,
    /// The genesis header. Its hash anchors the whole block tree.
    pub genesis: BlockHeader,
    /// Default port of the JSON-RPC/REST API.
    pub rpc_port: u16,
    /// Default port of the Prometheus endpoint.
    pub metrics_port: u16,
}

impl NetworkParams {
    /// Parameters for the given network.
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Main => Self::main(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    /// Mainnet parameters.
    pub fn main() -> Self {
        Self {
            network: Network::Main,
            genesis: genesis_header(1_767_225_600, MAINNET_BITS, 2_083_236_893),
            rpc_port: 9741,
            metrics_port: 9742,
        }
    }

    /// Testnet parameters.
    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            genesis: genesis_header(1_767_225_601, TESTNET_BITS, 414_098_458),
            rpc_port: 19741,
            metrics_port: 19742,
        }
    }

    /// Regtest parameters.
    pub fn regtest() -> Self {
        Self {
            network: Network::Regtest,
            genesis: genesis_header(1_767_225_602, REGTEST_BITS, 2),
            rpc_port: 29741,
            metrics_port: 29742,
        }
    }

    /// Hash of this network's genesis header.
    pub fn genesis_hash(&self) -> BlockHash {
        self.genesis.hash()
    }
}

fn genesis_header(time: u64, bits: u32, nonce: u32) -> BlockHeader {
    BlockHeader {
        version: GENESIS_VERSION,
        prev_hash: BlockHash::ZERO,
        merkle_root: Hash256(blake3_hash(GENESIS_MESSAGE)),
        time,
        bits,
        nonce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_hashes_are_distinct_per_network() {
        let main = NetworkParams::main().genesis_hash();
        let test = NetworkParams::testnet().genesis_hash();
        let reg = NetworkParams::regtest().genesis_hash();
        assert_ne!(main, test);
        assert_ne!(main, reg);
        assert_ne!(test, reg);
    }

    #[test]
    fn genesis_parent_is_zero_sentinel() {
        for network in [Network::Main, Network::Testnet, Network::Regtest] {
            let params = NetworkParams::for_network(network);
            assert!(params.genesis.prev_hash.is_zero());
            assert_eq!(params.network, network);
        }
    }

    #[test]
    fn network_names_round_trip() {
        for network in [Network::Main, Network::Testnet, Network::Regtest] {
            assert_eq!(network.as_str().parse::<Network>().unwrap(), network);
        }
        assert_eq!("DEVNET".parse::<Network>().unwrap(), Network::Regtest);
        assert!("simnet".parse::<Network>().is_err());
    }

    #[test]
    fn ports_do_not_collide() {
        let all = [
            NetworkParams::main(),
            NetworkParams::testnet(),
            NetworkParams::regtest(),
        ];
        for p in &all {
            assert_ne!(p.rpc_port, p.metrics_port);
        }
    }
}
