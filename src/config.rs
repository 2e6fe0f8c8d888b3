//! Top-level node configuration (§4.4, §4.5, §4.8, §6 ambient stack).
//!
//! This module aggregates configuration for:
//!
//! - protocol parameters (`ProtocolConfig`) — block time, block size,
//!   reward, minimum validator stake,
//! - the mempool (`MempoolConfig`),
//! - the gossip envelope layer (`GossipConfig`),
//! - persistence (`StoreConfig`).
//!
//! Higher-level binaries construct a single [`ChainConfig`] from defaults
//! (or, eventually, a config file/environment) and pass slices of it down
//! to the component that owns each concern.

use std::time::Duration;

/// Protocol constants used as consensus parameters (§4.4).
#[derive(Clone, Debug)]
pub struct ProtocolConfig {
    /// Target time between blocks.
    pub block_time: Duration,
    /// Maximum transactions per block (including coinbase).
    pub max_block_size: usize,
    /// Reward credited to the coinbase `to` address.
    pub block_reward: u64,
    /// Minimum stake required to be considered an eligible validator.
    pub min_validator_stake: u64,
    /// Whether live `Append` enforces `0.8 * block_time` minimum spacing
    /// between a block and its parent (§9 Open Question, resolved: yes).
    pub enforce_min_block_spacing: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            block_time: Duration::from_millis(200),
            max_block_size: 1000,
            block_reward: 50,
            min_validator_stake: 1000,
            enforce_min_block_spacing: true,
        }
    }
}

impl ProtocolConfig {
    /// `0.8 * BlockTime`, in whole seconds, as used by
    /// `Block::validate_against_parent`'s live spacing check.
    pub fn min_block_gap_secs(&self) -> i64 {
        ((self.block_time.as_secs_f64() * 0.8).floor()) as i64
    }
}

/// Mempool bounds (§4.5).
#[derive(Clone, Debug)]
pub struct MempoolConfig {
    pub max_size: usize,
    pub max_tx_per_address: usize,
    pub max_tx_age: Duration,
    pub min_fee: u64,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            max_tx_per_address: 100,
            max_tx_age: Duration::from_secs(3600),
            min_fee: 1,
        }
    }
}

/// Gossip envelope bounds (§4.8).
#[derive(Clone, Debug)]
pub struct GossipConfig {
    pub default_ttl: u32,
    pub max_ttl: u32,
    pub fanout: usize,
    pub rate_limit_per_sec: u32,
    pub rate_limit_violations_before_quarantine: u32,
    pub quarantine_duration: Duration,
    pub max_message_size: usize,
    pub cache_size: usize,
    pub cache_duration: Duration,
    pub sweep_interval: Duration,
    /// Separate, larger-bucket rate limit applied to unicast sync
    /// messages (§9 Open Question, resolved: yes).
    pub sync_rate_limit_per_sec: u32,
    pub max_blocks_per_sync: u64,
    pub min_peers: usize,
    pub max_peers: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            default_ttl: 10,
            max_ttl: 20,
            fanout: 3,
            rate_limit_per_sec: 100,
            rate_limit_violations_before_quarantine: 10,
            quarantine_duration: Duration::from_secs(300),
            max_message_size: 1024 * 1024,
            cache_size: 10_000,
            cache_duration: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            sync_rate_limit_per_sec: 1000,
            max_blocks_per_sync: 100,
            min_peers: 4,
            max_peers: 32,
        }
    }
}

/// Persistence configuration (§6, ambient persistence adapter).
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    pub create_if_missing: bool,
    /// Number of most-recent checkpoints to retain; blocks below the
    /// oldest kept checkpoint may be pruned.
    pub checkpoint_retention: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "data/chain-db".to_string(),
            create_if_missing: true,
            checkpoint_retention: 10,
        }
    }
}

/// Top-level configuration for a chain node.
#[derive(Clone, Debug, Default)]
pub struct ChainConfig {
    pub protocol: ProtocolConfig,
    pub mempool: MempoolConfig,
    pub gossip: GossipConfig,
    pub store: StoreConfig,
}
