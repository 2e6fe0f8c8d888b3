//! Chain library crate.
//!
//! This crate provides the core building blocks for a small permissionless
//! proof-of-stake blockchain:
//!
//! - strongly-typed domain types and canonical hashing (`types`, `codec`),
//! - wallet/signature key material (`crypto`),
//! - deterministic state execution (`state`),
//! - a bounded pending-transaction pool (`mempool`),
//! - PoS leader election (`selector`),
//! - the miner loop (`miner`),
//! - an append-only, thread-safe chain (`chain`),
//! - the anti-abuse gossip envelope layer (`gossip`),
//! - the transport interface and wire payloads (`network`),
//! - persistence (`storage`),
//! - the node core wiring everything together (`node`),
//! - and top-level configuration (`config`).
//!
//! Higher-level binaries compose these pieces into a running validator
//! node.

pub mod chain;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gossip;
pub mod mempool;
pub mod miner;
pub mod network;
pub mod node;
pub mod selector;
pub mod state;
pub mod storage;
pub mod types;

pub use chain::Chain;
pub use config::ChainConfig;
pub use crypto::{verify, KeyPair, RawSignature, Secp256k1KeyPair};
pub use error::{BlockError, GossipError, MempoolError, MineError, NodeError, SyncError, TxError};
pub use gossip::{GossipEnvelope, GossipLayer};
pub use mempool::{Mempool, MempoolStats};
pub use miner::Miner;
pub use network::{PeerEventHandler, PeerLink, SyncRequest, SyncResponse};
pub use node::Replicator;
pub use selector::{leader, rank, weighted_random_selection, Validator};
pub use state::{Checkpoint, State};
pub use storage::{InMemoryStore, RocksDbStore, Store};
pub use types::*;
