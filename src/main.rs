// src/main.rs
//
// Minimal demo node that wires up the chain library:
//
// - an in-memory, peerless transport (no real network yet)
// - a single self-staked genesis validator
// - the miner timer and gossip cache sweeper running as background tasks
// - graceful shutdown on Ctrl+C

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;

use chain::crypto::{KeyPair, Secp256k1KeyPair};
use chain::network::PeerLink;
use chain::types::{Address, Block, BlockHeader, Transaction};
use chain::{Chain, ChainConfig, Miner, Replicator};

/// A transport with no peers, for local smoke-testing. Broadcasts and
/// unicasts are no-ops; there is never anyone to sync from or to.
struct LoopbackPeerLink;

impl PeerLink for LoopbackPeerLink {
    fn send_unicast(&self, _peer_id: &str, _msg_type: &str, _bytes: &[u8]) -> Result<(), String> {
        Ok(())
    }
    fn broadcast(&self, _msg_type: &str, _bytes: &[u8]) {}
    fn connected_peer_ids(&self) -> Vec<String> {
        Vec::new()
    }
    fn request_peers(&self) {}
    fn disconnect_peer(&self, _peer_id: &str) {}
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "chain=info".to_string()))
        .init();

    if let Err(e) = run_node().await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run_node() -> Result<(), String> {
    let cfg = ChainConfig::default();

    let keypair = Secp256k1KeyPair::generate();
    let address = keypair.address();

    let genesis = genesis_block(&keypair, cfg.protocol.min_validator_stake);
    let chain = Arc::new(
        Chain::new(genesis, cfg.protocol.clone())
            .map_err(|e| format!("failed to build genesis chain: {e}"))?,
    );

    tracing::info!(
        address = %address,
        height = chain.height(),
        "node initialised"
    );

    let miner = Miner::new(Box::new(keypair));
    miner.start_mining();

    let transport: Arc<dyn PeerLink> = Arc::new(LoopbackPeerLink);
    let replicator = Arc::new(Replicator::new(chain, miner, &cfg, transport));

    let (cancel_tx, cancel_rx) = watch::channel(false);
    chain::node::spawn_background_tasks(
        replicator.clone(),
        cfg.protocol.block_time,
        cfg.gossip.sweep_interval,
        cancel_rx,
    );

    signal::ctrl_c().await.map_err(|e| format!("failed to listen for ctrl_c: {e}"))?;
    tracing::info!("shutdown requested, stopping workers");
    let _ = cancel_tx.send(true);

    Ok(())
}

/// Builds a single-validator genesis block: a coinbase credits `address`
/// with `stake`, followed by a self-stake transaction locking that same
/// amount, so the demo node clears `MinValidatorStake` from height 0.
fn genesis_block(keypair: &Secp256k1KeyPair, stake: u64) -> Block {
    let address = keypair.address();
    let now = current_unix_timestamp();

    let coinbase = Transaction::new_coinbase(address.clone(), stake, 0, now);

    let mut stake_tx = Transaction {
        id: String::new(),
        from: address.clone(),
        to: address.clone(),
        amount: stake,
        fee: 0,
        timestamp: now,
        signature: String::new(),
        public_key: String::new(),
        nonce: 0,
        data: serde_json::to_string(&chain::types::TxData::Stake {
            payload: chain::types::AmountPayload { amount: stake },
        })
        .expect("TxData::Stake always serializes"),
    };
    stake_tx.sign(keypair).expect("genesis stake tx signs under its own keypair");

    let transactions = vec![coinbase, stake_tx];
    let merkle_root = Block::compute_merkle_root(&transactions);
    let header = BlockHeader {
        version: 1,
        height: 0,
        timestamp: now,
        previous_hash: String::new(),
        merkle_root,
        validator_addr: Address(String::new()),
        signature: String::new(),
        public_key: String::new(),
        nonce: 0,
        checkpoint_hash: None,
        checkpoint_height: None,
    };
    let mut block = Block {
        header,
        transactions,
        hash: String::new(),
    };
    block.hash = block.compute_hash();
    block
}

fn current_unix_timestamp() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
