//! Replicator: the node core that wires Chain, Mempool, Miner, and the
//! gossip layer to a transport (§4.9, §5).
//!
//! The Replicator never talks to sockets; it implements
//! [`PeerEventHandler`] and depends on a [`PeerLink`] for everything
//! outbound. Long-running work (the miner timer, the gossip cache
//! sweeper, peer-count maintenance) runs as `tokio` tasks cancelled
//! cooperatively through a `watch<bool>` channel (§5).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::chain::Chain;
use crate::config::ChainConfig;
use crate::error::NodeError;
use crate::gossip::{GossipEnvelope, GossipLayer};
use crate::mempool::Mempool;
use crate::miner::Miner;
use crate::network::{
    PeerEventHandler, PeerLink, SyncRequest, SyncResponse, MSG_BLOCK, MSG_GOSSIP, MSG_SYNC_REQUEST,
    MSG_SYNC_RESPONSE, MSG_TRANSACTION,
};
use crate::types::{Block, Transaction};

fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

struct PeerInfo {
    connected_at: i64,
    messages_received: u64,
}

/// Node core: owns the replicated state machine and the anti-abuse gossip
/// layer, and dispatches transport events into them (§4.9).
pub struct Replicator {
    chain: Arc<Chain>,
    mempool: Mutex<Mempool>,
    miner: Miner,
    gossip: GossipLayer,
    transport: Arc<dyn PeerLink>,
    peers: RwLock<HashMap<String, PeerInfo>>,
    min_peers: usize,
    max_peers: usize,
    max_blocks_per_sync: u64,
    default_ttl: u32,
    fanout: usize,
}

impl Replicator {
    pub fn new(chain: Arc<Chain>, miner: Miner, config: &ChainConfig, transport: Arc<dyn PeerLink>) -> Self {
        Self {
            chain,
            mempool: Mutex::new(Mempool::new(config.mempool.clone())),
            miner,
            gossip: GossipLayer::new(config.gossip.clone()),
            transport,
            peers: RwLock::new(HashMap::new()),
            min_peers: config.gossip.min_peers,
            max_peers: config.gossip.max_peers,
            max_blocks_per_sync: config.gossip.max_blocks_per_sync,
            default_ttl: config.gossip.default_ttl,
            fanout: config.gossip.fanout,
        }
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    fn mempool_admit(&self, tx: Transaction) -> Result<(), NodeError> {
        self.mempool.lock().expect("mempool lock poisoned").admit(tx)?;
        Ok(())
    }

    fn mempool_remove(&self, ids: &[String]) {
        self.mempool.lock().expect("mempool lock poisoned").remove(ids);
    }

    fn mempool_contains(&self, id: &str) -> bool {
        self.mempool.lock().expect("mempool lock poisoned").contains(id)
    }

    /// `block`: deserialize; drop if already present; otherwise append and
    /// re-broadcast on success (§4.9).
    fn handle_block(&self, sender: Option<&str>, bytes: &[u8]) {
        let block: Block = match serde_json::from_slice(bytes) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "dropping malformed block message");
                return;
            }
        };
        if self.chain.get_block(&block.hash).is_some() {
            return;
        }
        let ids: Vec<String> = block.transactions.get(1..).unwrap_or(&[]).iter().map(|tx| tx.id.clone()).collect();
        match self.chain.append(block.clone()) {
            Ok(()) => {
                self.mempool_remove(&ids);
                self.rebroadcast(MSG_BLOCK, bytes, sender);
            }
            Err(e) => debug!(error = %e, "rejected inbound block"),
        }
    }

    /// `transaction`: deserialize; drop if already pooled; otherwise admit
    /// and re-broadcast on success (§4.9).
    fn handle_transaction(&self, sender: Option<&str>, bytes: &[u8]) {
        let tx: Transaction = match serde_json::from_slice(bytes) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "dropping malformed transaction message");
                return;
            }
        };
        if self.mempool_contains(&tx.id) {
            return;
        }
        match self.mempool_admit(tx) {
            Ok(()) => self.rebroadcast(MSG_TRANSACTION, bytes, sender),
            Err(e) => debug!(error = %e, "rejected inbound transaction"),
        }
    }

    /// `sync_request {from_height}`: reply unicast with the requested
    /// range, bounded by `MaxBlocksPerSync` (§4.9).
    fn handle_sync_request(&self, sender: &str, bytes: &[u8]) {
        let req: SyncRequest = match serde_json::from_slice(bytes) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "dropping malformed sync_request");
                return;
            }
        };
        let head = self.chain.height();
        if req.from_height > head {
            return;
        }
        let end = req.from_height.saturating_add(self.max_blocks_per_sync).min(head);
        let blocks = self.chain.range(req.from_height, end);
        let resp = SyncResponse { blocks };
        let payload = serde_json::to_vec(&resp).expect("SyncResponse is always serializable");
        if let Err(e) = self.transport.send_unicast(sender, MSG_SYNC_RESPONSE, &payload) {
            warn!(peer = sender, error = %e, "failed to send sync_response");
        }
    }

    /// `sync_response {blocks}`: apply in order, skipping already-present
    /// blocks; abort on the first append failure (§4.9).
    fn handle_sync_response(&self, bytes: &[u8]) {
        let resp: SyncResponse = match serde_json::from_slice(bytes) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "dropping malformed sync_response");
                return;
            }
        };
        for block in resp.blocks {
            if self.chain.get_block(&block.hash).is_some() {
                continue;
            }
            let ids: Vec<String> = block.transactions.get(1..).unwrap_or(&[]).iter().map(|tx| tx.id.clone()).collect();
            match self.chain.append(block) {
                Ok(()) => self.mempool_remove(&ids),
                Err(e) => {
                    warn!(error = %e, "sync response aborted: broken link");
                    break;
                }
            }
        }
    }

    /// Runs the full gossip receive pipeline (§4.8) then dispatches the
    /// inner payload to the matching handler, forwarding to `Fanout` peers
    /// on acceptance.
    fn handle_gossip(&self, sender: &str, bytes: &[u8]) {
        let envelope: GossipEnvelope = match serde_json::from_slice(bytes) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "dropping malformed gossip envelope");
                return;
            }
        };
        if let Err(e) = self.gossip.validate_inbound(sender, &envelope, now_secs()) {
            debug!(peer = sender, error = %e, "gossip envelope rejected");
            return;
        }
        let payload = match envelope.payload_bytes() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "gossip envelope payload undecodable");
                return;
            }
        };
        match envelope.msg_type.as_str() {
            MSG_BLOCK => self.handle_block(Some(sender), &payload),
            MSG_TRANSACTION => self.handle_transaction(Some(sender), &payload),
            other => warn!(msg_type = other, "unknown gossip payload type"),
        }

        if envelope.hop_count < envelope.ttl {
            let forwarded = envelope.forwarded();
            let candidates: Vec<String> = self
                .transport
                .connected_peer_ids()
                .into_iter()
                .filter(|p| p != sender && !self.gossip.is_peer_quarantined(p, now_secs()))
                .collect();
            let chosen = pick_random(&candidates, self.fanout);
            let bytes = serde_json::to_vec(&forwarded).expect("GossipEnvelope is always serializable");
            for peer in chosen {
                let _ = self.transport.send_unicast(&peer, MSG_GOSSIP, &bytes);
            }
        }
    }

    /// Every forwarded artifact is re-broadcast to all peers except the one
    /// it came from; locally minted artifacts (`sender = None`) go to all
    /// connected peers (§4.9 broadcast discipline).
    fn rebroadcast(&self, msg_type: &str, bytes: &[u8], sender: Option<&str>) {
        match sender {
            None => self.transport.broadcast(msg_type, bytes),
            Some(from) => {
                for peer in self.transport.connected_peer_ids() {
                    if peer != from {
                        let _ = self.transport.send_unicast(&peer, msg_type, bytes);
                    }
                }
            }
        }
    }

    /// Submits a locally originated transaction: admits it to the mempool
    /// and broadcasts exactly once (§4.9).
    pub fn submit_transaction(&self, tx: Transaction) -> Result<(), NodeError> {
        let bytes = serde_json::to_vec(&tx).expect("Transaction is always serializable");
        self.mempool_admit(tx)?;
        self.rebroadcast(MSG_TRANSACTION, &bytes, None);
        Ok(())
    }

    /// One miner tick: attempts to mine a block and, on success, appends
    /// it locally, drops its txs from the mempool, and broadcasts exactly
    /// once (§4.7 "Replicator's callback").
    pub fn try_mine_once(&self, now: i64) {
        if !self.miner.is_mining() {
            return;
        }
        let attempt = {
            let mempool = self.mempool.lock().expect("mempool lock poisoned");
            self.miner.try_mine_block(&self.chain, &mempool, now)
        };
        match attempt {
            Ok(block) => {
                let ids: Vec<String> = block.transactions.get(1..).unwrap_or(&[]).iter().map(|tx| tx.id.clone()).collect();
                if let Err(e) = self.chain.append(block.clone()) {
                    warn!(error = %e, "locally mined block failed to append");
                    return;
                }
                self.mempool_remove(&ids);
                info!(height = block.header.height, "mined block");
                let bytes = serde_json::to_vec(&block).expect("Block is always serializable");
                self.rebroadcast(MSG_BLOCK, &bytes, None);
            }
            Err(e) => debug!(error = %e, "declined to mine"),
        }
    }

    pub fn sweep_gossip_cache(&self, now: i64) {
        self.gossip.sweep(now);
    }

    /// Peer-count maintenance (§4.9): request a fresh peer list when below
    /// `MinPeers`; disconnect the least-active peers when above `MaxPeers`.
    pub fn maintain_peers(&self, now: i64) {
        let connected = self.transport.connected_peer_ids();
        if connected.len() < self.min_peers {
            debug!(connected = connected.len(), min = self.min_peers, "below MinPeers, requesting more");
            self.transport.request_peers();
        }
        if connected.len() > self.max_peers {
            let peers = self.peers.read().expect("peer set lock poisoned");
            let mut scored: Vec<(String, f64)> = connected
                .iter()
                .map(|id| {
                    let activity = peers
                        .get(id)
                        .map(|info| {
                            let age = (now - info.connected_at).max(1) as f64;
                            info.messages_received as f64 / age
                        })
                        .unwrap_or(0.0);
                    (id.clone(), activity)
                })
                .collect();
            scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            let excess = connected.len() - self.max_peers;
            drop(peers);
            for (peer, _) in scored.into_iter().take(excess) {
                warn!(peer = %peer, "disconnecting least-active peer, above MaxPeers");
                self.transport.disconnect_peer(&peer);
            }
        }
    }
}

impl PeerEventHandler for Replicator {
    /// Schedules a unicast `sync_request{from_height: head+1}` to `peer_id`
    /// after a short delay, to give the transport channel time to open
    /// (§4.9).
    fn on_peer_connected(&self, peer_id: &str) {
        self.peers.write().expect("peer set lock poisoned").insert(
            peer_id.to_string(),
            PeerInfo {
                connected_at: now_secs(),
                messages_received: 0,
            },
        );

        let transport = self.transport.clone();
        let chain = self.chain.clone();
        let peer_id = peer_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            let req = SyncRequest { from_height: chain.height() + 1 };
            let bytes = serde_json::to_vec(&req).expect("SyncRequest is always serializable");
            if let Err(e) = transport.send_unicast(&peer_id, MSG_SYNC_REQUEST, &bytes) {
                warn!(peer = %peer_id, error = %e, "failed to send initial sync_request");
            }
        });
    }

    fn on_peer_disconnected(&self, peer_id: &str) {
        self.peers.write().expect("peer set lock poisoned").remove(peer_id);
    }

    fn on_message(&self, peer_id: &str, msg_type: &str, bytes: &[u8]) {
        if let Some(info) = self.peers.write().expect("peer set lock poisoned").get_mut(peer_id) {
            info.messages_received += 1;
        }
        match msg_type {
            MSG_BLOCK => self.handle_block(Some(peer_id), bytes),
            MSG_TRANSACTION => self.handle_transaction(Some(peer_id), bytes),
            MSG_SYNC_REQUEST => self.handle_sync_request(peer_id, bytes),
            MSG_SYNC_RESPONSE => self.handle_sync_response(bytes),
            MSG_GOSSIP => self.handle_gossip(peer_id, bytes),
            other => warn!(peer = peer_id, msg_type = other, "unknown message type"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KeyPair, Secp256k1KeyPair};
    use crate::types::{Address, AmountPayload, BlockHeader, TxData};

    /// Test-only [`PeerLink`] that delivers directly into the paired
    /// [`Replicator`]'s `on_message`, wired up after construction since each
    /// side's transport needs the other side's (not-yet-built) Replicator.
    struct PairedLink {
        self_id: String,
        peer_id: String,
        peer: Mutex<Option<Arc<Replicator>>>,
    }

    impl PeerLink for PairedLink {
        fn send_unicast(&self, _peer_id: &str, msg_type: &str, bytes: &[u8]) -> Result<(), String> {
            if let Some(peer) = self.peer.lock().expect("lock").clone() {
                peer.on_message(&self.self_id, msg_type, bytes);
            }
            Ok(())
        }
        fn broadcast(&self, msg_type: &str, bytes: &[u8]) {
            let _ = self.send_unicast(&self.peer_id, msg_type, bytes);
        }
        fn connected_peer_ids(&self) -> Vec<String> {
            vec![self.peer_id.clone()]
        }
        fn request_peers(&self) {}
        fn disconnect_peer(&self, _peer_id: &str) {}
    }

    /// A single self-staked validator: coinbase credits `balance + stake`,
    /// a self-stake tx immediately locks `stake`, leaving `balance`.
    fn staked_genesis(kp: &Secp256k1KeyPair, balance: u64, stake: u64) -> Block {
        let address = kp.address();
        let now = 1_700_000_000i64;
        let coinbase = Transaction::new_coinbase(address.clone(), balance + stake, 0, now);
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
            data: serde_json::to_string(&TxData::Stake { payload: AmountPayload { amount: stake } }).unwrap(),
        };
        stake_tx.sign(kp).unwrap();
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

    fn replicator_pair(
        chain_a: Arc<Chain>,
        chain_b: Arc<Chain>,
        miner_a: Miner,
        miner_b: Miner,
        cfg: &ChainConfig,
    ) -> (Arc<Replicator>, Arc<Replicator>) {
        let transport_a = Arc::new(PairedLink {
            self_id: "node-a".to_string(),
            peer_id: "node-b".to_string(),
            peer: Mutex::new(None),
        });
        let transport_b = Arc::new(PairedLink {
            self_id: "node-b".to_string(),
            peer_id: "node-a".to_string(),
            peer: Mutex::new(None),
        });

        let replicator_a = Arc::new(Replicator::new(chain_a, miner_a, cfg, transport_a.clone()));
        let replicator_b = Arc::new(Replicator::new(chain_b, miner_b, cfg, transport_b.clone()));

        *transport_a.peer.lock().expect("lock") = Some(replicator_b.clone());
        *transport_b.peer.lock().expect("lock") = Some(replicator_a.clone());

        (replicator_a, replicator_b)
    }

    /// S1: two-node sync. Node A mines to height 5 before B ever connects;
    /// one `sync_request`/`sync_response` round trip brings B to the same
    /// height with the same head hash.
    #[test]
    fn two_node_sync_brings_follower_to_leader_height() {
        let kp_a = Secp256k1KeyPair::from_seed(&[41u8; 32]).unwrap();
        let kp_b = Secp256k1KeyPair::from_seed(&[42u8; 32]).unwrap();
        let cfg = ChainConfig::default();

        let genesis = staked_genesis(&kp_a, 1_000_000, 1_000);
        let chain_a = Arc::new(Chain::new(genesis.clone(), cfg.protocol.clone()).unwrap());
        let chain_b = Arc::new(Chain::new(genesis, cfg.protocol.clone()).unwrap());

        let mining_miner = Miner::new(Box::new(Secp256k1KeyPair::from_seed(&[41u8; 32]).unwrap()));
        let mempool = Mempool::new(cfg.mempool.clone());
        let mut now = 1_700_000_300i64;
        for _ in 0..5 {
            let block = mining_miner.try_mine_block(&chain_a, &mempool, now).expect("mines");
            chain_a.append(block).expect("appends");
            now += 1;
        }
        assert_eq!(chain_a.height(), 5);
        assert_eq!(chain_b.height(), 0);

        let miner_a = Miner::new(Box::new(Secp256k1KeyPair::from_seed(&[41u8; 32]).unwrap()));
        let miner_b = Miner::new(Box::new(kp_b));
        let (replicator_a, _replicator_b) = replicator_pair(chain_a.clone(), chain_b.clone(), miner_a, miner_b, &cfg);

        let req = SyncRequest { from_height: chain_b.height() + 1 };
        let bytes = serde_json::to_vec(&req).unwrap();
        replicator_a.handle_sync_request("node-b", &bytes);

        assert_eq!(chain_b.height(), 5);
        assert_eq!(chain_b.last_block().hash, chain_a.last_block().hash);
    }

    /// S2: transaction propagation. A submits a transfer; before the next
    /// block both mempools hold it; after A mines, both mempools are empty
    /// and B's balance reflects the transfer.
    #[test]
    fn transaction_propagates_and_clears_on_next_block() {
        let kp_a = Secp256k1KeyPair::from_seed(&[51u8; 32]).unwrap();
        let kp_b = Secp256k1KeyPair::from_seed(&[52u8; 32]).unwrap();
        let cfg = ChainConfig::default();

        let genesis = staked_genesis(&kp_a, 1_000_000, 1_000);
        let chain_a = Arc::new(Chain::new(genesis.clone(), cfg.protocol.clone()).unwrap());
        let chain_b = Arc::new(Chain::new(genesis, cfg.protocol.clone()).unwrap());

        let miner_a = Miner::new(Box::new(Secp256k1KeyPair::from_seed(&[51u8; 32]).unwrap()));
        miner_a.start_mining();
        let miner_b = Miner::new(Box::new(Secp256k1KeyPair::from_seed(&[53u8; 32]).unwrap()));
        let (replicator_a, replicator_b) = replicator_pair(chain_a.clone(), chain_b.clone(), miner_a, miner_b, &cfg);

        let mut tx = Transaction {
            id: String::new(),
            from: kp_a.address(),
            to: kp_b.address(),
            amount: 50_000,
            fee: 5,
            timestamp: 1_700_000_300,
            signature: String::new(),
            public_key: String::new(),
            nonce: 1,
            data: String::new(),
        };
        tx.sign(&kp_a).unwrap();
        let tx_id = tx.id.clone();

        replicator_a.submit_transaction(tx).expect("a admits its own transaction");
        assert!(replicator_a.mempool_contains(&tx_id));
        assert!(replicator_b.mempool_contains(&tx_id));

        replicator_a.try_mine_once(1_700_000_301);

        assert_eq!(chain_a.height(), 1);
        assert_eq!(chain_b.height(), 1);
        assert!(!replicator_a.mempool_contains(&tx_id));
        assert!(!replicator_b.mempool_contains(&tx_id));
        assert_eq!(chain_b.balance(kp_b.address().as_str()), 50_000);
    }
}

fn pick_random(candidates: &[String], count: usize) -> Vec<String> {
    use rand::seq::SliceRandom;
    let mut rng = rand::thread_rng();
    let mut pool = candidates.to_vec();
    pool.shuffle(&mut rng);
    pool.truncate(count);
    pool
}

/// Spawns the miner timer (ticking four times per `BlockTime`, §4.7), the
/// gossip cache sweeper (§4.8, §5), and the peer-maintenance interval
/// (§4.9, §5), all cancelled cooperatively via `cancel`.
pub fn spawn_background_tasks(replicator: Arc<Replicator>, block_time: Duration, sweep_interval: Duration, mut cancel: watch::Receiver<bool>) {
    let miner_replicator = replicator.clone();
    let mut miner_cancel = cancel.clone();
    let tick = (block_time / 4).max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    miner_replicator.try_mine_once(now_secs());
                }
                _ = miner_cancel.changed() => {
                    if *miner_cancel.borrow() { break; }
                }
            }
        }
    });

    let peer_replicator = replicator.clone();
    let mut peer_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(block_time);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    peer_replicator.maintain_peers(now_secs());
                }
                _ = peer_cancel.changed() => {
                    if *peer_cancel.borrow() { break; }
                }
            }
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    replicator.sweep_gossip_cache(now_secs());
                }
                _ = cancel.changed() => {
                    if *cancel.borrow() { break; }
                }
            }
        }
    });
}
