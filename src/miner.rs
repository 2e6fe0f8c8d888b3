//! PoS leader/miner loop (§4.7).
//!
//! `Miner` owns no locks of its own; each `try_mine_block` call takes a
//! point-in-time read of [`Chain`] and [`Mempool`] and either returns a
//! fully signed, locally validated block or a reason it declined.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::chain::Chain;
use crate::crypto::KeyPair;
use crate::error::MineError;
use crate::mempool::Mempool;
use crate::selector;
use crate::types::{Block, BlockHeader, Transaction};

/// Idle/mining state machine plus the identity this node mines as (§4.7).
pub struct Miner {
    keypair: Box<dyn KeyPair + Send + Sync>,
    mining: AtomicBool,
}

impl Miner {
    pub fn new(keypair: Box<dyn KeyPair + Send + Sync>) -> Self {
        Self {
            keypair,
            mining: AtomicBool::new(false),
        }
    }

    pub fn start_mining(&self) {
        self.mining.store(true, Ordering::SeqCst);
    }

    pub fn stop_mining(&self) {
        self.mining.store(false, Ordering::SeqCst);
    }

    pub fn is_mining(&self) -> bool {
        self.mining.load(Ordering::SeqCst)
    }

    pub fn address(&self) -> crate::types::Address {
        self.keypair.address()
    }

    /// Attempts to mine one block on top of the chain's current head
    /// (§4.7): stake check, leader-rank check, inter-block spacing check,
    /// then block assembly, signing, and local validation.
    pub fn try_mine_block(&self, chain: &Chain, mempool: &Mempool, now: i64) -> Result<Block, MineError> {
        let address = self.keypair.address();
        let config = chain.config();

        if chain.stake(address.as_str()) < config.min_validator_stake {
            return Err(MineError::InsufficientStake);
        }

        let validators = chain.validators();
        if validators.is_empty() {
            return Err(MineError::NoValidators);
        }
        let parent = chain.last_block();
        let ranked = selector::rank(&parent.hash, &validators);
        if ranked[0].address != address {
            return Err(MineError::NotMyTurn);
        }

        if now - parent.header.timestamp < config.block_time.as_secs() as i64 {
            return Err(MineError::TooSoon);
        }

        let height = parent.header.height + 1;
        let coinbase = Transaction::new_coinbase(address.clone(), config.block_reward, height, now);

        let state = chain.snapshot_state();
        let mut transactions = vec![coinbase];
        transactions.extend(mempool.select_valid_for_block(&state, config.max_block_size.saturating_sub(1)));

        let merkle_root = Block::compute_merkle_root(&transactions);
        let header = BlockHeader {
            version: 1,
            height,
            timestamp: now,
            previous_hash: parent.hash.clone(),
            merkle_root,
            validator_addr: address,
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
        block
            .sign(self.keypair.as_ref())
            .map_err(|_| MineError::BlockAssemblyFailed)?;

        block
            .validate_standalone(now)
            .map_err(|_| MineError::BlockAssemblyFailed)?;
        block
            .validate_against_parent(&parent, Some(config.min_block_gap_secs()))
            .map_err(|_| MineError::TooSoon)?;

        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::config::ProtocolConfig;
    use crate::crypto::Secp256k1KeyPair;
    use crate::mempool::Mempool;
    use crate::config::MempoolConfig;
    use crate::types::Address;

    fn genesis() -> Block {
        let coinbase = Transaction::new_coinbase(Address("00".repeat(32)), 0, 0, 1_700_000_000);
        let merkle_root = Block::compute_merkle_root(std::slice::from_ref(&coinbase));
        let header = BlockHeader {
            version: 1,
            height: 0,
            timestamp: 1_700_000_000,
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
            transactions: vec![coinbase],
            hash: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    #[test]
    fn start_and_stop_mining_toggles_state() {
        let kp = Secp256k1KeyPair::from_seed(&[7u8; 32]).unwrap();
        let miner = Miner::new(Box::new(kp));
        assert!(!miner.is_mining());
        miner.start_mining();
        assert!(miner.is_mining());
        miner.stop_mining();
        assert!(!miner.is_mining());
    }

    #[test]
    fn try_mine_block_declines_without_stake() {
        let kp = Secp256k1KeyPair::from_seed(&[8u8; 32]).unwrap();
        let genesis = genesis();
        let mut cfg = ProtocolConfig::default();
        cfg.enforce_min_block_spacing = false;
        let chain = Chain::new(genesis, cfg).unwrap();
        let mempool = Mempool::new(MempoolConfig::default());
        let miner = Miner::new(Box::new(kp));

        assert_eq!(
            miner.try_mine_block(&chain, &mempool, 2_000_000_000),
            Err(MineError::InsufficientStake)
        );
    }
}
