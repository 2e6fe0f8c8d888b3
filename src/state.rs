//! In-memory key-value state with per-block deltas and checkpointing (§3,
//! §4.3).
//!
//! Keys are prefixed strings (`wallet-<addr>`, `stake-<addr>`,
//! `nonce-<addr>`); any unseen key defaults to 0. State is derived, never
//! primary truth: replaying blocks 0..H from genesis must reproduce it
//! byte-for-byte, which is why every mutation is driven through
//! [`State::apply_block`] rather than ad hoc writes.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::error::TxError;
use crate::types::{Address, Block, Intent, Transaction};

fn wallet_key(addr: &str) -> String {
    format!("wallet-{addr}")
}
fn stake_key(addr: &str) -> String {
    format!("stake-{addr}")
}
fn nonce_key(addr: &str) -> String {
    format!("nonce-{addr}")
}

/// The set of keys whose value changed as a result of applying one block,
/// paired with their pre-block values so the delta is reversible.
#[derive(Clone, Debug, Default)]
pub struct Delta {
    /// key -> (old_value, new_value)
    pub changes: BTreeMap<String, (u64, u64)>,
}

impl Delta {
    fn record(&mut self, key: String, old: u64, new: u64) {
        self.changes
            .entry(key)
            .and_modify(|(_, cur_new)| *cur_new = new)
            .or_insert((old, new));
    }
}

/// Logical `key -> u64` map plus the history of per-block deltas needed to
/// reconstruct any prior state or roll back (§3).
#[derive(Clone, Debug, Default)]
pub struct State {
    values: BTreeMap<String, u64>,
    /// Deltas keyed by block hash, in application order.
    deltas: Vec<(String, Delta)>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &str) -> u64 {
        self.values.get(key).copied().unwrap_or(0)
    }

    pub fn balance(&self, addr: &str) -> u64 {
        self.get(&wallet_key(addr))
    }
    pub fn stake(&self, addr: &str) -> u64 {
        self.get(&stake_key(addr))
    }
    pub fn nonce(&self, addr: &str) -> u64 {
        self.get(&nonce_key(addr))
    }

    /// Every address with `stake > 0`, optionally filtered by a minimum
    /// stake (§3 ValidatorSet, filtered to `MinValidatorStake` when used
    /// for consensus).
    pub fn validators(&self, min_stake: u64) -> Vec<(Address, u64)> {
        self.values
            .iter()
            .filter_map(|(key, value)| {
                let addr = key.strip_prefix("stake-")?;
                if *value >= min_stake && *value > 0 {
                    Some((Address(addr.to_string()), *value))
                } else {
                    None
                }
            })
            .collect()
    }

    fn set(&mut self, delta: &mut Delta, key: String, new: u64) {
        let old = self.get(&key);
        if old == new {
            return;
        }
        delta.record(key.clone(), old, new);
        self.values.insert(key, new);
    }

    /// Executes one transaction against a working copy of state, returning
    /// the keys it touched or a typed rejection (§4.3).
    ///
    /// Order of checks for non-coinbase: `Validate`, nonce match, balance
    /// sufficiency, intent parsing, then application + nonce increment.
    fn execute_tx(&mut self, tx: &Transaction, delta: &mut Delta, now: i64) -> Result<(), TxError> {
        if tx.from.is_coinbase() {
            let key = wallet_key(tx.to.as_str());
            let new = self.get(&key) + tx.amount;
            self.set(delta, key, new);
            return Ok(());
        }

        tx.validate(now)?;

        if self.nonce(tx.from.as_str()) != tx.nonce {
            return Err(TxError::InvalidNonce);
        }

        let balance = self.balance(tx.from.as_str());
        if balance < tx.amount.saturating_add(tx.fee) {
            return Err(TxError::InsufficientBalance);
        }

        let intent = tx.intent()?;

        match intent {
            Intent::Stake => {
                let bal_key = wallet_key(tx.from.as_str());
                let stake_key_ = stake_key(tx.from.as_str());
                let new_balance = balance - tx.amount - tx.fee;
                let new_stake = self.stake(tx.from.as_str()) + tx.amount;
                self.set(delta, bal_key, new_balance);
                self.set(delta, stake_key_, new_stake);
            }
            Intent::Unstake => {
                let current_stake = self.stake(tx.from.as_str());
                if current_stake < tx.amount {
                    return Err(TxError::InsufficientStake);
                }
                let bal_key = wallet_key(tx.from.as_str());
                let stake_key_ = stake_key(tx.from.as_str());
                let new_balance = balance - tx.fee + tx.amount;
                let new_stake = current_stake - tx.amount;
                self.set(delta, bal_key, new_balance);
                self.set(delta, stake_key_, new_stake);
            }
            Intent::Transfer => {
                let from_key = wallet_key(tx.from.as_str());
                let to_key = wallet_key(tx.to.as_str());
                let new_from = balance - tx.amount - tx.fee;
                let new_to = self.balance(tx.to.as_str()) + tx.amount;
                self.set(delta, from_key, new_from);
                self.set(delta, to_key, new_to);
            }
        }

        let nonce_key_ = nonce_key(tx.from.as_str());
        let new_nonce = self.nonce(tx.from.as_str()) + 1;
        self.set(delta, nonce_key_, new_nonce);

        Ok(())
    }

    /// Dry-runs one transaction against a cloned snapshot, discarding the
    /// result. Used by the mempool's `SelectValidForBlock` (§4.5).
    pub fn dry_run(&self, tx: &Transaction, now: i64) -> Result<(), TxError> {
        let mut working = self.clone();
        let mut delta = Delta::default();
        working.execute_tx(tx, &mut delta, now)
    }

    /// Executes every transaction in `block` in order against a working
    /// copy of state; any failure aborts the whole block (atomic at block
    /// granularity, §4.3). On success, records the delta keyed by
    /// `block.hash` and commits the working copy.
    pub fn apply_block(&mut self, block: &Block, now: i64) -> Result<(), TxError> {
        let mut working = self.clone();
        let mut delta = Delta::default();
        for tx in &block.transactions {
            working.execute_tx(tx, &mut delta, now)?;
        }
        *self = working;
        self.deltas.push((block.hash.clone(), delta));
        Ok(())
    }

    /// Returns the full `{address: (balance, stake, nonce)}` snapshot,
    /// sorted ascending by address, for checkpointing.
    pub fn snapshot(&self) -> Vec<(String, u64, u64, u64)> {
        let mut addrs = std::collections::BTreeSet::new();
        for key in self.values.keys() {
            if let Some(addr) = key
                .strip_prefix("wallet-")
                .or_else(|| key.strip_prefix("stake-"))
                .or_else(|| key.strip_prefix("nonce-"))
            {
                addrs.insert(addr.to_string());
            }
        }
        addrs
            .into_iter()
            .map(|addr| {
                (
                    addr.clone(),
                    self.balance(&addr),
                    self.stake(&addr),
                    self.nonce(&addr),
                )
            })
            .collect()
    }

    pub fn delta_for(&self, block_hash: &str) -> Option<&Delta> {
        self.deltas
            .iter()
            .find(|(hash, _)| hash == block_hash)
            .map(|(_, d)| d)
    }
}

/// Full state snapshot at a given height, plus its deterministic hash
/// (§3, §6).
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub height: u64,
    pub timestamp: i64,
    /// `(address, balance, stake, nonce)`, sorted ascending by address.
    pub snapshot: Vec<(String, u64, u64, u64)>,
    pub hash: String,
}

impl Checkpoint {
    /// Builds a checkpoint from `state` at `height`/`timestamp`, computing
    /// the normative CSV hash (§6).
    pub fn build(state: &State, height: u64, timestamp: i64) -> Self {
        let snapshot = state.snapshot();
        let csv = Self::to_csv(&snapshot);
        let hash = hex::encode(Sha256::digest(csv.as_bytes()));
        Checkpoint {
            height,
            timestamp,
            snapshot,
            hash,
        }
    }

    /// Renders the snapshot as newline-terminated CSV rows
    /// `address,balance,stake,nonce`, sorted ascending by address.
    pub fn to_csv(snapshot: &[(String, u64, u64, u64)]) -> String {
        let mut rows: Vec<_> = snapshot.to_vec();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        let mut csv = String::new();
        for (addr, balance, stake, nonce) in rows {
            csv.push_str(&format!("{addr},{balance},{stake},{nonce}\n"));
        }
        csv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, BlockHeader};

    fn coinbase_block(height: u64, to: &str, amount: u64, prev_hash: &str) -> Block {
        let coinbase = Transaction::new_coinbase(Address(to.to_string()), amount, height, 1_700_000_000);
        let merkle_root = Block::compute_merkle_root(std::slice::from_ref(&coinbase));
        let header = BlockHeader {
            version: 1,
            height,
            timestamp: 1_700_000_000,
            previous_hash: prev_hash.to_string(),
            merkle_root,
            validator_addr: Address(to.to_string()),
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
    fn coinbase_credits_recipient() {
        let mut state = State::new();
        let block = coinbase_block(0, "alice", 1000, "");
        state.apply_block(&block, 2_000_000_000).unwrap();
        assert_eq!(state.balance("alice"), 1000);
    }

    #[test]
    fn replay_from_genesis_reproduces_state() {
        let mut state = State::new();
        let b0 = coinbase_block(0, "alice", 1000, "");
        state.apply_block(&b0, 2_000_000_000).unwrap();
        let b1 = coinbase_block(1, "alice", 500, &b0.hash);
        state.apply_block(&b1, 2_000_000_000).unwrap();

        let mut replay = State::new();
        replay.apply_block(&b0, 2_000_000_000).unwrap();
        replay.apply_block(&b1, 2_000_000_000).unwrap();

        assert_eq!(state.balance("alice"), replay.balance("alice"));
        assert_eq!(state.balance("alice"), 1500);
    }

    #[test]
    fn checkpoint_csv_is_sorted_ascending_by_address() {
        let mut state = State::new();
        let b0 = coinbase_block(0, "bob", 10, "");
        state.apply_block(&b0, 2_000_000_000).unwrap();
        let b1 = coinbase_block(1, "alice", 20, &b0.hash);
        state.apply_block(&b1, 2_000_000_000).unwrap();

        let checkpoint = Checkpoint::build(&state, 1, 1_700_000_000);
        let csv = Checkpoint::to_csv(&checkpoint.snapshot);
        let alice_pos = csv.find("alice").unwrap();
        let bob_pos = csv.find("bob").unwrap();
        assert!(alice_pos < bob_pos);
    }

    #[test]
    fn failed_block_does_not_mutate_state() {
        let mut state = State::new();
        let b0 = coinbase_block(0, "alice", 1000, "");
        state.apply_block(&b0, 2_000_000_000).unwrap();

        let kp = crate::crypto::Secp256k1KeyPair::from_seed(&[9u8; 32]).unwrap();
        let mut bad_tx = Transaction {
            id: String::new(),
            from: kp.address(),
            to: Address("somewhere".to_string()),
            amount: 999_999,
            fee: 1,
            timestamp: 1_700_000_000,
            signature: String::new(),
            public_key: String::new(),
            nonce: 0,
            data: String::new(),
        };
        {
            use crate::crypto::KeyPair;
            bad_tx.sign(&kp).unwrap();
        }

        let coinbase = Transaction::new_coinbase(Address("alice".to_string()), 10, 1, 1_700_000_001);
        let txs = vec![coinbase, bad_tx];
        let merkle_root = Block::compute_merkle_root(&txs);
        let header = BlockHeader {
            version: 1,
            height: 1,
            timestamp: 1_700_000_001,
            previous_hash: b0.hash.clone(),
            merkle_root,
            validator_addr: Address("alice".to_string()),
            signature: String::new(),
            public_key: String::new(),
            nonce: 0,
            checkpoint_hash: None,
            checkpoint_height: None,
        };
        let mut block = Block { header, transactions: txs, hash: String::new() };
        block.hash = block.compute_hash();

        let before = state.balance("alice");
        assert!(state.apply_block(&block, 2_000_000_000).is_err());
        assert_eq!(state.balance("alice"), before);
    }
}
