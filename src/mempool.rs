//! Bounded pending-transaction pool (§4.5).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::MempoolConfig;
use crate::error::MempoolError;
use crate::state::State;
use crate::types::Transaction;

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Aggregate mempool statistics (§4.5 `Stats`).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MempoolStats {
    pub size: usize,
    pub unique_senders: usize,
    pub min_fee: u64,
    pub avg_fee: f64,
    pub max_fee: u64,
    pub total_fees: u64,
}

/// Bounded pool of pending signed transactions, indexed by id and by
/// sender (sorted by nonce ascending).
#[derive(Default)]
pub struct Mempool {
    config: MempoolConfig,
    by_id: HashMap<String, Transaction>,
    /// sender -> tx ids, kept sorted by nonce ascending.
    by_sender: HashMap<String, Vec<String>>,
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            config,
            by_id: HashMap::new(),
            by_sender: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    fn sender_bucket_sorted_insert(&mut self, sender: String, tx: &Transaction) {
        let bucket = self.by_sender.entry(sender).or_default();
        let pos = bucket
            .iter()
            .position(|id| self.by_id.get(id).map(|t| t.nonce).unwrap_or(u64::MAX) > tx.nonce)
            .unwrap_or(bucket.len());
        bucket.insert(pos, tx.id.clone());
    }

    /// Admits a transaction per §4.5: validates, rejects duplicates and
    /// too-low fees, evicts the single lowest-fee entry if the pool is full
    /// and the incoming fee is strictly higher, enforces the per-sender
    /// cap, then inserts keeping the sender bucket nonce-sorted.
    pub fn admit(&mut self, tx: Transaction) -> Result<(), MempoolError> {
        tx.validate(now_secs())?;

        if self.by_id.contains_key(&tx.id) {
            return Err(MempoolError::DuplicateTransaction);
        }
        if tx.fee < self.config.min_fee {
            return Err(MempoolError::FeeTooLow);
        }

        if self.by_id.len() >= self.config.max_size {
            let lowest = self
                .by_id
                .values()
                .min_by_key(|t| t.fee)
                .map(|t| (t.id.clone(), t.fee));
            match lowest {
                Some((id, fee)) if fee < tx.fee => {
                    self.remove(&[id]);
                }
                _ => return Err(MempoolError::MempoolFull),
            }
        }

        let sender_count = self
            .by_sender
            .get(tx.from.as_str())
            .map(|b| b.len())
            .unwrap_or(0);
        if sender_count >= self.config.max_tx_per_address {
            return Err(MempoolError::AddressQuota);
        }

        let sender = tx.from.as_str().to_string();
        self.sender_bucket_sorted_insert(sender, &tx);
        self.by_id.insert(tx.id.clone(), tx);
        Ok(())
    }

    /// Removes transactions by id from both indexes, cleaning up any
    /// now-empty sender bucket.
    pub fn remove(&mut self, ids: &[String]) {
        for id in ids {
            if let Some(tx) = self.by_id.remove(id) {
                if let Some(bucket) = self.by_sender.get_mut(tx.from.as_str()) {
                    bucket.retain(|bid| bid != id);
                    if bucket.is_empty() {
                        self.by_sender.remove(tx.from.as_str());
                    }
                }
            }
        }
    }

    /// Selects a nonce-contiguous, dry-run-valid prefix per sender, then
    /// sorts the combined result by fee descending (§4.5).
    pub fn select_valid_for_block(&self, state: &State, max_count: usize) -> Vec<Transaction> {
        let now = now_secs();
        let mut selected = Vec::new();

        for ids in self.by_sender.values() {
            let mut expected = state.nonce(
                ids.first()
                    .and_then(|id| self.by_id.get(id))
                    .map(|t| t.from.as_str())
                    .unwrap_or(""),
            );
            for id in ids {
                let tx = match self.by_id.get(id) {
                    Some(tx) => tx,
                    None => break,
                };
                if tx.nonce != expected {
                    break;
                }
                if state.dry_run(tx, now).is_err() {
                    break;
                }
                selected.push(tx.clone());
                expected += 1;
            }
        }

        selected.sort_by(|a, b| b.fee.cmp(&a.fee));
        selected.truncate(max_count);
        selected
    }

    /// Drops transactions older than `MaxTxAge` (§4.5).
    pub fn prune_expired(&mut self) {
        let now = now_secs();
        let max_age = self.config.max_tx_age.as_secs() as i64;
        let expired: Vec<String> = self
            .by_id
            .values()
            .filter(|tx| now - tx.timestamp > max_age)
            .map(|tx| tx.id.clone())
            .collect();
        self.remove(&expired);
    }

    pub fn stats(&self) -> MempoolStats {
        if self.by_id.is_empty() {
            return MempoolStats::default();
        }
        let fees: Vec<u64> = self.by_id.values().map(|tx| tx.fee).collect();
        let total: u64 = fees.iter().sum();
        MempoolStats {
            size: self.by_id.len(),
            unique_senders: self.by_sender.len(),
            min_fee: *fees.iter().min().unwrap(),
            max_fee: *fees.iter().max().unwrap(),
            avg_fee: total as f64 / fees.len() as f64,
            total_fees: total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KeyPair, Secp256k1KeyPair};
    use crate::types::Address;

    fn signed_tx(seed: u8, nonce: u64, fee: u64, amount: u64) -> Transaction {
        let kp = Secp256k1KeyPair::from_seed(&[seed; 32]).unwrap();
        let mut tx = Transaction {
            id: String::new(),
            from: kp.address(),
            to: Address("bob-recipient-address-padded-to-length-ok".to_string()),
            amount,
            fee,
            timestamp: now_secs(),
            signature: String::new(),
            public_key: String::new(),
            nonce,
            data: String::new(),
        };
        tx.sign(&kp).unwrap();
        tx
    }

    #[test]
    fn admit_rejects_duplicate() {
        let mut mp = Mempool::new(MempoolConfig::default());
        let tx = signed_tx(1, 0, 5, 10);
        mp.admit(tx.clone()).unwrap();
        assert_eq!(mp.admit(tx), Err(MempoolError::DuplicateTransaction));
    }

    #[test]
    fn admit_rejects_fee_below_minimum() {
        let mut mp = Mempool::new(MempoolConfig::default());
        let tx = signed_tx(2, 0, 0, 10);
        assert_eq!(mp.admit(tx), Err(MempoolError::FeeTooLow));
    }

    #[test]
    fn select_valid_for_block_is_nonce_contiguous_and_fee_sorted() {
        let mut mp = Mempool::new(MempoolConfig::default());
        let state = State::new();

        let tx0 = signed_tx(3, 0, 5, 10);
        let tx1 = signed_tx(3, 1, 20, 10);
        let tx_gap = signed_tx(3, 3, 100, 10);
        mp.admit(tx0.clone()).unwrap();
        mp.admit(tx1.clone()).unwrap();
        mp.admit(tx_gap).unwrap();

        let selected = mp.select_valid_for_block(&state, 10);
        // both admitted senders have 0 balance, so dry-run fails for every
        // tx against an empty state: nothing should be selected.
        assert!(selected.is_empty());
    }

    #[test]
    fn remove_cleans_empty_sender_bucket() {
        let mut mp = Mempool::new(MempoolConfig::default());
        let tx = signed_tx(4, 0, 5, 10);
        let id = tx.id.clone();
        mp.admit(tx).unwrap();
        mp.remove(&[id]);
        assert!(mp.is_empty());
        assert!(mp.by_sender.is_empty());
    }
}
