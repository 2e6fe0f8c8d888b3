//! Persistence adapter (§6).
//!
//! Blocks, block-hash lookups, checkpoints, and chain metadata are all
//! stored through a single byte-keyed [`Store`] trait, keeping the key
//! namespace in one place rather than spread across several typed column
//! families.

pub mod mem;
pub mod rocksdb;

pub use mem::InMemoryStore;
pub use rocksdb::{RocksDbStore, StorageError};

use crate::state::Checkpoint;
use crate::types::Block;

/// Byte-keyed persistence interface the core depends on (§6). All keys and
/// values are plain bytes; callers own encoding.
pub trait Store: Send + Sync {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn put(&self, key: &[u8], value: &[u8]);
    fn delete(&self, key: &[u8]);
    /// Returns all `(key, value)` pairs whose key starts with `prefix`.
    fn range_iterate(&self, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)>;
}

fn block_key(height: u64) -> Vec<u8> {
    format!("block-{height}").into_bytes()
}

fn block_hash_key(hash: &str) -> Vec<u8> {
    format!("block-hash-{hash}").into_bytes()
}

fn checkpoint_key(height: u64, part: &str) -> Vec<u8> {
    format!("checkpoint-{height}-{part}").into_bytes()
}

const METADATA_CHAIN_HEIGHT: &[u8] = b"metadata-chain-height";
const METADATA_LAST_CHECKPOINT: &[u8] = b"metadata-last-checkpoint";

/// Persists a block under `block-<height>` and `block-hash-<hash>`, and
/// advances `metadata-chain-height` if `block` extends the stored tip.
pub fn put_block(store: &dyn Store, block: &Block) {
    let bytes = serde_json::to_vec(block).expect("Block is always serializable");
    store.put(&block_key(block.header.height), &bytes);
    store.put(&block_hash_key(&block.hash), block.header.height.to_string().as_bytes());

    let current = chain_height(store).unwrap_or(0);
    if block.header.height >= current {
        store.put(METADATA_CHAIN_HEIGHT, block.header.height.to_string().as_bytes());
    }
}

pub fn get_block_by_height(store: &dyn Store, height: u64) -> Option<Block> {
    let bytes = store.get(&block_key(height))?;
    serde_json::from_slice(&bytes).ok()
}

pub fn get_block_by_hash(store: &dyn Store, hash: &str) -> Option<Block> {
    let height_bytes = store.get(&block_hash_key(hash))?;
    let height: u64 = String::from_utf8(height_bytes).ok()?.parse().ok()?;
    get_block_by_height(store, height)
}

pub fn chain_height(store: &dyn Store) -> Option<u64> {
    let bytes = store.get(METADATA_CHAIN_HEIGHT)?;
    String::from_utf8(bytes).ok()?.parse().ok()
}

pub fn last_checkpoint_height(store: &dyn Store) -> Option<u64> {
    let bytes = store.get(METADATA_LAST_CHECKPOINT)?;
    String::from_utf8(bytes).ok()?.parse().ok()
}

/// Writes the four `checkpoint-<H>-*` records and advances
/// `metadata-last-checkpoint`.
pub fn put_checkpoint(store: &dyn Store, checkpoint: &Checkpoint) {
    let csv = Checkpoint::to_csv(&checkpoint.snapshot);
    let metadata = format!("{},{}", checkpoint.height, checkpoint.timestamp);

    store.put(&checkpoint_key(checkpoint.height, "state"), csv.as_bytes());
    store.put(&checkpoint_key(checkpoint.height, "csv"), csv.as_bytes());
    store.put(&checkpoint_key(checkpoint.height, "hash"), checkpoint.hash.as_bytes());
    store.put(&checkpoint_key(checkpoint.height, "metadata"), metadata.as_bytes());
    store.put(METADATA_LAST_CHECKPOINT, checkpoint.height.to_string().as_bytes());
}

pub fn get_checkpoint_hash(store: &dyn Store, height: u64) -> Option<String> {
    let bytes = store.get(&checkpoint_key(height, "hash"))?;
    String::from_utf8(bytes).ok()
}

/// Deletes checkpoints older than the `retention`-th most recent one, and
/// any stored blocks below the oldest kept checkpoint (§6 pruning rules).
/// `checkpoint_heights` must be sorted ascending.
pub fn prune(store: &dyn Store, checkpoint_heights: &[u64], retention: usize) {
    if checkpoint_heights.len() <= retention {
        return;
    }
    let cutoff_index = checkpoint_heights.len() - retention;
    let (stale, kept) = checkpoint_heights.split_at(cutoff_index);
    for &height in stale {
        for part in ["state", "csv", "hash", "metadata"] {
            store.delete(&checkpoint_key(height, part));
        }
    }
    let oldest_kept = kept.first().copied().unwrap_or(0);
    for height in 0..oldest_kept {
        if let Some(block) = get_block_by_height(store, height) {
            store.delete(&block_hash_key(&block.hash));
        }
        store.delete(&block_key(height));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;
    use crate::types::{Address, Block, BlockHeader, Transaction};

    fn dummy_block(height: u64) -> Block {
        let coinbase = Transaction::new_coinbase(Address("addr".to_string()), 50, height, 1_700_000_000 + height as i64);
        let merkle_root = Block::compute_merkle_root(std::slice::from_ref(&coinbase));
        let header = BlockHeader {
            version: 1,
            height,
            timestamp: 1_700_000_000 + height as i64,
            previous_hash: "parent".to_string(),
            merkle_root,
            validator_addr: Address("addr".to_string()),
            signature: String::new(),
            public_key: String::new(),
            nonce: height,
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
    fn put_and_get_block_by_height_and_hash_roundtrip() {
        let store = InMemoryStore::new();
        let block = dummy_block(3);
        put_block(&store, &block);

        assert_eq!(get_block_by_height(&store, 3).unwrap().hash, block.hash);
        assert_eq!(get_block_by_hash(&store, &block.hash).unwrap().header.height, 3);
        assert_eq!(chain_height(&store), Some(3));
    }

    #[test]
    fn checkpoint_roundtrip_and_pruning() {
        let store = InMemoryStore::new();
        let state = State::new();
        for h in [5u64, 10, 15, 20] {
            let checkpoint = Checkpoint::build(&state, h, 1_700_000_000);
            put_checkpoint(&store, &checkpoint);
        }
        assert_eq!(last_checkpoint_height(&store), Some(20));

        prune(&store, &[5, 10, 15, 20], 2);
        assert!(get_checkpoint_hash(&store, 5).is_none());
        assert!(get_checkpoint_hash(&store, 10).is_none());
        assert!(get_checkpoint_hash(&store, 15).is_some());
        assert!(get_checkpoint_hash(&store, 20).is_some());
    }
}
