//! Canonical serialization for hashing, signing, and the wire (§4.1).
//!
//! One canonical JSON encoding is used everywhere a stable byte
//! representation is needed. Field order is fixed by the declaration order
//! of the `*SignView` structs below (`serde_json` preserves struct-field
//! order), not by the caller. Hashing a header omits `signature`; hashing a
//! transaction omits `id` and `signature` — the same view is reused for
//! both the transaction's signing bytes and its `id`, since the spec
//! defines `id` as the hash of exactly those bytes.

use serde::Serialize;

use crate::types::hash::Hash256;
use crate::types::tx::Transaction;
use crate::types::block::BlockHeader;

/// View of a [`Transaction`] with `id` and `signature` omitted, used both
/// as the bytes a keypair signs and as the preimage of `tx.id`.
#[derive(Serialize)]
struct TxSignView<'a> {
    from: &'a str,
    to: &'a str,
    amount: u64,
    fee: u64,
    timestamp: i64,
    public_key: &'a str,
    nonce: u64,
    data: &'a str,
}

/// Returns the canonical bytes a [`Transaction`] is signed over and hashed
/// from (everything except `id` and `signature`).
pub fn tx_sign_bytes(tx: &Transaction) -> Vec<u8> {
    let view = TxSignView {
        from: tx.from.as_str(),
        to: tx.to.as_str(),
        amount: tx.amount,
        fee: tx.fee,
        timestamp: tx.timestamp,
        public_key: &tx.public_key,
        nonce: tx.nonce,
        data: &tx.data,
    };
    serde_json::to_vec(&view).expect("TxSignView is always serializable")
}

/// Computes `tx.id` (or, equivalently, the hash used by `Verify`) from the
/// canonical signing bytes.
pub fn tx_hash(tx: &Transaction) -> Hash256 {
    Hash256::compute(&tx_sign_bytes(tx))
}

/// View of a [`BlockHeader`] with `signature` omitted, used both as the
/// bytes a validator signs and as the preimage of the block hash.
#[derive(Serialize)]
struct HeaderSignView<'a> {
    version: u32,
    height: u64,
    timestamp: i64,
    previous_hash: &'a str,
    merkle_root: &'a str,
    validator_addr: &'a str,
    public_key: &'a str,
    nonce: u64,
    checkpoint_hash: &'a Option<String>,
    checkpoint_height: &'a Option<u64>,
}

/// Returns the canonical bytes a [`BlockHeader`] is signed over.
pub fn header_sign_bytes(header: &BlockHeader) -> Vec<u8> {
    let view = HeaderSignView {
        version: header.version,
        height: header.height,
        timestamp: header.timestamp,
        previous_hash: &header.previous_hash,
        merkle_root: &header.merkle_root,
        validator_addr: header.validator_addr.as_str(),
        public_key: &header.public_key,
        nonce: header.nonce,
        checkpoint_hash: &header.checkpoint_hash,
        checkpoint_height: &header.checkpoint_height,
    };
    serde_json::to_vec(&view).expect("HeaderSignView is always serializable")
}

/// Computes the block hash: `SHA256(canonical_json(header without signature))`.
pub fn header_hash(header: &BlockHeader) -> Hash256 {
    Hash256::compute(&header_sign_bytes(header))
}

/// Computes `tx.Hash = SHA256(serialize(tx))`, including the signature —
/// the leaf hash used for the block's merkle root (§3 BlockHeader).
pub fn tx_merkle_leaf(tx: &Transaction) -> Hash256 {
    #[derive(Serialize)]
    struct FullTxView<'a> {
        id: &'a str,
        from: &'a str,
        to: &'a str,
        amount: u64,
        fee: u64,
        timestamp: i64,
        signature: &'a str,
        public_key: &'a str,
        nonce: u64,
        data: &'a str,
    }
    let view = FullTxView {
        id: &tx.id,
        from: tx.from.as_str(),
        to: tx.to.as_str(),
        amount: tx.amount,
        fee: tx.fee,
        timestamp: tx.timestamp,
        signature: &tx.signature,
        public_key: &tx.public_key,
        nonce: tx.nonce,
        data: &tx.data,
    };
    let bytes = serde_json::to_vec(&view).expect("FullTxView is always serializable");
    Hash256::compute(&bytes)
}

/// Computes the merkle root over an ordered list of transaction leaf
/// hashes, duplicating the last leaf at any level with odd length.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::compute(&[]);
    }
    let mut level: Vec<Hash256> = leaves.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().expect("level is non-empty"));
        }
        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            let mut bytes = Vec::with_capacity(HASH_LEN_X2);
            bytes.extend_from_slice(pair[0].as_bytes());
            bytes.extend_from_slice(pair[1].as_bytes());
            next.push(Hash256::compute(&bytes));
        }
        level = next;
    }
    level[0]
}

const HASH_LEN_X2: usize = crate::types::hash::HASH_LEN * 2;
