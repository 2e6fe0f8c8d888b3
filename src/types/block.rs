//! Block and header types (§3, §4.4 hashing/validation helpers).

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::crypto::{verify, KeyPair};
use crate::error::BlockError;
use crate::types::hash::Address;
use crate::types::tx::Transaction;

/// Block header (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub height: u64,
    /// Unix seconds.
    pub timestamp: i64,
    /// Hex hash of the parent block; empty for genesis.
    pub previous_hash: String,
    /// Hex SHA-256 merkle root over transaction leaf hashes.
    pub merkle_root: String,
    pub validator_addr: Address,
    /// Hex, 64 bytes r||s. Empty for genesis.
    pub signature: String,
    /// Hex, 64 bytes x||y. Empty for genesis.
    pub public_key: String,
    pub nonce: u64,
    pub checkpoint_hash: Option<String>,
    pub checkpoint_height: Option<u64>,
}

/// Block: header + ordered transaction list + producer-assigned hash (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    /// `SHA256(canonical_json(header without signature))`, set by the
    /// producer at mint time.
    pub hash: String,
}

impl Block {
    /// Recomputes the merkle root over `transactions`' full-record leaf
    /// hashes (§3: `tx.Hash = SHA256(serialize(tx))`, signature included).
    pub fn compute_merkle_root(transactions: &[Transaction]) -> String {
        let leaves: Vec<_> = transactions.iter().map(codec::tx_merkle_leaf).collect();
        codec::merkle_root(&leaves).to_hex()
    }

    /// Computes the block hash from the current header.
    pub fn compute_hash(&self) -> String {
        codec::header_hash(&self.header).to_hex()
    }

    /// Signs the header (sets `public_key`, `signature`) and recomputes
    /// `hash` from the now-complete header.
    pub fn sign(&mut self, keypair: &dyn KeyPair) -> Result<(), BlockError> {
        if self.header.validator_addr != keypair.address() {
            return Err(BlockError::InvalidSignature);
        }
        self.header.public_key = keypair.public_key_hex();
        let sign_bytes = codec::header_sign_bytes(&self.header);
        self.header.signature = keypair.sign(&sign_bytes).to_hex();
        self.hash = self.compute_hash();
        Ok(())
    }

    /// Verifies the header signature against `validator_addr` (§9 Open
    /// Question, resolved: enforce it).
    fn verify_signature(&self) -> Result<(), BlockError> {
        if self.header.height == 0 {
            // Genesis carries no producer signature.
            return Ok(());
        }
        let pub_bytes =
            hex::decode(&self.header.public_key).map_err(|_| BlockError::InvalidSignature)?;
        let expected_addr = Address::from_public_key(&pub_bytes);
        if expected_addr != self.header.validator_addr {
            return Err(BlockError::InvalidSignature);
        }
        let sign_bytes = codec::header_sign_bytes(&self.header);
        if !verify(&pub_bytes, &sign_bytes, &self.header.signature) {
            return Err(BlockError::InvalidSignature);
        }
        Ok(())
    }

    /// Structural self-validation, independent of chain position:
    /// hash matches, merkle root matches, coinbase shape, no duplicate ids,
    /// signature verifies (§3 invariants).
    pub fn validate_standalone(&self, now: i64) -> Result<(), BlockError> {
        if self.compute_hash() != self.hash {
            return Err(BlockError::InvalidHash);
        }

        if self.transactions.is_empty() || !self.transactions[0].from.is_coinbase() {
            return Err(BlockError::MissingCoinbase);
        }
        if self.transactions[1..]
            .iter()
            .any(|tx| tx.from.is_coinbase())
        {
            return Err(BlockError::ExtraCoinbase);
        }
        self.transactions[0]
            .verify_coinbase(self.header.height)
            .map_err(BlockError::from)?;

        let mut seen = std::collections::HashSet::with_capacity(self.transactions.len());
        for tx in &self.transactions {
            if !seen.insert(tx.id.as_str()) {
                return Err(BlockError::DuplicateTransaction);
            }
        }
        for tx in &self.transactions[1..] {
            tx.validate(now).map_err(BlockError::from)?;
        }

        if Self::compute_merkle_root(&self.transactions) != self.header.merkle_root {
            return Err(BlockError::MerkleMismatch);
        }

        if self.header.height == 0 {
            if !self.header.previous_hash.is_empty() {
                return Err(BlockError::BlockLinkMismatch);
            }
        } else if self.header.previous_hash.is_empty() {
            return Err(BlockError::BlockLinkMismatch);
        }

        self.verify_signature()?;

        Ok(())
    }

    /// Validates this block against its claimed parent: height/link/time
    /// invariants (§3, §4.4). `min_gap_secs` is `0.8 × BlockTime` when the
    /// caller wants live spacing enforced (§9 Open Question, resolved: yes).
    pub fn validate_against_parent(
        &self,
        parent: &Block,
        min_gap_secs: Option<i64>,
    ) -> Result<(), BlockError> {
        if self.header.previous_hash != parent.hash {
            return Err(BlockError::BlockLinkMismatch);
        }
        if self.header.height != parent.header.height + 1 {
            return Err(BlockError::BlockHeightMismatch);
        }
        if self.header.timestamp < parent.header.timestamp {
            return Err(BlockError::TimestampOutOfRange);
        }
        if let Some(min_gap) = min_gap_secs {
            if self.header.timestamp - parent.header.timestamp < min_gap {
                return Err(BlockError::TooSoon);
            }
        }
        Ok(())
    }
}
