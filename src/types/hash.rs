//! Address and generic 32-byte hash types.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length in bytes of every fixed-size hash/address in this crate.
pub const HASH_LEN: usize = 32;

/// Strongly-typed 256-bit hash wrapper (SHA-256).
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// Computes a new [`Hash256`] as the SHA-256 digest of `data`.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut bytes = [0u8; HASH_LEN];
        bytes.copy_from_slice(&digest);
        Hash256(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != HASH_LEN {
            return None;
        }
        let mut arr = [0u8; HASH_LEN];
        arr.copy_from_slice(&bytes);
        Some(Hash256(arr))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Account address: `SHA256(pub_x32 || pub_y32)`, rendered as lowercase hex.
///
/// Unlike [`Hash256`], an `Address` may be empty (the coinbase `from`
/// field), so it is backed by a `String` rather than a fixed-size array.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    /// The sentinel address used for `Transaction.from` on coinbase
    /// transactions.
    pub const COINBASE_FROM: &'static str = "";

    /// Derives an address from the 64-byte `x || y` public key encoding.
    pub fn from_public_key(pub_xy: &[u8]) -> Self {
        Address(Hash256::compute(pub_xy).to_hex())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_coinbase(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_deterministic_sha256_of_xy() {
        let xy = [7u8; 64];
        let a1 = Address::from_public_key(&xy);
        let a2 = Address::from_public_key(&xy);
        assert_eq!(a1, a2);
        assert_eq!(a1.as_str().len(), 64);

        let expected = Hash256::compute(&xy).to_hex();
        assert_eq!(a1.as_str(), expected);
    }

    #[test]
    fn hash256_hex_roundtrip() {
        let h = Hash256::compute(b"hello");
        let hex = h.to_hex();
        let back = Hash256::from_hex(&hex).expect("valid hex");
        assert_eq!(h, back);
    }
}
