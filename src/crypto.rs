//! Wallet / elliptic-curve contract (§6).
//!
//! The core treats key material as an external collaborator: a [`KeyPair`]
//! trait plus a free `verify` function. The concrete implementation here
//! uses secp256k1 with an uncompressed public key split into its 32-byte
//! `x`/`y` halves and a compact (`r || s`) signature, matching the 32/64
//! byte wire widths §6 specifies.

use secp256k1::ecdsa::Signature as EcdsaSignature;
use secp256k1::{rand, All, Message, PublicKey, Secp256k1, SecretKey};

use crate::types::hash::{Address, Hash256};

/// 64-byte `r || s` signature, as both an owned buffer and a hex helper.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawSignature(pub [u8; 64]);

impl RawSignature {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Owned key material capable of deriving its own address and signing
/// arbitrary byte strings (§6 `Sign`, `Address`).
pub trait KeyPair {
    /// `Address() = SHA256(pub_x32 || pub_y32)`.
    fn address(&self) -> Address;
    /// Signs `bytes`, returning a 64-byte `r || s` signature.
    fn sign(&self, bytes: &[u8]) -> RawSignature;
    /// Hex encoding of the 64-byte `x || y` public key.
    fn public_key_hex(&self) -> String;
}

/// Reference `KeyPair` implementation backed by secp256k1.
pub struct Secp256k1KeyPair {
    secp: Secp256k1<All>,
    secret: SecretKey,
    public: PublicKey,
}

impl Secp256k1KeyPair {
    /// Generates a fresh random keypair.
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut rand::thread_rng());
        Self { secp, secret, public }
    }

    /// Derives a deterministic keypair from a 32-byte seed. Useful for
    /// tests and for deriving a demo node's identity from a fixed string.
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, secp256k1::Error> {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(seed)?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self { secp, secret, public })
    }

    /// Returns the raw 64-byte `x || y` public key encoding.
    fn public_key_xy(&self) -> [u8; 64] {
        uncompressed_xy(&self.public)
    }
}

impl KeyPair for Secp256k1KeyPair {
    fn address(&self) -> Address {
        Address::from_public_key(&self.public_key_xy())
    }

    fn sign(&self, bytes: &[u8]) -> RawSignature {
        let digest = Hash256::compute(bytes);
        let msg = Message::from_digest(digest.0);
        let sig = self.secp.sign_ecdsa(&msg, &self.secret);
        RawSignature(sig.serialize_compact())
    }

    fn public_key_hex(&self) -> String {
        hex::encode(self.public_key_xy())
    }
}

/// Extracts the 64-byte `x || y` halves from an uncompressed secp256k1
/// point (`0x04 || X || Y`), dropping the leading tag byte.
fn uncompressed_xy(public: &PublicKey) -> [u8; 64] {
    let serialized = public.serialize_uncompressed();
    let mut xy = [0u8; 64];
    xy.copy_from_slice(&serialized[1..]);
    xy
}

/// Free-function verify: `Verify(pub_bytes, bytes, sig_hex) -> bool` (§6).
///
/// `pub_bytes` is the raw 64-byte `x || y` encoding (not hex); `sig` is the
/// hex-encoded 64-byte `r || s` signature.
pub fn verify(pub_bytes: &[u8], bytes: &[u8], sig_hex: &str) -> bool {
    if pub_bytes.len() != 64 {
        return false;
    }
    let sig_bytes = match hex::decode(sig_hex) {
        Ok(b) if b.len() == 64 => b,
        _ => return false,
    };

    let mut uncompressed = [0u8; 65];
    uncompressed[0] = 0x04;
    uncompressed[1..].copy_from_slice(pub_bytes);

    let public = match PublicKey::from_slice(&uncompressed) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let signature = match EcdsaSignature::from_compact(&sig_bytes) {
        Ok(s) => s,
        Err(_) => return false,
    };

    let digest = Hash256::compute(bytes);
    let msg = Message::from_digest(digest.0);

    let secp = Secp256k1::verification_only();
    secp.verify_ecdsa(&msg, &signature, &public).is_ok()
}
