//! Transaction types (§3, §4.2).
//!
//! A [`Transaction`] is an immutable signed record once `sign` has been
//! called. The `data` field carries either nothing, an opaque message, or a
//! typed stake/unstake envelope (§4.2) — modeled here as [`TxData`] and
//! (de)serialized to/from the wire `data` string so older clients that only
//! understand an opaque string remain compatible.

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::crypto::{verify, KeyPair};
use crate::error::TxError;
use crate::types::hash::Address;

/// Maximum allowed drift between a transaction's `timestamp` and local
/// wall-clock time when it is created (§3).
pub const MAX_FUTURE_DRIFT_SECS: i64 = 300;

/// Parsed form of the `data` field's typed envelope, when present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TxData {
    Stake { payload: AmountPayload },
    Unstake { payload: AmountPayload },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountPayload {
    pub amount: u64,
}

impl TxData {
    /// Parses the raw `data` string into a typed envelope.
    ///
    /// An empty string or any string that doesn't parse as the expected
    /// JSON envelope is treated as "no envelope" (ordinary transfer),
    /// matching §4.2's "absent/unknown: ordinary transfer".
    pub fn parse(raw: &str) -> Option<TxData> {
        if raw.is_empty() {
            return None;
        }
        serde_json::from_str(raw).ok()
    }
}

/// The intent an executor derives from a transaction's `data` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Transfer,
    Stake,
    Unstake,
}

/// A signed transaction (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    /// Hex hash, assigned on sign; equals the hash of the signing bytes.
    pub id: String,
    /// Sender address, empty string for coinbase.
    pub from: Address,
    /// Recipient address.
    pub to: Address,
    pub amount: u64,
    pub fee: u64,
    /// Unix seconds.
    pub timestamp: i64,
    /// Hex, 64 bytes r||s. Empty for an unsigned or coinbase transaction.
    pub signature: String,
    /// Hex, 64 bytes x||y. Empty for a coinbase transaction.
    pub public_key: String,
    pub nonce: u64,
    /// Empty, an opaque message, or a JSON stake/unstake envelope.
    pub data: String,
}

impl Transaction {
    /// Builds an unsigned, not-yet-hashed coinbase transaction.
    ///
    /// `to`, `amount`, and `nonce` (== block height) are fixed by the
    /// caller; `Sign` is never called on a coinbase — its `id` is
    /// `SHA256(tx_without_signature_and_id)` the same as any transaction,
    /// computed directly.
    pub fn new_coinbase(to: Address, amount: u64, height: u64, timestamp: i64) -> Self {
        let mut tx = Transaction {
            id: String::new(),
            from: Address(Address::COINBASE_FROM.to_string()),
            to,
            amount,
            fee: 0,
            timestamp,
            signature: String::new(),
            public_key: String::new(),
            nonce: height,
            data: String::new(),
        };
        tx.id = codec::tx_hash(&tx).to_hex();
        tx
    }

    /// Signs this transaction with `keypair`, setting `public_key`,
    /// `signature`, and `id`. Fails if `from` does not equal the keypair's
    /// own address.
    pub fn sign(&mut self, keypair: &dyn KeyPair) -> Result<(), TxError> {
        if self.from != keypair.address() {
            return Err(TxError::InvalidSignature);
        }
        self.public_key = keypair.public_key_hex();
        let sign_bytes = codec::tx_sign_bytes(self);
        self.signature = keypair.sign(&sign_bytes).to_hex();
        self.id = codec::tx_hash(self).to_hex();
        Ok(())
    }

    /// Checks cryptographic validity: required fields present, `from`
    /// derived from `public_key`, `id` matches the recomputed hash, and the
    /// signature verifies.
    pub fn verify(&self) -> Result<(), TxError> {
        if self.public_key.is_empty() {
            return Err(TxError::MissingField("public_key"));
        }
        if self.signature.is_empty() {
            return Err(TxError::MissingField("signature"));
        }
        let pub_bytes = hex::decode(&self.public_key).map_err(|_| TxError::InvalidSignature)?;
        let expected_from = Address::from_public_key(&pub_bytes);
        if self.from != expected_from {
            return Err(TxError::InvalidSignature);
        }

        let expected_id = codec::tx_hash(self).to_hex();
        if self.id != expected_id {
            return Err(TxError::InvalidHash);
        }

        let sign_bytes = codec::tx_sign_bytes(self);
        if !verify(&pub_bytes, &sign_bytes, &self.signature) {
            return Err(TxError::InvalidSignature);
        }
        Ok(())
    }

    /// Same as [`Transaction::verify`] but for a coinbase, which carries no
    /// signature: only `id`, `nonce`, and shape are checked.
    pub fn verify_coinbase(&self, expected_height: u64) -> Result<(), TxError> {
        if !self.from.is_coinbase() {
            return Err(TxError::InvalidSignature);
        }
        if self.fee != 0 {
            return Err(TxError::InvalidAmount);
        }
        if self.nonce != expected_height {
            return Err(TxError::InvalidNonce);
        }
        if self.amount == 0 {
            return Err(TxError::InvalidAmount);
        }
        let expected_id = codec::tx_hash(self).to_hex();
        if self.id != expected_id {
            return Err(TxError::InvalidHash);
        }
        Ok(())
    }

    /// `Verify()` plus the business-rule invariants from §3.
    pub fn validate(&self, now: i64) -> Result<(), TxError> {
        if self.from.is_coinbase() {
            // Coinbase validity is checked via `verify_coinbase`, which
            // needs the block height; ordinary `validate` only applies to
            // non-coinbase transactions per §3.
            return Err(TxError::MissingField("from"));
        }

        self.verify()?;

        if self.amount == 0 {
            return Err(TxError::InvalidAmount);
        }

        let is_stake_envelope = matches!(TxData::parse(&self.data), Some(_));
        if self.from == self.to && !is_stake_envelope {
            return Err(TxError::SelfTransfer);
        }

        if self.timestamp > now + MAX_FUTURE_DRIFT_SECS {
            return Err(TxError::TimestampOutOfRange);
        }

        Ok(())
    }

    /// Derives the execution [`Intent`] from the `data` field, validating
    /// that a stake/unstake envelope's `payload.amount` matches `amount`.
    pub fn intent(&self) -> Result<Intent, TxError> {
        match TxData::parse(&self.data) {
            None => Ok(Intent::Transfer),
            Some(TxData::Stake { payload }) => {
                if payload.amount != self.amount {
                    return Err(TxError::MalformedData(
                        "stake payload.amount does not match tx.amount".to_string(),
                    ));
                }
                Ok(Intent::Stake)
            }
            Some(TxData::Unstake { payload }) => {
                if payload.amount != self.amount {
                    return Err(TxError::MalformedData(
                        "unstake payload.amount does not match tx.amount".to_string(),
                    ));
                }
                Ok(Intent::Unstake)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Secp256k1KeyPair;

    fn dummy_keypair(seed: u8) -> Secp256k1KeyPair {
        Secp256k1KeyPair::from_seed(&[seed; 32]).expect("valid seed")
    }

    fn dummy_unsigned_tx(from: Address, to: Address, amount: u64, nonce: u64) -> Transaction {
        Transaction {
            id: String::new(),
            from,
            to,
            amount,
            fee: 1,
            timestamp: 1_700_000_000,
            signature: String::new(),
            public_key: String::new(),
            nonce,
            data: String::new(),
        }
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let kp = dummy_keypair(1);
        let to = Address("deadbeef".repeat(8));
        let mut tx = dummy_unsigned_tx(kp.address(), to, 100, 0);

        tx.sign(&kp).expect("sign should succeed for own address");
        tx.verify().expect("freshly signed tx should verify");
    }

    #[test]
    fn mutating_any_field_invalidates_verification() {
        let kp = dummy_keypair(2);
        let to = Address("c0ffee00".repeat(8));
        let mut tx = dummy_unsigned_tx(kp.address(), to, 50, 3);
        tx.sign(&kp).unwrap();

        let mut tampered = tx.clone();
        tampered.amount += 1;
        assert!(tampered.verify().is_err());

        let mut tampered_nonce = tx.clone();
        tampered_nonce.nonce += 1;
        assert!(tampered_nonce.verify().is_err());
    }

    #[test]
    fn sign_fails_if_from_does_not_match_keypair() {
        let kp = dummy_keypair(3);
        let wrong_from = Address("00".repeat(32));
        let mut tx = dummy_unsigned_tx(wrong_from, kp.address(), 10, 0);
        assert_eq!(tx.sign(&kp), Err(TxError::InvalidSignature));
    }

    #[test]
    fn stake_intent_requires_matching_payload_amount() {
        let kp = dummy_keypair(4);
        let mut tx = dummy_unsigned_tx(kp.address(), kp.address(), 500, 0);
        tx.data = serde_json::to_string(&TxData::Stake {
            payload: AmountPayload { amount: 500 },
        })
        .unwrap();
        tx.sign(&kp).unwrap();
        assert_eq!(tx.intent(), Ok(Intent::Stake));

        tx.data = serde_json::to_string(&TxData::Stake {
            payload: AmountPayload { amount: 400 },
        })
        .unwrap();
        assert!(tx.intent().is_err());
    }

    #[test]
    fn coinbase_verifies_without_signature() {
        let to = Address("ab".repeat(32));
        let tx = Transaction::new_coinbase(to, 1000, 7, 1_700_000_000);
        tx.verify_coinbase(7).expect("coinbase should verify");
        assert!(tx.verify_coinbase(8).is_err());
    }
}
