//! Gossip envelope: wire wrapper with id/origin/TTL/hop/hash (§4.8).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GossipError;
use crate::types::Hash256;

/// Wrapper around any payload for anti-abuse gossip propagation (§4.8).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GossipEnvelope {
    pub id: String,
    pub origin_id: String,
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Opaque bytes of the inner payload, hex-encoded on the wire.
    pub data: String,
    pub timestamp: i64,
    pub ttl: u32,
    pub hop_count: u32,
    pub hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl GossipEnvelope {
    /// Builds and hashes a fresh envelope for local origination.
    pub fn new(origin_id: String, msg_type: String, data: Vec<u8>, ttl: u32, now: i64) -> Self {
        let mut envelope = GossipEnvelope {
            id: Uuid::new_v4().to_string(),
            origin_id,
            msg_type,
            data: hex::encode(data),
            timestamp: now,
            ttl,
            hop_count: 0,
            hash: String::new(),
            signature: None,
        };
        envelope.hash = envelope.compute_hash().to_hex();
        envelope
    }

    /// Hashes the envelope with `hash` and `signature` blanked (§4.8).
    pub fn compute_hash(&self) -> Hash256 {
        #[derive(Serialize)]
        struct HashView<'a> {
            id: &'a str,
            origin_id: &'a str,
            #[serde(rename = "type")]
            msg_type: &'a str,
            data: &'a str,
            timestamp: i64,
            ttl: u32,
            hop_count: u32,
        }
        let view = HashView {
            id: &self.id,
            origin_id: &self.origin_id,
            msg_type: &self.msg_type,
            data: &self.data,
            timestamp: self.timestamp,
            ttl: self.ttl,
            hop_count: self.hop_count,
        };
        let bytes = serde_json::to_vec(&view).expect("HashView is always serializable");
        Hash256::compute(&bytes)
    }

    pub fn payload_bytes(&self) -> Result<Vec<u8>, GossipError> {
        hex::decode(&self.data).map_err(|_| GossipError::MalformedEnvelope("data is not hex"))
    }

    /// Structural validity checks independent of peer/cache state: non-empty
    /// id/origin/type, `hop_count <= ttl <= max_ttl`, timestamp within
    /// `[-60s, 3600s]` of `now`, and a matching recomputed hash (§4.8 step 4).
    pub fn validate_structure(
        &self,
        now: i64,
        max_ttl: u32,
        max_message_size: usize,
    ) -> Result<(), GossipError> {
        if self.id.is_empty() || self.origin_id.is_empty() || self.msg_type.is_empty() {
            return Err(GossipError::MalformedEnvelope(
                "id/origin_id/type must be non-empty",
            ));
        }
        if self.hop_count > self.ttl || self.ttl > max_ttl {
            return Err(GossipError::MalformedEnvelope("hop_count <= ttl <= max_ttl violated"));
        }
        let age = now - self.timestamp;
        if !(-60..=3600).contains(&age) {
            return Err(GossipError::StaleMessage);
        }
        let payload = self.payload_bytes()?;
        if payload.len() > max_message_size {
            return Err(GossipError::MessageTooLarge);
        }
        if self.compute_hash().to_hex() != self.hash {
            return Err(GossipError::InvalidHash);
        }
        Ok(())
    }

    /// Returns a copy of this envelope with `hop_count` incremented, ready
    /// to forward (the hash is unaffected by hop_count per
    /// `validate_structure`'s use of the original envelope's hash — but we
    /// recompute here since `hop_count` is part of the hashed view, keeping
    /// forwarded envelopes self-consistent at every hop).
    pub fn forwarded(&self) -> Self {
        let mut next = self.clone();
        next.hop_count += 1;
        next.hash = next.compute_hash().to_hex();
        next
    }
}
