//! Transport interface and wire payload shapes the core depends on (§6).
//!
//! The core never talks to sockets directly; it depends on [`PeerLink`], a
//! trait a concrete transport (TCP, QUIC, libp2p, an in-process test
//! double) implements. This mirrors the teacher's pattern of depending on
//! `BlockStore`/`TxPool` traits rather than concrete I/O.

use serde::{Deserialize, Serialize};

use crate::types::Block;

pub const MSG_BLOCK: &str = "block";
pub const MSG_TRANSACTION: &str = "transaction";
pub const MSG_SYNC_REQUEST: &str = "sync_request";
pub const MSG_SYNC_RESPONSE: &str = "sync_response";
pub const MSG_GOSSIP: &str = "gossip";

/// Wire payload for `sync_request` (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncRequest {
    pub from_height: u64,
}

/// Wire payload for `sync_response` (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncResponse {
    pub blocks: Vec<Block>,
}

/// Outbound transport interface the core depends on (§6).
///
/// `request_peers` and `disconnect_peer` are additions beyond spec.md §6's
/// literal `PeerLink` (SendUnicast/Broadcast/ConnectedPeerIds plus the event
/// callbacks split into `PeerEventHandler` below): spec.md §5's peer
/// maintenance paragraph has the Replicator "ask the transport for a fresh
/// peer list" below `MinPeers` and "select... for disconnection" above
/// `MaxPeers`, but names no methods for either action. Resolved here as a
/// SPEC_FULL.md addendum (see DESIGN.md).
pub trait PeerLink: Send + Sync {
    fn send_unicast(&self, peer_id: &str, msg_type: &str, bytes: &[u8]) -> Result<(), String>;
    fn broadcast(&self, msg_type: &str, bytes: &[u8]);
    fn connected_peer_ids(&self) -> Vec<String>;
    /// Best-effort request for the transport to discover and connect fresh
    /// peers, used when the replicator is below `MinPeers`.
    fn request_peers(&self);
    /// Tears down the connection to `peer_id`, used when the replicator is
    /// above `MaxPeers` and has picked the least-active peer to drop.
    fn disconnect_peer(&self, peer_id: &str);
}

/// Inbound event sink a [`PeerLink`] implementation drives (§6:
/// `OnPeerConnected`/`OnPeerDisconnected`/`OnMessage`). [`crate::node::Replicator`]
/// implements this.
pub trait PeerEventHandler: Send + Sync {
    fn on_peer_connected(&self, peer_id: &str);
    fn on_peer_disconnected(&self, peer_id: &str);
    fn on_message(&self, peer_id: &str, msg_type: &str, bytes: &[u8]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_request_round_trips_through_json() {
        let req = SyncRequest { from_height: 42 };
        let bytes = serde_json::to_vec(&req).unwrap();
        let decoded: SyncRequest = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded.from_height, 42);
    }

    #[test]
    fn sync_response_round_trips_with_empty_blocks() {
        let resp = SyncResponse { blocks: Vec::new() };
        let bytes = serde_json::to_vec(&resp).unwrap();
        let decoded: SyncResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(decoded.blocks.is_empty());
    }
}
