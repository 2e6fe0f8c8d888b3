//! Error kinds surfaced by the core (§7).
//!
//! Each component gets its own error enum, matching the flat, hand-rolled
//! style used throughout this crate. A top-level [`NodeError`] composes
//! them for callers that need a single return type (e.g. message handlers).

use std::fmt;

/// Rejection reasons for a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxError {
    InvalidSignature,
    InvalidHash,
    InvalidNonce,
    InsufficientBalance,
    InsufficientStake,
    MissingField(&'static str),
    InvalidAmount,
    SelfTransfer,
    TimestampOutOfRange,
    MalformedData(String),
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxError::InvalidSignature => write!(f, "invalid signature"),
            TxError::InvalidHash => write!(f, "invalid transaction hash"),
            TxError::InvalidNonce => write!(f, "invalid nonce"),
            TxError::InsufficientBalance => write!(f, "insufficient balance"),
            TxError::InsufficientStake => write!(f, "insufficient stake"),
            TxError::MissingField(name) => write!(f, "missing field: {name}"),
            TxError::InvalidAmount => write!(f, "invalid amount"),
            TxError::SelfTransfer => write!(f, "from equals to"),
            TxError::TimestampOutOfRange => write!(f, "timestamp out of range"),
            TxError::MalformedData(msg) => write!(f, "malformed data: {msg}"),
        }
    }
}

impl std::error::Error for TxError {}

/// Rejection reasons for a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    MerkleMismatch,
    BlockLinkMismatch,
    BlockHeightMismatch,
    TimestampOutOfRange,
    TooSoon,
    DuplicateTransaction,
    MissingCoinbase,
    ExtraCoinbase,
    InvalidSignature,
    InvalidHash,
    AlreadyPresent,
    Tx(TxError),
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockError::MerkleMismatch => write!(f, "merkle root mismatch"),
            BlockError::BlockLinkMismatch => write!(f, "previous_hash does not match head"),
            BlockError::BlockHeightMismatch => write!(f, "height does not match parent + 1"),
            BlockError::TimestampOutOfRange => write!(f, "block timestamp out of range"),
            BlockError::TooSoon => write!(f, "block arrived before minimum inter-block time"),
            BlockError::DuplicateTransaction => write!(f, "duplicate transaction id in block"),
            BlockError::MissingCoinbase => write!(f, "first transaction is not a coinbase"),
            BlockError::ExtraCoinbase => write!(f, "more than one coinbase transaction"),
            BlockError::InvalidSignature => write!(f, "invalid block header signature"),
            BlockError::InvalidHash => write!(f, "invalid block hash"),
            BlockError::AlreadyPresent => write!(f, "block already present"),
            BlockError::Tx(e) => write!(f, "transaction rejected: {e}"),
        }
    }
}

impl std::error::Error for BlockError {}

impl From<TxError> for BlockError {
    fn from(e: TxError) -> Self {
        BlockError::Tx(e)
    }
}

/// Rejection reasons for mempool admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    DuplicateTransaction,
    FeeTooLow,
    MempoolFull,
    AddressQuota,
    Tx(TxError),
}

impl fmt::Display for MempoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MempoolError::DuplicateTransaction => write!(f, "duplicate transaction"),
            MempoolError::FeeTooLow => write!(f, "fee too low"),
            MempoolError::MempoolFull => write!(f, "mempool full"),
            MempoolError::AddressQuota => write!(f, "per-address transaction quota exceeded"),
            MempoolError::Tx(e) => write!(f, "transaction rejected: {e}"),
        }
    }
}

impl std::error::Error for MempoolError {}

impl From<TxError> for MempoolError {
    fn from(e: TxError) -> Self {
        MempoolError::Tx(e)
    }
}

/// Reasons [`crate::miner::Miner::try_mine_block`] did not produce a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineError {
    InsufficientStake,
    NotMyTurn,
    TooSoon,
    NoValidators,
    /// Signing or self-validating the freshly assembled block failed; this
    /// is never a leader-order or timing problem, just a broken build.
    BlockAssemblyFailed,
}

impl fmt::Display for MineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MineError::InsufficientStake => write!(f, "insufficient stake"),
            MineError::NotMyTurn => write!(f, "not my turn"),
            MineError::TooSoon => write!(f, "too soon since parent block"),
            MineError::NoValidators => write!(f, "no eligible validators"),
            MineError::BlockAssemblyFailed => write!(f, "failed to assemble a valid block"),
        }
    }
}

impl std::error::Error for MineError {}

/// Reasons a gossip envelope was rejected before reaching its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GossipError {
    Quarantined,
    RateLimited,
    MessageTooLarge,
    MalformedEnvelope(&'static str),
    StaleMessage,
    DuplicateMessage,
    InvalidHash,
    UnknownMessageType(String),
}

impl fmt::Display for GossipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GossipError::Quarantined => write!(f, "peer is quarantined"),
            GossipError::RateLimited => write!(f, "peer rate limited"),
            GossipError::MessageTooLarge => write!(f, "message exceeds max size"),
            GossipError::MalformedEnvelope(why) => write!(f, "malformed envelope: {why}"),
            GossipError::StaleMessage => write!(f, "envelope timestamp out of range"),
            GossipError::DuplicateMessage => write!(f, "duplicate envelope id"),
            GossipError::InvalidHash => write!(f, "envelope hash mismatch"),
            GossipError::UnknownMessageType(t) => write!(f, "unknown message type: {t}"),
        }
    }
}

impl std::error::Error for GossipError {}

/// Reasons a sync round was aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    SyncLinkBroken,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::SyncLinkBroken => write!(f, "sync response contained a broken link"),
        }
    }
}

impl std::error::Error for SyncError {}

/// Top-level error composing every component error, for handlers that need
/// one return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    Tx(TxError),
    Block(BlockError),
    Mempool(MempoolError),
    Mine(MineError),
    Gossip(GossipError),
    Sync(SyncError),
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Tx(e) => write!(f, "{e}"),
            NodeError::Block(e) => write!(f, "{e}"),
            NodeError::Mempool(e) => write!(f, "{e}"),
            NodeError::Mine(e) => write!(f, "{e}"),
            NodeError::Gossip(e) => write!(f, "{e}"),
            NodeError::Sync(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for NodeError {}

impl From<TxError> for NodeError {
    fn from(e: TxError) -> Self {
        NodeError::Tx(e)
    }
}
impl From<BlockError> for NodeError {
    fn from(e: BlockError) -> Self {
        NodeError::Block(e)
    }
}
impl From<MempoolError> for NodeError {
    fn from(e: MempoolError) -> Self {
        NodeError::Mempool(e)
    }
}
impl From<MineError> for NodeError {
    fn from(e: MineError) -> Self {
        NodeError::Mine(e)
    }
}
impl From<GossipError> for NodeError {
    fn from(e: GossipError) -> Self {
        NodeError::Gossip(e)
    }
}
impl From<SyncError> for NodeError {
    fn from(e: SyncError) -> Self {
        NodeError::Sync(e)
    }
}
