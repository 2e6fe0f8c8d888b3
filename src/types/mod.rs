//! Core domain types shared across the chain implementation (§3).

pub mod block;
pub mod hash;
pub mod tx;

pub use block::{Block, BlockHeader};
pub use hash::{Address, Hash256, HASH_LEN};
pub use tx::{AmountPayload, Intent, Transaction, TxData};
