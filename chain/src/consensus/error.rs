//! Error kinds surfaced by the block admission path.
//!
//! Each variant maps to a distinct log event and rejection metric label.
//! Block-level errors are rejected, never retried; the offending cache
//! node is removed.

use crate::blockcache::CacheError;
use crate::state::StateError;
use crate::storage::StorageError;
use crate::types::codec::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    /// The slot's elected witness does not match the block's witness.
    #[error("wrong witness")]
    WrongWitness,
    /// The header signature's public key does not derive the declared
    /// witness identifier.
    #[error("wrong pubkey")]
    WrongPubkey,
    /// The header signature does not verify.
    #[error("bad signature")]
    BadSignature,
    /// Another linked block already occupies this slot.
    #[error("witness slot duplicate")]
    DuplicateSlot,
    /// The block hash is already in the cache.
    #[error("duplicate block")]
    DuplicateBlock,
    /// A carried transaction is too old relative to the block slot.
    #[error("tx too old")]
    TxTooOld,
    /// A carried transaction is already on the ancestor chain.
    #[error("duplicate tx on chain")]
    TxDupOnChain,
    /// A carried transaction fails structural verification.
    #[error("tx bad signature")]
    TxBadSignature,
    /// Header structure is inconsistent with its parent or contents.
    #[error("bad block head: {0}")]
    BadBlockHead(&'static str),
    /// The parent's state tag is missing, so the block cannot be
    /// verified or produced against.
    #[error("missing state tag {0}")]
    MissingStateTag(String),
    /// The execution engine rejected a transaction during replay.
    #[error("vm execution failed: {0}")]
    Execution(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    State(#[from] StateError),
}

impl ConsensusError {
    /// Stable label used for the per-kind rejection metric.
    pub fn metric_label(&self) -> &'static str {
        match self {
            ConsensusError::WrongWitness => "wrong_witness",
            ConsensusError::WrongPubkey => "wrong_pubkey",
            ConsensusError::BadSignature => "bad_signature",
            ConsensusError::DuplicateSlot => "duplicate_slot",
            ConsensusError::DuplicateBlock => "duplicate_block",
            ConsensusError::TxTooOld => "tx_too_old",
            ConsensusError::TxDupOnChain => "tx_dup_on_chain",
            ConsensusError::TxBadSignature => "tx_bad_signature",
            ConsensusError::BadBlockHead(_) => "bad_block_head",
            ConsensusError::MissingStateTag(_) => "missing_state_tag",
            ConsensusError::Execution(_) => "execution",
            ConsensusError::Codec(_) => "codec",
            ConsensusError::Cache(_) => "cache",
            ConsensusError::Storage(_) => "storage",
            ConsensusError::State(_) => "state",
        }
    }
}
