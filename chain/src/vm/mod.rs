//! Execution engine facade.
//!
//! The consensus core is agnostic to what transactions actually do; it
//! only needs `exec(head, state, tx) -> receipt`. On success the working
//! state reflects the transaction's writes. Errors are non-fatal to the
//! pipeline: a producer skips the transaction, a verifier rejects the
//! block carrying it.

use crate::state::StateStore;
use crate::types::{BlockHead, Tx, TxReceipt};

pub mod native;

pub use native::TransferEngine;

/// Errors from transaction execution.
#[derive(Debug, thiserror::Error)]
pub enum VmError {
    #[error("unknown contract: {0}")]
    UnknownContract(String),
    #[error("unknown action: {0}/{1}")]
    UnknownAction(String, String),
    #[error("malformed arguments: {0}")]
    BadArgs(String),
    #[error("insufficient balance for {0}")]
    InsufficientBalance(String),
    #[error("gas limit exceeded")]
    OutOfGas,
}

/// Pluggable execution engine.
///
/// Implementations must be deterministic: the same transaction on the
/// same working state yields the same receipt and the same writes, or
/// the same error with no writes.
pub trait Engine: Send + Sync {
    fn exec(
        &self,
        head: &BlockHead,
        state: &mut dyn StateStore,
        tx: &Tx,
    ) -> Result<TxReceipt, VmError>;
}
