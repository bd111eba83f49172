use std::time::Duration;

/// Consensus configuration parameters.
///
/// This includes both protocol-level knobs (slot length, witness set)
/// and implementation-level limits (per-block budgets).
#[derive(Clone, Debug)]
pub struct ConsensusConfig {
    /// Length of one production slot.
    pub slot_length: Duration,
    /// Ordered active witness set; `witness_of_slot` indexes into it.
    pub witness_list: Vec<String>,
    /// Upper bound on transactions drained per produced block.
    pub produce_tx_limit: usize,
    /// Upper bound on the summed `gas_limit` of a block's transactions.
    pub max_block_gas_limit: u64,
    /// Maximum age of a transaction relative to its block's slot time.
    pub tx_max_age: Duration,
    /// Wall-clock budget for replaying one block during verification.
    pub max_block_verify_time: Duration,
    /// How far behind the announced best height the head may fall before
    /// a sync range is requested.
    pub sync_gap: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            slot_length: Duration::from_secs(3),
            witness_list: Vec::new(),
            produce_tx_limit: 1_000,
            max_block_gas_limit: 800_000_000,
            tx_max_age: Duration::from_secs(60),
            max_block_verify_time: Duration::from_millis(400),
            sync_gap: 10,
        }
    }
}
