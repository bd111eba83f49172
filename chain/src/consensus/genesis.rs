//! Genesis bootstrap.
//!
//! When the block store is empty the node materializes a deterministic
//! genesis block: number 0, zero parent hash, slot 0, no witness
//! signature. The initial token balances and the witness schedule are
//! written into the state store, which is then tagged with the genesis
//! hash so the cache root and state tags line up from the first slot.

use serde::{Deserialize, Serialize};

use crate::state::StateStore;
use crate::types::block::{Block, BlockHash, BlockHead};
use crate::types::Hash256;
use crate::vm::native;

use super::algorithm::WITNESS_LIST_KEY;
use super::error::ConsensusError;

/// Parameters of the genesis state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Ordered initial witness schedule.
    pub witness_list: Vec<String>,
    /// Initial token balances, `(account id, amount)`.
    pub initial_balances: Vec<(String, u64)>,
}

/// Builds the genesis block and seeds the state store.
///
/// The resulting state is tagged with the genesis block hash.
pub fn build_genesis(
    cfg: &GenesisConfig,
    state: &mut dyn StateStore,
) -> Result<Block, ConsensusError> {
    for (id, amount) in &cfg.initial_balances {
        native::set_initial_balance(state, id, *amount);
    }
    let schedule = serde_json::to_string(&cfg.witness_list)
        .map_err(|e| ConsensusError::Execution(e.to_string()))?;
    state.put(WITNESS_LIST_KEY, &schedule);

    let block = Block {
        head: BlockHead {
            version: 0,
            parent_hash: BlockHash::default(),
            number: 0,
            witness: String::new(),
            time: 0,
            txs_hash: Hash256::default(),
            merkle_hash: Hash256::default(),
            info: Vec::new(),
            signature: Default::default(),
        },
        txs: Vec::new(),
        receipts: Vec::new(),
    };
    state.tag(&block.hash().to_hex());
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::algorithm::read_pending_witness_list;
    use crate::state::MemStateStore;

    fn cfg() -> GenesisConfig {
        GenesisConfig {
            witness_list: vec!["w1".into(), "w2".into()],
            initial_balances: vec![("alice".into(), 1_000), ("bob".into(), 500)],
        }
    }

    #[test]
    fn genesis_is_deterministic() {
        let mut s1 = MemStateStore::new();
        let mut s2 = MemStateStore::new();
        let g1 = build_genesis(&cfg(), &mut s1).expect("genesis");
        let g2 = build_genesis(&cfg(), &mut s2).expect("genesis");
        assert_eq!(g1.hash(), g2.hash());
        assert_eq!(g1.head.number, 0);
        assert!(g1.head.parent_hash.is_zero());
    }

    #[test]
    fn genesis_state_is_tagged_and_seeded() {
        let mut state = MemStateStore::new();
        let genesis = build_genesis(&cfg(), &mut state).expect("genesis");

        let mut view = state.fork();
        assert!(view.checkout(&genesis.hash().to_hex()));
        assert_eq!(native::get_balance(&*view, "alice"), 1_000);
        assert_eq!(native::get_balance(&*view, "bob"), 500);
        assert_eq!(
            read_pending_witness_list(&*view),
            Some(vec!["w1".to_string(), "w2".to_string()])
        );
    }
}
