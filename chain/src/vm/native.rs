//! Native token engine.
//!
//! A deliberately small [`Engine`] implementing the built-in token
//! contract. It exists so the core pipeline (production, verification,
//! state tagging) can be exercised end to end without a full virtual
//! machine behind the facade.
//!
//! Supported ABI:
//!
//! - `token.chain/issue  ["to", "amount"]` — mint into an account,
//! - `token.chain/transfer ["from", "to", "amount"]` — move balance.
//!
//! Balances live under `token.chain/balance/<id>` as decimal strings.

use crate::state::StateStore;
use crate::types::{BlockHead, Tx, TxReceipt};

use super::{Engine, VmError};

/// Contract identifier served by this engine.
pub const TOKEN_CONTRACT: &str = "token.chain";

/// Flat gas charge per executed action.
pub const GAS_PER_ACTION: u64 = 100;

fn balance_key(id: &str) -> String {
    format!("{TOKEN_CONTRACT}/balance/{id}")
}

fn read_balance(state: &dyn StateStore, id: &str) -> u64 {
    state
        .get(&balance_key(id))
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
}

fn write_balance(state: &mut dyn StateStore, id: &str, amount: u64) {
    state.put(&balance_key(id), &amount.to_string());
}

fn parse_args(data: &str, expected: usize) -> Result<Vec<String>, VmError> {
    let args: Vec<String> =
        serde_json::from_str(data).map_err(|e| VmError::BadArgs(e.to_string()))?;
    if args.len() != expected {
        return Err(VmError::BadArgs(format!(
            "expected {expected} arguments, got {}",
            args.len()
        )));
    }
    Ok(args)
}

fn parse_amount(raw: &str) -> Result<u64, VmError> {
    raw.parse::<u64>()
        .map_err(|_| VmError::BadArgs(format!("bad amount {raw:?}")))
}

/// Writes a balance directly, bypassing the ABI. Used by the genesis
/// bootstrap before any block exists to carry an `issue` action.
pub fn set_initial_balance(state: &mut dyn StateStore, id: &str, amount: u64) {
    write_balance(state, id, amount);
}

/// Reads a balance, for RPC surfaces and tests.
pub fn get_balance(state: &dyn StateStore, id: &str) -> u64 {
    read_balance(state, id)
}

/// The built-in token engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransferEngine;

impl TransferEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for TransferEngine {
    fn exec(
        &self,
        _head: &BlockHead,
        state: &mut dyn StateStore,
        tx: &Tx,
    ) -> Result<TxReceipt, VmError> {
        let gas_usage = GAS_PER_ACTION * tx.actions.len() as u64;
        if gas_usage > tx.gas_limit {
            return Err(VmError::OutOfGas);
        }

        // Stage writes so a failing action leaves the view untouched.
        let mut staged: Vec<(String, u64)> = Vec::new();
        let staged_balance = |staged: &[(String, u64)], state: &dyn StateStore, id: &str| {
            staged
                .iter()
                .rev()
                .find(|(k, _)| k == id)
                .map(|(_, v)| *v)
                .unwrap_or_else(|| read_balance(state, id))
        };

        for action in &tx.actions {
            if action.contract != TOKEN_CONTRACT {
                return Err(VmError::UnknownContract(action.contract.clone()));
            }
            match action.action_name.as_str() {
                "issue" => {
                    let args = parse_args(&action.data, 2)?;
                    let amount = parse_amount(&args[1])?;
                    let to = staged_balance(&staged, state, &args[0]);
                    staged.push((args[0].clone(), to.saturating_add(amount)));
                }
                "transfer" => {
                    let args = parse_args(&action.data, 3)?;
                    let amount = parse_amount(&args[2])?;
                    let from = staged_balance(&staged, state, &args[0]);
                    if from < amount {
                        return Err(VmError::InsufficientBalance(args[0].clone()));
                    }
                    let to = staged_balance(&staged, state, &args[1]);
                    staged.push((args[0].clone(), from - amount));
                    staged.push((args[1].clone(), to.saturating_add(amount)));
                }
                other => {
                    return Err(VmError::UnknownAction(
                        action.contract.clone(),
                        other.to_string(),
                    ));
                }
            }
        }

        for (id, amount) in staged {
            write_balance(state, &id, amount);
        }

        Ok(TxReceipt::success(
            tx.hash(),
            gas_usage,
            tx.actions.len() as u32,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemStateStore;
    use crate::types::block::BlockHash;
    use crate::types::{Action, BlockHead, Hash256, PublicKey, Signature};

    fn dummy_head() -> BlockHead {
        BlockHead {
            version: 0,
            parent_hash: BlockHash::default(),
            number: 1,
            witness: "w1".to_string(),
            time: 1,
            txs_hash: Hash256::default(),
            merkle_hash: Hash256::default(),
            info: Vec::new(),
            signature: Signature::default(),
        }
    }

    fn tx_with_actions(actions: Vec<Action>) -> Tx {
        Tx::new(
            1,
            i64::MAX,
            1,
            100_000,
            actions,
            vec![PublicKey(vec![1u8; 32])],
        )
    }

    #[test]
    fn issue_then_transfer_moves_balance() {
        let engine = TransferEngine::new();
        let mut state = MemStateStore::new();
        let head = dummy_head();

        let issue = tx_with_actions(vec![Action::new(
            TOKEN_CONTRACT,
            "issue",
            r#"["alice","100"]"#,
        )]);
        engine.exec(&head, &mut state, &issue).expect("issue");

        let transfer = tx_with_actions(vec![Action::new(
            TOKEN_CONTRACT,
            "transfer",
            r#"["alice","bob","30"]"#,
        )]);
        let receipt = engine.exec(&head, &mut state, &transfer).expect("transfer");

        assert_eq!(receipt.gas_usage, GAS_PER_ACTION);
        assert_eq!(receipt.succ_action_num, 1);
        assert_eq!(read_balance(&state, "alice"), 70);
        assert_eq!(read_balance(&state, "bob"), 30);
    }

    #[test]
    fn overdraft_fails_without_writes() {
        let engine = TransferEngine::new();
        let mut state = MemStateStore::new();
        let head = dummy_head();

        let issue = tx_with_actions(vec![Action::new(
            TOKEN_CONTRACT,
            "issue",
            r#"["alice","10"]"#,
        )]);
        engine.exec(&head, &mut state, &issue).expect("issue");

        let tx = tx_with_actions(vec![
            Action::new(TOKEN_CONTRACT, "transfer", r#"["alice","bob","5"]"#),
            Action::new(TOKEN_CONTRACT, "transfer", r#"["alice","bob","50"]"#),
        ]);
        let err = engine.exec(&head, &mut state, &tx).unwrap_err();
        assert!(matches!(err, VmError::InsufficientBalance(_)));

        // The partial first transfer must not have leaked into state.
        assert_eq!(read_balance(&state, "alice"), 10);
        assert_eq!(read_balance(&state, "bob"), 0);
    }

    #[test]
    fn gas_limit_is_enforced() {
        let engine = TransferEngine::new();
        let mut state = MemStateStore::new();
        let head = dummy_head();

        let mut tx = tx_with_actions(vec![Action::new(
            TOKEN_CONTRACT,
            "issue",
            r#"["alice","1"]"#,
        )]);
        tx.gas_limit = GAS_PER_ACTION - 1;
        assert!(matches!(
            engine.exec(&head, &mut state, &tx),
            Err(VmError::OutOfGas)
        ));
    }

    #[test]
    fn unknown_contract_is_rejected() {
        let engine = TransferEngine::new();
        let mut state = MemStateStore::new();
        let tx = tx_with_actions(vec![Action::new("vote.chain", "issue", "[]")]);
        assert!(matches!(
            engine.exec(&dummy_head(), &mut state, &tx),
            Err(VmError::UnknownContract(_))
        ));
    }
}
