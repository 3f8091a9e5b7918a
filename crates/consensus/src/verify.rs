//! Block execution and reconciliation against header-declared roots.

use crate::{builtin::energy, ConsensusError, ProcessError};
use alloy_primitives::{b256, B256};
use lazy_static::lazy_static;
use std::collections::HashMap;
use thor_primitives::{proofs, Block, Receipt};
use thor_provider::{
    BlockContext, Chain, Stage, StageVersion, State, TransactionExecutor,
};
use tracing::trace;

lazy_static! {
    // Historical fixups: blocks whose sealed receipts root predates a receipt
    // encoding fix. Keyed by block id, mapping to the root as computed by
    // current code. Carried verbatim from chain history; never regenerate.
    static ref CORRECT_RECEIPTS_ROOTS: HashMap<B256, B256> = HashMap::from([
        (
            b256!("000d0f4e42fcee5c2a8a3f46ef236bd6c5d4b1ed99cf2b7b2f9d161e3f0f3c94"),
            b256!("27ab84d2a4c958e4e38fd8302b82ca298c0c58de4af7e54e86b6e9b0a7a7d8c6"),
        ),
        (
            b256!("0011b6d6e9a0cf7d987b8cf951b1b4a56f4a5d31e568a82f5e1de9c8b3a9e2f3"),
            b256!("49d8b1e1c98a2094b7f9fcbb69a6e160a2f18dae8b7e03c8d3bdcf6a57bca121"),
        ),
    ]);
}

/// Verifies a block by executing its transactions against the parent state.
///
/// Walks the transaction list in order, rejecting duplicates and broken
/// dependencies against both the in-block scope and the parent chain, then
/// reconciles gas, receipts root and state root against the header. Returns
/// the staged (uncommitted) state and the receipt list.
pub(crate) fn verify_block<S, C, E>(
    chain: &C,
    executor: &E,
    state: &mut S,
    block: &Block,
    block_conflicts: u32,
    pos_active: bool,
) -> Result<(S::Stage, Vec<Receipt>), ProcessError>
where
    S: State,
    C: Chain,
    E: TransactionExecutor<S>,
{
    let header = &block.header;
    let signer = header
        .signer()
        .map_err(|err| ConsensusError::SignerUnavailable(err.to_string()))?;

    let ctx = BlockContext {
        beneficiary: header.beneficiary,
        signer,
        number: header.number,
        timestamp: header.timestamp,
        gas_limit: header.gas_limit,
        total_score: header.total_score,
        base_fee: header.base_fee_per_gas,
    };

    let mut total_gas_used = 0u64;
    let mut receipts = Vec::with_capacity(block.transactions.len());
    // tx id -> reverted, for transactions processed earlier in this block
    let mut processed: HashMap<B256, bool> = HashMap::new();

    for tx in &block.transactions {
        let id = tx
            .id()
            .map_err(|err| ConsensusError::SignerUnavailable(err.to_string()))?;

        if processed.contains_key(&id) ||
            chain.has_transaction(&id, tx.transaction.block_ref_number())?
        {
            return Err(ConsensusError::TxAlreadyExists { id }.into());
        }

        if let Some(dep) = tx.transaction.depends_on() {
            let reverted = match processed.get(&dep) {
                Some(&reverted) => Some(reverted),
                None => chain.get_transaction_meta(&dep)?.map(|meta| meta.reverted),
            };
            match reverted {
                None => return Err(ConsensusError::TxDepBroken { id, dep }.into()),
                Some(true) => return Err(ConsensusError::TxDepReverted { id, dep }.into()),
                Some(false) => {}
            }
        }

        let receipt = executor.execute_transaction(state, &ctx, tx)?;
        total_gas_used += receipt.gas_used;
        processed.insert(id, receipt.reverted);
        receipts.push(receipt);
    }

    if header.gas_used != total_gas_used {
        return Err(ConsensusError::GasUsedMismatch {
            have: total_gas_used,
            want: header.gas_used,
        }
        .into());
    }

    let receipts_root = proofs::calculate_receipts_root(&receipts);
    if receipts_root != header.receipts_root {
        // a few historical blocks sealed roots computed by a buggy encoder
        let excused = header
            .id()
            .ok()
            .and_then(|id| CORRECT_RECEIPTS_ROOTS.get(&id))
            .is_some_and(|correct| *correct == receipts_root);
        if !excused {
            return Err(ConsensusError::ReceiptsRootMismatch {
                have: receipts_root,
                want: header.receipts_root,
            }
            .into());
        }
        trace!(target: "consensus", number = header.number, "receipts root excused by fixup table");
    }

    if pos_active {
        energy::distribute_rewards(state, header.beneficiary, signer, header.timestamp)?;
    }

    let stage = state.stage(StageVersion { major: header.number, minor: block_conflicts })?;
    let state_root = stage.hash();
    if state_root != header.state_root {
        return Err(ConsensusError::StateRootMismatch {
            have: state_root,
            want: header.state_root,
        }
        .into());
    }

    Ok((stage, receipts))
}
