//! Stateless block validation: parent-relative header checks and structural
//! transaction checks.

use crate::{ConsensusError, ProcessError};
use alloy_primitives::Bytes;
use thor_chainspec::{
    ChainSpec, BASE_FEE_CHANGE_DENOMINATOR, BLOCK_INTERVAL, ELASTICITY_MULTIPLIER,
    GAS_LIMIT_BOUND_DIVISOR, INITIAL_BASE_FEE, MIN_GAS_LIMIT,
};
use thor_primitives::{
    Block, Header, TxType, COMPLEX_SIGNATURE_SIZE, SIGNATURE_SIZE,
};

/// Validates a header against its parent.
///
/// Checks are ordered so the cheap structural rules run before any signature
/// work. A timestamp past `now` plus one interval yields
/// [`ProcessError::FutureBlock`], which the import pipeline treats as "try
/// again later" rather than as a rejection.
pub fn validate_block_header(
    header: &Header,
    parent: &Header,
    now: u64,
    spec: &ChainSpec,
) -> Result<(), ProcessError> {
    if header.number != parent.number + 1 {
        return Err(ConsensusError::BlockNumberInvalid {
            parent: parent.number,
            current: header.number,
        }
        .into());
    }

    if header.timestamp <= parent.timestamp {
        return Err(ConsensusError::TimestampBehindParent {
            parent: parent.timestamp,
            current: header.timestamp,
        }
        .into());
    }

    if (header.timestamp - parent.timestamp) % BLOCK_INTERVAL != 0 {
        return Err(ConsensusError::IntervalNotRounded {
            parent: parent.timestamp,
            current: header.timestamp,
        }
        .into());
    }

    if header.timestamp > now + BLOCK_INTERVAL {
        return Err(ProcessError::FutureBlock);
    }

    if header.gas_used > header.gas_limit {
        return Err(ConsensusError::GasUsedExceedsLimit {
            gas_limit: header.gas_limit,
            gas_used: header.gas_used,
        }
        .into());
    }

    if header.total_score <= parent.total_score {
        return Err(ConsensusError::TotalScoreInvalid {
            parent: parent.total_score,
            current: header.total_score,
        }
        .into());
    }

    validate_gas_limit(header, parent)?;
    validate_signature_and_alpha(header, parent, spec)?;

    if header.com && !spec.forks.is_finality_active_at_block(header.number) {
        return Err(ConsensusError::ComUnexpected.into());
    }

    validate_base_fee(header, parent, spec)?;

    Ok(())
}

fn validate_gas_limit(header: &Header, parent: &Header) -> Result<(), ConsensusError> {
    let drift = header.gas_limit.abs_diff(parent.gas_limit);
    if drift > parent.gas_limit / GAS_LIMIT_BOUND_DIVISOR || header.gas_limit < MIN_GAS_LIMIT {
        return Err(ConsensusError::GasLimitInvalid {
            parent: parent.gas_limit,
            current: header.gas_limit,
        });
    }
    Ok(())
}

fn validate_signature_and_alpha(
    header: &Header,
    parent: &Header,
    spec: &ChainSpec,
) -> Result<(), ConsensusError> {
    if !spec.forks.is_vip214_active_at_block(header.number) {
        if header.signature.len() != SIGNATURE_SIZE {
            return Err(ConsensusError::SignatureLengthInvalid {
                have: header.signature.len(),
                want: SIGNATURE_SIZE,
            });
        }
        if !header.alpha.is_empty() {
            return Err(ConsensusError::AlphaUnexpected);
        }
        return Ok(());
    }

    if header.signature.len() != COMPLEX_SIGNATURE_SIZE {
        return Err(ConsensusError::SignatureLengthInvalid {
            have: header.signature.len(),
            want: COMPLEX_SIGNATURE_SIZE,
        });
    }

    // the randomness chain continues the parent's beta, bootstrapping from
    // the parent's state root on the fork block
    let want: Bytes = match parent
        .beta()
        .map_err(|err| ConsensusError::VrfInvalid(err.to_string()))?
    {
        Some(beta) => Bytes::copy_from_slice(beta.as_slice()),
        None => Bytes::copy_from_slice(parent.state_root.as_slice()),
    };
    if header.alpha != want {
        return Err(ConsensusError::AlphaMismatch { have: header.alpha.clone(), want });
    }

    header
        .beta()
        .map_err(|err| ConsensusError::VrfInvalid(err.to_string()))?
        .ok_or_else(|| ConsensusError::VrfInvalid("randomness proof missing".to_string()))?;

    Ok(())
}

fn validate_base_fee(
    header: &Header,
    parent: &Header,
    spec: &ChainSpec,
) -> Result<(), ConsensusError> {
    if !spec.forks.is_galactica_active_at_block(header.number) {
        if let Some(have) = header.base_fee_per_gas {
            return Err(ConsensusError::BaseFeeUnexpected { have });
        }
        return Ok(());
    }

    let want = calc_base_fee(parent, spec);
    match header.base_fee_per_gas {
        Some(have) if have == want => Ok(()),
        have => Err(ConsensusError::BadBaseFee { have: have.unwrap_or(0), want }),
    }
}

/// Base fee a child of `parent` must carry.
///
/// The fee-market fork block starts at [`INITIAL_BASE_FEE`]; afterwards the
/// fee tracks the parent's gas usage against its gas target, moving by at
/// most `1/BASE_FEE_CHANGE_DENOMINATOR` per block and never dropping below
/// the initial fee.
pub fn calc_base_fee(parent: &Header, spec: &ChainSpec) -> u64 {
    if spec.forks.is_on_galactica_at_block(parent.number + 1) {
        return INITIAL_BASE_FEE;
    }

    let parent_base_fee = parent.base_fee_per_gas.unwrap_or(INITIAL_BASE_FEE);
    let gas_target = parent.gas_limit / ELASTICITY_MULTIPLIER;
    if gas_target == 0 {
        return parent_base_fee;
    }

    if parent.gas_used == gas_target {
        return parent_base_fee;
    }

    if parent.gas_used > gas_target {
        let delta = (parent_base_fee as u128 * (parent.gas_used - gas_target) as u128 /
            gas_target as u128 /
            BASE_FEE_CHANGE_DENOMINATOR as u128)
            .max(1) as u64;
        parent_base_fee.saturating_add(delta)
    } else {
        let delta = (parent_base_fee as u128 * (gas_target - parent.gas_used) as u128 /
            gas_target as u128 /
            BASE_FEE_CHANGE_DENOMINATOR as u128) as u64;
        parent_base_fee.saturating_sub(delta).max(INITIAL_BASE_FEE)
    }
}

/// Validates a block body: the transaction root and each transaction's
/// structural and temporal rules.
pub fn validate_block_body(block: &Block, spec: &ChainSpec) -> Result<(), ProcessError> {
    let header = &block.header;

    let txs_root = block.txs_root();
    if txs_root != header.txs_root {
        return Err(ConsensusError::TxsRootMismatch {
            have: txs_root,
            want: header.txs_root,
        }
        .into());
    }

    for tx in &block.transactions {
        let origin = tx
            .origin()
            .map_err(|err| ConsensusError::SignerUnavailable(err.to_string()))?;
        let delegator = tx
            .delegator()
            .map_err(|err| ConsensusError::SignerUnavailable(err.to_string()))?;

        if delegator.is_some() && !spec.forks.is_vip191_active_at_block(header.number) {
            return Err(ConsensusError::TxFeaturesInvalid {
                id: tx.id().unwrap_or_default(),
            }
            .into());
        }

        if spec.forks.is_blocklist_active_at_block(header.number) {
            if spec.is_blocked(&origin) {
                return Err(ConsensusError::OriginBlocked { address: origin }.into());
            }
            if let Some(delegator) = delegator {
                if spec.is_blocked(&delegator) {
                    return Err(ConsensusError::OriginBlocked { address: delegator }.into());
                }
            }
        }

        if tx.transaction.chain_tag() != spec.chain_tag {
            return Err(ConsensusError::TxChainTagMismatch {
                have: tx.transaction.chain_tag(),
                want: spec.chain_tag,
            }
            .into());
        }

        let ref_number = tx.transaction.block_ref_number();
        if ref_number >= header.number {
            return Err(ConsensusError::TxRefFuture {
                ref_number,
                block_number: header.number,
            }
            .into());
        }

        if tx.transaction.is_expired(header.number) {
            return Err(ConsensusError::TxExpired { id: tx.id().unwrap_or_default() }.into());
        }

        if tx.transaction.tx_type() == TxType::DynamicFee &&
            !spec.forks.is_galactica_active_at_block(header.number)
        {
            return Err(ConsensusError::TxTypeUnsupported {
                tx_type: TxType::DynamicFee as u8,
            }
            .into());
        }

        if !tx.transaction.test_features(header.txs_features) {
            return Err(ConsensusError::TxFeaturesInvalid {
                id: tx.id().unwrap_or_default(),
            }
            .into());
        }

        let intrinsic = tx.transaction.intrinsic_gas();
        if tx.transaction.gas() < intrinsic {
            return Err(ConsensusError::IntrinsicGasExceeded {
                intrinsic,
                provided: tx.transaction.gas(),
            }
            .into());
        }
    }

    Ok(())
}
