//! The PoA→dPoS hardfork engine.

use crate::builtin::staker;
use alloy_primitives::Address;
use thor_chainspec::ChainSpec;
use thor_primitives::{BlockNumber, Validation};
use thor_provider::{ProviderError, State};
use tracing::debug;

/// Outcome of the per-block staking synchronisation.
#[derive(Debug, Default)]
pub struct PosStatus {
    /// Whether dPoS governs this block.
    pub active: bool,
    /// Whether the switch happened during this very call. The caller must
    /// halt energy growth at the block timestamp.
    pub just_activated: bool,
    /// The leader group after housekeeping; `None` right at activation and
    /// under PoA.
    pub leader_group: Option<Vec<(Address, Validation)>>,
}

/// Runs the staking side of block processing.
///
/// Before the end of the transition window this is a no-op and PoA stays in
/// charge. At transition checkpoints an inactive staker contract attempts the
/// switch; once active, every processed block runs housekeeping and yields
/// the current leader group.
pub fn sync_pos<S: State>(
    state: &mut S,
    number: BlockNumber,
    spec: &ChainSpec,
) -> Result<PosStatus, ProviderError> {
    let forks = &spec.forks;
    if number < forks.hayabusa_transition_end() {
        return Ok(PosStatus::default());
    }

    if staker::is_active(state)? {
        let (removed, leader_group) = staker::housekeep(state, number)?;
        if !removed.is_empty() {
            debug!(target: "consensus", number, ?removed, "offline validators evicted");
        }
        return Ok(PosStatus { active: true, just_activated: false, leader_group: Some(leader_group) });
    }

    if forks.hayabusa_tp != 0 &&
        number % forks.hayabusa_tp == 0 &&
        staker::transition(state, number)?
    {
        debug!(target: "consensus", number, "proof of stake activated");
        return Ok(PosStatus { active: true, just_activated: true, leader_group: None });
    }

    Ok(PosStatus::default())
}
