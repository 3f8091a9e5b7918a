//! Validator-set snapshots.
//!
//! A snapshot is a plain value: cloning it copies the candidate list, so
//! cached entries never alias live state.

use crate::{
    builtin::{params, staker},
    scheduler::Proposer,
};
use alloy_primitives::{Address, U256};
use thor_chainspec::{min_validator_stake, ChainSpec};
use thor_primitives::{BlockNumber, Candidate, Validation};
use thor_provider::{ProviderError, State};

/// The authority candidate list with its lazily derived proposer subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
    /// Candidates whose endorsement held at derivation time. `None` when the
    /// derivation is stale.
    proposers: Option<Vec<Proposer>>,
}

impl CandidateSet {
    pub const fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates, proposers: None }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Whether `address` is the endorsor of any candidate.
    pub fn is_endorsor(&self, address: &Address) -> bool {
        self.candidates.iter().any(|c| c.endorsor == *address)
    }

    /// The cached proposer subset, when still valid.
    pub fn proposers(&self) -> Option<&[Proposer]> {
        self.proposers.as_deref()
    }

    /// Drops the derived proposer subset, forcing a re-derivation.
    pub fn invalidate_proposers(&mut self) {
        self.proposers = None;
    }

    /// Applies an activity flip to the candidate and any derived proposer
    /// entry.
    pub fn apply_update(&mut self, address: &Address, active: bool) {
        if let Some(candidate) = self.candidates.iter_mut().find(|c| c.master == *address) {
            candidate.active = active;
        }
        if let Some(proposers) = &mut self.proposers {
            if let Some(proposer) = proposers.iter_mut().find(|p| p.address == *address) {
                proposer.active = active;
            }
        }
    }

    /// Filters candidates by the endorsement check, caching the result.
    pub fn pick_proposers<S: State>(
        &mut self,
        state: &S,
        spec: &ChainSpec,
        block_number: BlockNumber,
    ) -> Result<&[Proposer], ProviderError> {
        if self.proposers.is_none() {
            let threshold = params::get(state, &params::KEY_PROPOSER_ENDORSEMENT)?
                .unwrap_or_else(min_validator_stake);
            let in_transition = spec.forks.in_hayabusa_transition_window(block_number);

            let mut proposers = Vec::with_capacity(self.candidates.len());
            for candidate in &self.candidates {
                if endorsement_holds(state, candidate, threshold, in_transition)? {
                    proposers.push(Proposer {
                        address: candidate.master,
                        active: candidate.active,
                    });
                }
            }
            self.proposers = Some(proposers);
        }
        Ok(self.proposers.as_deref().unwrap())
    }
}

/// Whether a candidate's endorsement passes the balance check.
///
/// During the dPoS transition window, VET already queued in the staker
/// contract keeps counting towards the endorsement.
fn endorsement_holds<S: State>(
    state: &S,
    candidate: &Candidate,
    threshold: U256,
    in_transition: bool,
) -> Result<bool, ProviderError> {
    let balance = state.balance(&candidate.endorsor)?;
    if balance >= threshold {
        return Ok(true);
    }
    if !in_transition {
        return Ok(false);
    }
    let queued = staker::queued_stake_of_endorsor(state, &candidate.endorsor)?;
    Ok(balance + queued >= threshold)
}

/// The post-block validator set stored in the snapshot cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatorSet {
    /// Authority candidates, PoA.
    Authority(CandidateSet),
    /// Leader group masters in slot order, dPoS.
    Leaders(Vec<Address>),
}

/// Extracts the slot-ordered master list of a leader group.
pub fn leader_masters(group: &[(Address, Validation)]) -> Vec<Address> {
    group.iter().map(|(master, _)| *master).collect()
}
