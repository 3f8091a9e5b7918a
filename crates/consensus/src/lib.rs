//! Thor block consensus: decides whether a candidate block extends its parent
//! validly, computes the post-state and produces receipts.
//!
//! Validation is layered leaves-first: stateless header and body checks,
//! proposer scheduling (PoA round-robin, seeded PoA, or the staking leader
//! group after the dPoS switch), then sequential execution with root
//! reconciliation. [`Consensus::process`] composes the layers.

#![allow(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use alloy_primitives::Address;
use std::{
    fmt::{Debug, Formatter},
    sync::Arc,
};
use thor_chainspec::ChainSpec;
use thor_primitives::{Block, BlockSummary, Header, Receipt, Validation};
use thor_provider::{BlockStore, State, Stater, TransactionExecutor};
use tracing::trace;

pub mod builtin;

mod cache;
pub use cache::{PoaCacher, ValidatorSetCache};

mod error;
pub use error::{ConsensusError, ProcessError};

mod scheduler;
pub use scheduler::{AuthorityUpdate, PoaScheduler, Proposer, Scheduler, StakingScheduler};

mod seeder;
pub use seeder::Seeder;

mod transition;
pub use transition::{sync_pos, PosStatus};

mod validation;
pub use validation::{calc_base_fee, validate_block_body, validate_block_header};

mod validator_set;
pub use validator_set::{leader_masters, CandidateSet, ValidatorSet};

mod verify;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

type StageOf<ST> = <<ST as Stater>::State as State>::Stage;

/// The consensus engine.
///
/// One instance serves the whole import pipeline; the validator-set snapshot
/// cache it owns is shared across [`Self::process`] calls, which the pipeline
/// serialises.
pub struct Consensus<B, ST, E> {
    spec: Arc<ChainSpec>,
    store: Arc<B>,
    stater: Arc<ST>,
    executor: E,
    seeder: Seeder,
    cache: ValidatorSetCache,
}

impl<B, ST, E> Consensus<B, ST, E>
where
    B: BlockStore,
    ST: Stater,
    E: TransactionExecutor<ST::State>,
{
    pub fn new(spec: Arc<ChainSpec>, store: Arc<B>, stater: Arc<ST>, executor: E) -> Self {
        Self {
            spec,
            store,
            stater,
            executor,
            seeder: Seeder::new(),
            cache: ValidatorSetCache::new(),
        }
    }

    pub fn spec(&self) -> &ChainSpec {
        &self.spec
    }

    /// Processes `block` against its parent's post-state.
    ///
    /// On success returns the staged (uncommitted) state and the receipts;
    /// committing the stage is the caller's decision. On any error the
    /// staged mutations are discarded with the state view.
    pub fn process(
        &self,
        parent: &BlockSummary,
        block: &Block,
        now: u64,
        block_conflicts: u32,
    ) -> Result<(StageOf<ST>, Vec<Receipt>), ProcessError> {
        let header = &block.header;
        if header.parent_id != parent.id {
            return Err(ProcessError::ParentMissing);
        }

        let mut state = self.stater.new_state(parent.header.state_root)?;

        let pos = sync_pos(&mut state, header.number, &self.spec)?;
        if let Some(group) = &pos.leader_group {
            self.cache.put(parent.id, ValidatorSet::Leaders(leader_masters(group)));
        }

        validate_block_header(header, &parent.header, now, &self.spec)?;

        let signer = header
            .signer()
            .map_err(|err| ConsensusError::SignerUnavailable(err.to_string()))?;

        let cacher = if pos.active {
            let group = match pos.leader_group {
                Some(group) => group,
                None => builtin::staker::leader_group(&state)?,
            };
            self.validate_staking_proposer(signer, header, &parent.header, &group)?;
            None
        } else {
            Some(self.validate_authority_proposer(&mut state, signer, header, parent)?)
        };

        if pos.just_activated {
            builtin::energy::stop_growth(&mut state, header.timestamp)?;
        }

        validate_block_body(block, &self.spec)?;

        let chain = self.store.new_chain(parent.id);
        let (stage, receipts) = verify::verify_block(
            &chain,
            &self.executor,
            &mut state,
            block,
            block_conflicts,
            pos.active,
        )?;

        if let Some(cacher) = cacher {
            let block_id = block
                .id()
                .map_err(|err| ConsensusError::SignerUnavailable(err.to_string()))?;
            if let Some(set) = cacher.handle(header, &receipts) {
                self.cache.put(block_id, set);
            }
        }

        Ok((stage, receipts))
    }

    /// Convenience wrapper resolving the parent from the store.
    pub fn process_block(
        &self,
        block: &Block,
        now: u64,
        block_conflicts: u32,
    ) -> Result<(StageOf<ST>, Vec<Receipt>), ProcessError> {
        let parent = self
            .store
            .get_block_summary(&block.header.parent_id)?
            .ok_or(ProcessError::ParentMissing)?;
        self.process(&parent, block, now, block_conflicts)
    }

    /// Validates the proposer of a staking block against the leader group.
    pub fn validate_staking_proposer(
        &self,
        signer: Address,
        header: &Header,
        parent: &Header,
        group: &[(Address, Validation)],
    ) -> Result<(), ProcessError> {
        let masters = leader_masters(group);
        let sched = Scheduler::new_staking(
            signer,
            &masters,
            self.spec.genesis_timestamp,
            parent.timestamp,
        )
        .ok_or(ConsensusError::SignerInvalid { signer })?;

        if !sched.is_scheduled_time(header.timestamp) {
            return Err(ConsensusError::TimestampUnscheduled {
                timestamp: header.timestamp,
                signer,
            }
            .into());
        }

        let (_, score) = sched.updates(header.timestamp);
        let want = parent.total_score + score;
        if header.total_score != want {
            return Err(ConsensusError::ScoreMismatch { have: header.total_score, want }.into());
        }
        Ok(())
    }

    /// Validates the proposer of an authority block.
    ///
    /// Applies the schedule's activity flips to both the on-state authority
    /// registry and the working snapshot, and returns the [`PoaCacher`] that
    /// decides, from the block's receipts, whether the snapshot may be
    /// cached.
    pub fn validate_authority_proposer(
        &self,
        state: &mut ST::State,
        signer: Address,
        header: &Header,
        parent: &BlockSummary,
    ) -> Result<PoaCacher, ProcessError> {
        let mut set = match self.cache.get(&parent.id) {
            Some(ValidatorSet::Authority(set)) => {
                trace!(target: "consensus", number = header.number, "candidate snapshot hit");
                set
            }
            _ => CandidateSet::new(builtin::authority::all_candidates(state)?),
        };

        let proposers = set.pick_proposers(state, &self.spec, header.number)?.to_vec();

        let sched = if self.spec.forks.is_vip214_active_at_block(header.number) {
            let seed = self.seeder.generate(self.store.as_ref(), &parent.id)?;
            Scheduler::new_v2(signer, &proposers, seed, parent.header.timestamp)
        } else {
            Scheduler::new_v1(signer, &proposers, parent.header.number, parent.header.timestamp)
        }
        .ok_or(ConsensusError::SignerInvalid { signer })?;

        if !sched.is_scheduled_time(header.timestamp) {
            return Err(ConsensusError::TimestampUnscheduled {
                timestamp: header.timestamp,
                signer,
            }
            .into());
        }

        let (updates, score) = sched.updates(header.timestamp);
        let want = parent.header.total_score + score;
        if header.total_score != want {
            return Err(ConsensusError::ScoreMismatch { have: header.total_score, want }.into());
        }

        for (address, active) in &updates {
            builtin::authority::update(state, address, *active)?;
            set.apply_update(address, *active);
        }

        Ok(PoaCacher::new(
            set,
            self.spec.forks.is_hayabusa_active_at_block(header.number),
        ))
    }
}

impl<B, ST, E> Debug for Consensus<B, ST, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consensus").field("spec", &self.spec).finish_non_exhaustive()
    }
}
