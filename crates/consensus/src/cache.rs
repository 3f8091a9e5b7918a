//! Post-block validator-set snapshot cache.

use crate::{
    builtin::{AUTHORITY_CONTRACT, PARAMS_CONTRACT, STAKER_CONTRACT},
    validator_set::{CandidateSet, ValidatorSet},
};
use alloy_primitives::B256;
use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use thor_primitives::{Header, Receipt};
use tracing::trace;

const VALIDATOR_SET_CACHE_NUM: usize = 16;

/// LRU of validator-set snapshots keyed by block id. A hit for a parent id
/// spares re-reading the candidate list from state.
#[derive(Debug)]
pub struct ValidatorSetCache {
    inner: RwLock<LruCache<B256, ValidatorSet>>,
}

impl Default for ValidatorSetCache {
    fn default() -> Self {
        Self {
            inner: RwLock::new(LruCache::new(
                NonZeroUsize::new(VALIDATOR_SET_CACHE_NUM).unwrap(),
            )),
        }
    }
}

impl ValidatorSetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot stored for `block_id`, if any.
    pub fn get(&self, block_id: &B256) -> Option<ValidatorSet> {
        self.inner.write().get(block_id).cloned()
    }

    /// Stores the post-block snapshot for `block_id`.
    pub fn put(&self, block_id: B256, set: ValidatorSet) {
        self.inner.write().put(block_id, set);
    }
}

/// Decides, after a block verified, whether its candidate-set snapshot may be
/// cached.
///
/// Holds the snapshot as it stood after the schedule's activity updates; the
/// block's receipts decide its fate:
/// - an authority-contract event invalidates the whole snapshot (the list
///   itself may have changed), so nothing is cached;
/// - a params or (once dPoS is near) staker event, or a VET transfer touching
///   an endorsor, can only change the endorsement check, so the candidate
///   list is kept and the derived proposer subset dropped.
#[derive(Debug)]
pub struct PoaCacher {
    set: CandidateSet,
    watch_staker: bool,
}

impl PoaCacher {
    pub const fn new(set: CandidateSet, watch_staker: bool) -> Self {
        Self { set, watch_staker }
    }

    /// Applies the invalidation rules and returns the snapshot to cache, if
    /// any.
    pub fn handle(mut self, header: &Header, receipts: &[Receipt]) -> Option<ValidatorSet> {
        let mut proposers_stale = false;

        for receipt in receipts {
            for event in receipt.events() {
                if event.address == *AUTHORITY_CONTRACT {
                    trace!(
                        target: "consensus::cache",
                        number = header.number, "authority event, snapshot dropped"
                    );
                    return None;
                }
                if event.address == *PARAMS_CONTRACT ||
                    (self.watch_staker && event.address == *STAKER_CONTRACT)
                {
                    proposers_stale = true;
                }
            }
            for transfer in receipt.transfers() {
                if self.set.is_endorsor(&transfer.sender) ||
                    self.set.is_endorsor(&transfer.recipient)
                {
                    proposers_stale = true;
                }
            }
        }

        if proposers_stale {
            self.set.invalidate_proposers();
        }
        Some(ValidatorSet::Authority(self.set))
    }
}
