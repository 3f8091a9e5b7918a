//! Epoch entropy for seeded proposer scheduling.

use crate::{ConsensusError, ProcessError};
use alloy_primitives::{keccak256, Bytes, B256};
use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use thor_chainspec::EPOCH_INTERVAL;
use thor_provider::BlockStore;

const SEED_CACHE_NUM: usize = 16;

/// Derives the scheduling seed for a block from its ancestry.
///
/// The seed of a child of `parent` hashes, oldest first, the `beta` values of
/// the blocks from just past the previous epoch boundary up to the parent.
/// When no block in that span carries a beta (right after the randomness fork
/// activates), the oldest visited header's state root stands in.
#[derive(Debug)]
pub struct Seeder {
    cache: RwLock<LruCache<B256, Bytes>>,
}

impl Default for Seeder {
    fn default() -> Self {
        Self {
            cache: RwLock::new(LruCache::new(NonZeroUsize::new(SEED_CACHE_NUM).unwrap())),
        }
    }
}

impl Seeder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The seed scheduling children of `parent_id`. Deterministic per chain.
    pub fn generate<B: BlockStore>(
        &self,
        store: &B,
        parent_id: &B256,
    ) -> Result<Bytes, ProcessError> {
        if let Some(seed) = self.cache.write().get(parent_id) {
            return Ok(seed.clone());
        }

        let parent = store
            .get_block_summary(parent_id)?
            .ok_or(ProcessError::ParentMissing)?;
        let parent_number = parent.header.number;
        let boundary = if parent_number % EPOCH_INTERVAL == 0 {
            parent_number.saturating_sub(EPOCH_INTERVAL)
        } else {
            parent_number - parent_number % EPOCH_INTERVAL
        };

        // walk parent → boundary (exclusive), newest first
        let mut betas = Vec::new();
        let mut fallback = parent.header.state_root;
        let mut cursor = parent;
        loop {
            if let Some(beta) = cursor
                .header
                .beta()
                .map_err(|err| ConsensusError::VrfInvalid(err.to_string()))?
            {
                betas.push(beta);
            }
            fallback = cursor.header.state_root;

            if cursor.header.number <= boundary.saturating_add(1) || cursor.header.number == 0 {
                break;
            }
            cursor = store
                .get_block_summary(&cursor.header.parent_id)?
                .ok_or(ProcessError::ParentMissing)?;
        }

        let seed = if betas.is_empty() {
            Bytes::copy_from_slice(fallback.as_slice())
        } else {
            let mut buf = Vec::with_capacity(betas.len() * 32);
            for beta in betas.iter().rev() {
                buf.extend_from_slice(beta.as_slice());
            }
            Bytes::copy_from_slice(keccak256(&buf).as_slice())
        };

        self.cache.write().put(*parent_id, seed.clone());
        Ok(seed)
    }
}
