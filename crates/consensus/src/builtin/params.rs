//! Key-value network parameters governed by on-chain authority.

use super::{slot_key, PARAMS_CONTRACT};
use alloy_primitives::{B256, U256};
use lazy_static::lazy_static;
use thor_provider::{ProviderError, State, StateExt};

lazy_static! {
    /// Energy price of one unit of gas for coefficient-priced transactions.
    pub static ref KEY_BASE_GAS_PRICE: B256 = slot_key("base-gas-price");
    /// Share of paid fees credited as reward, 1e18-scaled.
    pub static ref KEY_REWARD_RATIO: B256 = slot_key("reward-ratio");
    /// VET an endorsor must hold to back an authority proposer.
    pub static ref KEY_PROPOSER_ENDORSEMENT: B256 = slot_key("proposer-endorsement");
    /// Cap on simultaneously active proposers.
    pub static ref KEY_MAX_BLOCK_PROPOSERS: B256 = slot_key("max-block-proposers");
}

/// Reads a parameter; `None` when never set.
pub fn get<S: State>(state: &S, key: &B256) -> Result<Option<U256>, ProviderError> {
    state.get_stored(&PARAMS_CONTRACT, key)
}

/// Writes a parameter.
pub fn set<S: State>(state: &mut S, key: B256, value: U256) -> Result<(), ProviderError> {
    state.put_stored(*PARAMS_CONTRACT, key, &value)
}
