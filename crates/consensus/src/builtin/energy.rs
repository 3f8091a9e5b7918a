//! The energy (VTHO) ledger.
//!
//! Energy accrues on VET balances over time at [`ENERGY_GROWTH_RATE`] and is
//! settled lazily whenever an account is touched. Growth halts chain-wide at
//! the dPoS activation timestamp; from then on energy only moves, it is no
//! longer minted.

use super::{record_key, slot_key, ENERGY_CONTRACT, STAKER_CONTRACT};
use crate::builtin::{params, staker};
use alloy_primitives::{Address, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use lazy_static::lazy_static;
use thor_chainspec::{ENERGY_GROWTH_RATE, VET};
use thor_provider::{ProviderError, State, StateExt};
use tracing::trace;

lazy_static! {
    static ref KEY_GROWTH_STOP: B256 = slot_key("energy-growth-stop");
}

/// Default reward ratio when the parameter was never set: 30%, 1e18-scaled.
const DEFAULT_REWARD_RATIO: u64 = 300_000_000_000_000_000;

#[derive(Debug, Default, Clone, RlpEncodable, RlpDecodable)]
struct EnergyAccount {
    balance: U256,
    updated: u64,
}

/// Timestamp at which energy growth stopped, if it has.
pub fn growth_stop<S: State>(state: &S) -> Result<Option<u64>, ProviderError> {
    Ok(state.get_stored::<u64>(&ENERGY_CONTRACT, &KEY_GROWTH_STOP)?.filter(|ts| *ts != 0))
}

/// Halts energy growth at `timestamp`. Later calls keep the earliest stop.
pub fn stop_growth<S: State>(state: &mut S, timestamp: u64) -> Result<(), ProviderError> {
    if growth_stop(state)?.is_some() {
        return Ok(());
    }
    trace!(target: "consensus::energy", timestamp, "energy growth stopped");
    state.put_stored(*ENERGY_CONTRACT, *KEY_GROWTH_STOP, &timestamp)
}

fn load<S: State>(state: &S, address: &Address) -> Result<EnergyAccount, ProviderError> {
    Ok(state
        .get_stored::<EnergyAccount>(&ENERGY_CONTRACT, &record_key("account", address))?
        .unwrap_or_default())
}

fn store<S: State>(
    state: &mut S,
    address: &Address,
    account: &EnergyAccount,
) -> Result<(), ProviderError> {
    state.put_stored(*ENERGY_CONTRACT, record_key("account", address), account)
}

fn settled_balance<S: State>(
    state: &S,
    account: &EnergyAccount,
    address: &Address,
    now: u64,
) -> Result<U256, ProviderError> {
    // accounts generate only once first touched
    if account.updated == 0 {
        return Ok(account.balance);
    }

    let until = growth_stop(state)?.map_or(now, |stop| stop.min(now));
    let elapsed = until.saturating_sub(account.updated);
    if elapsed == 0 {
        return Ok(account.balance);
    }

    let vet = state.balance(address)?;
    let grown = vet * U256::from(ENERGY_GROWTH_RATE) * U256::from(elapsed) / U256::from(VET);
    Ok(account.balance + grown)
}

/// Energy balance of an account at `now`.
pub fn get<S: State>(state: &S, address: &Address, now: u64) -> Result<U256, ProviderError> {
    let account = load(state, address)?;
    settled_balance(state, &account, address, now)
}

/// Credits energy to an account, settling accrued growth first.
pub fn add<S: State>(
    state: &mut S,
    address: &Address,
    now: u64,
    amount: U256,
) -> Result<(), ProviderError> {
    let account = load(state, address)?;
    let balance = settled_balance(state, &account, address, now)?;
    store(state, address, &EnergyAccount { balance: balance + amount, updated: now })
}

/// Debits energy from an account. Returns `false` when the balance does not
/// cover `amount`; the state is left untouched in that case.
pub fn sub<S: State>(
    state: &mut S,
    address: &Address,
    now: u64,
    amount: U256,
) -> Result<bool, ProviderError> {
    let account = load(state, address)?;
    let balance = settled_balance(state, &account, address, now)?;
    if balance < amount {
        return Ok(false);
    }
    store(state, address, &EnergyAccount { balance: balance - amount, updated: now })?;
    Ok(true)
}

/// Pays out the staker reward pool for one block.
///
/// The pool is the staker contract's own energy balance, fed by transaction
/// fees while dPoS is active. The configured reward ratio goes to the block
/// beneficiary; the remainder goes to the signing validator's reward
/// beneficiary.
pub fn distribute_rewards<S: State>(
    state: &mut S,
    beneficiary: Address,
    signer: Address,
    now: u64,
) -> Result<(), ProviderError> {
    let pool = get(state, &STAKER_CONTRACT, now)?;
    if pool.is_zero() {
        return Ok(());
    }

    let ratio = params::get(state, &params::KEY_REWARD_RATIO)?
        .unwrap_or_else(|| U256::from(DEFAULT_REWARD_RATIO));
    let to_beneficiary = pool * ratio / U256::from(VET);
    let to_validator = pool - to_beneficiary;

    let validator_beneficiary = staker::get(state, &signer)?
        .map_or(signer, |validation| validation.reward_beneficiary(signer));

    sub(state, &STAKER_CONTRACT, now, pool)?;
    add(state, &beneficiary, now, to_beneficiary)?;
    add(state, &validator_beneficiary, now, to_validator)?;
    trace!(
        target: "consensus::energy",
        %beneficiary, %validator_beneficiary, ?pool, "staker rewards distributed"
    );
    Ok(())
}
