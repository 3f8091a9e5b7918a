//! The staker registry backing delegated proof of stake.
//!
//! Validators queue with a VET stake, get activated into the leader group up
//! to the proposer cap, and drain their stake through
//! `locked → pending unlock → cooldown → withdrawable` when they leave.

use super::{params, record_key, slot_key, STAKER_CONTRACT};
use alloy_primitives::{Address, B256, U256};
use lazy_static::lazy_static;
use thor_chainspec::{
    min_validator_stake, COOLDOWN_PERIOD, MAX_BLOCK_PROPOSERS, OFFLINE_EVICTION_DELAY,
    UNBONDING_PERIOD,
};
use thor_primitives::{BlockNumber, StoredValidation, Validation, ValidationStatus};
use thor_provider::{ProviderError, State, StateExt};
use tracing::{debug, trace};

lazy_static! {
    static ref KEY_ACTIVE: B256 = slot_key("staker-active");
    static ref KEY_VALIDATOR_LIST: B256 = slot_key("validator-list");
    static ref KEY_ACTIVE_ORDER: B256 = slot_key("active-order");
    static ref KEY_QUEUED_ORDER: B256 = slot_key("queued-order");
}

/// Whether the contract has taken over block production.
pub fn is_active<S: State>(state: &S) -> Result<bool, ProviderError> {
    Ok(state.get_stored::<bool>(&STAKER_CONTRACT, &KEY_ACTIVE)?.unwrap_or(false))
}

fn set_active<S: State>(state: &mut S) -> Result<(), ProviderError> {
    state.put_stored(*STAKER_CONTRACT, *KEY_ACTIVE, &true)
}

fn address_list<S: State>(state: &S, key: &B256) -> Result<Vec<Address>, ProviderError> {
    Ok(state.get_stored::<Vec<Address>>(&STAKER_CONTRACT, key)?.unwrap_or_default())
}

fn store_address_list<S: State>(
    state: &mut S,
    key: B256,
    list: &Vec<Address>,
) -> Result<(), ProviderError> {
    state.put_stored(*STAKER_CONTRACT, key, list)
}

/// Looks up a validation record by master address.
pub fn get<S: State>(state: &S, master: &Address) -> Result<Option<Validation>, ProviderError> {
    Ok(state
        .get_stored::<StoredValidation>(&STAKER_CONTRACT, &record_key("validation", master))?
        .map(Validation::from))
}

fn put<S: State>(
    state: &mut S,
    master: &Address,
    validation: &Validation,
) -> Result<(), ProviderError> {
    state.put_stored(
        *STAKER_CONTRACT,
        record_key("validation", master),
        &StoredValidation::from(validation),
    )
}

fn delete<S: State>(state: &mut S, master: &Address) -> Result<(), ProviderError> {
    state.set_storage(*STAKER_CONTRACT, record_key("validation", master), Default::default())
}

/// All registered validators with their records, in registration order.
pub fn all<S: State>(state: &S) -> Result<Vec<(Address, Validation)>, ProviderError> {
    address_list(state, &KEY_VALIDATOR_LIST)?
        .into_iter()
        .map(|master| {
            get(state, &master)?
                .map(|validation| (master, validation))
                .ok_or_else(|| {
                    ProviderError::Corrupted(format!("listed validator {master} has no record"))
                })
        })
        .collect()
}

/// The leader group in slot order.
pub fn leader_group<S: State>(state: &S) -> Result<Vec<(Address, Validation)>, ProviderError> {
    address_list(state, &KEY_ACTIVE_ORDER)?
        .into_iter()
        .map(|master| {
            get(state, &master)?
                .map(|validation| (master, validation))
                .ok_or_else(|| {
                    ProviderError::Corrupted(format!("active validator {master} has no record"))
                })
        })
        .collect()
}

/// Queued stake backing `endorsor`, counted across all queued validations.
pub fn queued_stake_of_endorsor<S: State>(
    state: &S,
    endorsor: &Address,
) -> Result<U256, ProviderError> {
    let mut total = U256::ZERO;
    for (_, validation) in all(state)? {
        if validation.endorsor == *endorsor {
            total += validation.queued_vet;
        }
    }
    Ok(total)
}

/// Queues a new validator backed by `stake` drawn from the endorsor's VET.
///
/// Returns `false` without touching state when the master is already
/// registered, the stake is below the minimum, or the endorsor cannot cover
/// it.
pub fn add_validation<S: State>(
    state: &mut S,
    master: Address,
    endorsor: Address,
    beneficiary: Option<Address>,
    period: u32,
    stake: U256,
) -> Result<bool, ProviderError> {
    if get(state, &master)?.is_some() || stake < min_validator_stake() {
        return Ok(false);
    }
    let endorsor_balance = state.balance(&endorsor)?;
    if endorsor_balance < stake {
        return Ok(false);
    }

    // move the stake into the contract
    state.set_balance(endorsor, endorsor_balance - stake)?;
    let contract_balance = state.balance(&STAKER_CONTRACT)?;
    state.set_balance(*STAKER_CONTRACT, contract_balance + stake)?;

    let validation = Validation {
        endorsor,
        beneficiary,
        weight: stake,
        period,
        status: ValidationStatus::Queued,
        queued_vet: stake,
        ..Default::default()
    };
    put(state, &master, &validation)?;

    let mut validators = address_list(state, &KEY_VALIDATOR_LIST)?;
    validators.push(master);
    store_address_list(state, *KEY_VALIDATOR_LIST, &validators)?;

    let mut queued = address_list(state, &KEY_QUEUED_ORDER)?;
    queued.push(master);
    store_address_list(state, *KEY_QUEUED_ORDER, &queued)?;

    trace!(target: "consensus::staker", %master, %endorsor, ?stake, "validator queued");
    Ok(true)
}

fn max_proposers<S: State>(state: &S) -> Result<usize, ProviderError> {
    Ok(params::get(state, &params::KEY_MAX_BLOCK_PROPOSERS)?
        .map_or(MAX_BLOCK_PROPOSERS, |v| v.saturating_to::<u64>()) as usize)
}

fn activate_queued<S: State>(state: &mut S, number: BlockNumber) -> Result<usize, ProviderError> {
    let cap = max_proposers(state)?;
    let mut active = address_list(state, &KEY_ACTIVE_ORDER)?;
    let mut queued = address_list(state, &KEY_QUEUED_ORDER)?;
    let mut activated = 0;

    while active.len() < cap && !queued.is_empty() {
        let master = queued.remove(0);
        let Some(mut validation) = get(state, &master)? else {
            continue;
        };
        validation.status = ValidationStatus::Active;
        validation.locked_vet += validation.queued_vet;
        validation.queued_vet = U256::ZERO;
        validation.start_block = number;
        validation.completed_iterations = 0;
        put(state, &master, &validation)?;
        active.push(master);
        activated += 1;
    }

    if activated > 0 {
        store_address_list(state, *KEY_ACTIVE_ORDER, &active)?;
        store_address_list(state, *KEY_QUEUED_ORDER, &queued)?;
    }
    Ok(activated)
}

/// Attempts the PoA→dPoS switch at a transition checkpoint.
///
/// Activates queued validators up to the proposer cap and flips the contract
/// active. Returns `false`, leaving PoA in charge, when nobody is queued.
pub fn transition<S: State>(state: &mut S, number: BlockNumber) -> Result<bool, ProviderError> {
    if is_active(state)? {
        return Ok(true);
    }
    if activate_queued(state, number)? == 0 {
        return Ok(false);
    }

    set_active(state)?;
    debug!(target: "consensus::staker", number, "staking activated");
    Ok(true)
}

/// Marks a validator offline as of `number`. Used by the block-packing side
/// when a leader skips its slot; validation never calls this.
pub fn report_offline<S: State>(
    state: &mut S,
    master: &Address,
    number: BlockNumber,
) -> Result<(), ProviderError> {
    let Some(mut validation) = get(state, master)? else { return Ok(()) };
    if validation.offline_block.is_none() {
        validation.offline_block = Some(number);
        put(state, master, &validation)?;
    }
    Ok(())
}

/// Begins an exit: the validator leaves the leader group and its locked stake
/// enters the unlock pipeline.
pub fn initiate_exit<S: State>(
    state: &mut S,
    master: &Address,
    number: BlockNumber,
) -> Result<bool, ProviderError> {
    let Some(mut validation) = get(state, master)? else { return Ok(false) };
    if validation.status == ValidationStatus::Exit {
        return Ok(false);
    }

    validation.status = ValidationStatus::Exit;
    validation.exit_block = Some(number);
    validation.pending_unlock_vet += validation.locked_vet + validation.queued_vet;
    validation.locked_vet = U256::ZERO;
    validation.queued_vet = U256::ZERO;
    put(state, master, &validation)?;

    let mut active = address_list(state, &KEY_ACTIVE_ORDER)?;
    active.retain(|m| m != master);
    store_address_list(state, *KEY_ACTIVE_ORDER, &active)?;
    let mut queued = address_list(state, &KEY_QUEUED_ORDER)?;
    queued.retain(|m| m != master);
    store_address_list(state, *KEY_QUEUED_ORDER, &queued)?;

    trace!(target: "consensus::staker", %master, number, "validator exit initiated");
    Ok(true)
}

/// Pays out withdrawable stake back to the endorsor. Fully drained records
/// are removed from the registry.
pub fn withdraw<S: State>(state: &mut S, master: &Address) -> Result<U256, ProviderError> {
    let Some(mut validation) = get(state, master)? else { return Ok(U256::ZERO) };
    let amount = validation.withdrawable_vet;
    if amount.is_zero() {
        return Ok(U256::ZERO);
    }

    validation.withdrawable_vet = U256::ZERO;
    let contract_balance = state.balance(&STAKER_CONTRACT)?;
    state.set_balance(*STAKER_CONTRACT, contract_balance - amount)?;
    let endorsor_balance = state.balance(&validation.endorsor)?;
    state.set_balance(validation.endorsor, endorsor_balance + amount)?;

    if validation.is_drained() && validation.status == ValidationStatus::Exit {
        delete(state, master)?;
        let mut validators = address_list(state, &KEY_VALIDATOR_LIST)?;
        validators.retain(|m| m != master);
        store_address_list(state, *KEY_VALIDATOR_LIST, &validators)?;
    } else {
        put(state, master, &validation)?;
    }
    Ok(amount)
}

/// Periodic maintenance run once per processed block while staking is active.
///
/// Advances staking iterations, activates queued validators into free leader
/// slots, evicts leaders that stayed offline past the tolerance and moves
/// exiting stake down the unlock pipeline. Returns the masters evicted during
/// this pass and the resulting leader group.
pub fn housekeep<S: State>(
    state: &mut S,
    number: BlockNumber,
) -> Result<(Vec<Address>, Vec<(Address, Validation)>), ProviderError> {
    let mut removed = Vec::new();

    // evict leaders that stayed offline beyond the tolerance
    for master in address_list(state, &KEY_ACTIVE_ORDER)? {
        let Some(validation) = get(state, &master)? else { continue };
        if let Some(offline) = validation.offline_block {
            if number.saturating_sub(offline) >= OFFLINE_EVICTION_DELAY {
                initiate_exit(state, &master, number)?;
                removed.push(master);
            }
        }
    }

    // advance completed iterations of period-aligned leaders
    for master in address_list(state, &KEY_ACTIVE_ORDER)? {
        let Some(mut validation) = get(state, &master)? else { continue };
        if validation.period != 0 &&
            number > validation.start_block &&
            (number - validation.start_block) % validation.period == 0
        {
            validation.completed_iterations += 1;
            put(state, &master, &validation)?;
        }
    }

    // move exiting stake down the unlock pipeline
    for (master, mut validation) in all(state)? {
        let Some(exit) = validation.exit_block else { continue };
        let mut dirty = false;

        if number >= exit.saturating_add(UNBONDING_PERIOD) &&
            !validation.pending_unlock_vet.is_zero()
        {
            validation.cooldown_vet += validation.pending_unlock_vet;
            validation.pending_unlock_vet = U256::ZERO;
            dirty = true;
        }
        if number >= exit.saturating_add(UNBONDING_PERIOD).saturating_add(COOLDOWN_PERIOD) &&
            !validation.cooldown_vet.is_zero()
        {
            validation.withdrawable_vet += validation.cooldown_vet;
            validation.cooldown_vet = U256::ZERO;
            dirty = true;
        }
        if dirty {
            put(state, &master, &validation)?;
        }
    }

    activate_queued(state, number)?;

    Ok((removed, leader_group(state)?))
}
