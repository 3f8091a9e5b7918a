//! The authority registry: the ordered PoA candidate list.

use super::{record_key, slot_key, AUTHORITY_CONTRACT};
use alloy_primitives::{Address, B256};
use lazy_static::lazy_static;
use thor_primitives::Candidate;
use thor_provider::{ProviderError, State, StateExt};

lazy_static! {
    static ref KEY_CANDIDATE_LIST: B256 = slot_key("candidate-list");
}

fn candidate_masters<S: State>(state: &S) -> Result<Vec<Address>, ProviderError> {
    Ok(state
        .get_stored::<Vec<Address>>(&AUTHORITY_CONTRACT, &KEY_CANDIDATE_LIST)?
        .unwrap_or_default())
}

fn store_masters<S: State>(state: &mut S, masters: &Vec<Address>) -> Result<(), ProviderError> {
    state.put_stored(*AUTHORITY_CONTRACT, *KEY_CANDIDATE_LIST, masters)
}

/// Looks up a candidate record by master address.
pub fn get<S: State>(state: &S, master: &Address) -> Result<Option<Candidate>, ProviderError> {
    state.get_stored(&AUTHORITY_CONTRACT, &record_key("candidate", master))
}

fn put<S: State>(state: &mut S, candidate: &Candidate) -> Result<(), ProviderError> {
    state.put_stored(
        *AUTHORITY_CONTRACT,
        record_key("candidate", &candidate.master),
        candidate,
    )
}

/// The full candidate list in registration order.
pub fn all_candidates<S: State>(state: &S) -> Result<Vec<Candidate>, ProviderError> {
    candidate_masters(state)?
        .iter()
        .map(|master| {
            get(state, master)?.ok_or_else(|| {
                ProviderError::Corrupted(format!("listed candidate {master} has no record"))
            })
        })
        .collect()
}

/// Registers a new candidate. Returns `false` when the master is taken.
pub fn add<S: State>(
    state: &mut S,
    master: Address,
    endorsor: Address,
    identity: B256,
) -> Result<bool, ProviderError> {
    if get(state, &master)?.is_some() {
        return Ok(false);
    }

    let mut masters = candidate_masters(state)?;
    masters.push(master);
    store_masters(state, &masters)?;
    put(state, &Candidate { master, endorsor, identity, active: true })?;
    Ok(true)
}

/// Unregisters a candidate. Returns `false` when it was not listed.
pub fn revoke<S: State>(state: &mut S, master: &Address) -> Result<bool, ProviderError> {
    let mut masters = candidate_masters(state)?;
    let Some(position) = masters.iter().position(|m| m == master) else {
        return Ok(false);
    };

    masters.remove(position);
    store_masters(state, &masters)?;
    state.set_storage(
        *AUTHORITY_CONTRACT,
        record_key("candidate", master),
        Default::default(),
    )?;
    Ok(true)
}

/// Flips a candidate's activity bit. Returns `false` when it is not listed.
pub fn update<S: State>(
    state: &mut S,
    master: &Address,
    active: bool,
) -> Result<bool, ProviderError> {
    let Some(mut candidate) = get(state, master)? else {
        return Ok(false);
    };
    candidate.active = active;
    put(state, &candidate)?;
    Ok(true)
}
