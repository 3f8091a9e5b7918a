//! Native contract accessors.
//!
//! The authority list, network parameters, energy ledger and staker registry
//! live at preset addresses and are manipulated directly through state
//! storage rather than through the runtime.

use alloy_primitives::{keccak256, Address, B256};
use lazy_static::lazy_static;
use std::str::FromStr;

pub mod authority;
pub mod energy;
pub mod params;
pub mod staker;

lazy_static! {
    // preset contracts
    pub static ref AUTHORITY_CONTRACT: Address =
        Address::from_str("0x0000000000000000000000417574686f72697479").unwrap();
    pub static ref ENERGY_CONTRACT: Address =
        Address::from_str("0x0000000000000000000000000000456e65726779").unwrap();
    pub static ref PARAMS_CONTRACT: Address =
        Address::from_str("0x0000000000000000000000000000506172616d73").unwrap();
    pub static ref STAKER_CONTRACT: Address =
        Address::from_str("0x00000000000000000000000000005374616b6572").unwrap();
}

/// Storage key of a named slot.
pub(crate) fn slot_key(name: &str) -> B256 {
    keccak256(name.as_bytes())
}

/// Storage key of a per-address record under a named prefix.
pub(crate) fn record_key(prefix: &str, address: &Address) -> B256 {
    let mut buf = Vec::with_capacity(prefix.len() + 20);
    buf.extend_from_slice(prefix.as_bytes());
    buf.extend_from_slice(address.as_slice());
    keccak256(&buf)
}
