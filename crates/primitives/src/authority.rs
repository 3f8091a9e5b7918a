use alloy_primitives::{Address, B256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// An authority-contract entry.
#[derive(
    Debug, Default, Clone, PartialEq, Eq, RlpEncodable, RlpDecodable, Serialize, Deserialize,
)]
pub struct Candidate {
    /// The block-signing address.
    pub master: Address,
    /// The address holding the endorsement balance.
    pub endorsor: Address,
    /// Opaque identity commitment of the candidate.
    pub identity: B256,
    /// Whether the candidate is currently considered live by the schedule.
    pub active: bool,
}
