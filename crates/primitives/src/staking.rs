use crate::BlockNumber;
use alloy_primitives::{Address, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a staker validator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ValidationStatus {
    /// Waiting for a free slot in the leader group.
    #[default]
    Queued = 0,
    /// Member of the leader group.
    Active = 1,
    /// Leaving; stake is draining through the unlock pipeline.
    Exit = 2,
}

/// A staker validator record.
///
/// Staked VET is partitioned by how close it is to being withdrawable:
/// `queued` before activation, `locked` while active, then
/// `pending_unlock → cooldown → withdrawable` after an exit.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// The stake-providing address.
    pub endorsor: Address,
    /// Reward recipient; the master address when unset.
    pub beneficiary: Option<Address>,
    /// Scheduling weight.
    pub weight: U256,
    /// Length of one staking iteration in blocks.
    pub period: u32,
    /// Iterations completed while active.
    pub completed_iterations: u32,
    pub status: ValidationStatus,
    /// Block at which the validator became active.
    pub start_block: BlockNumber,
    /// Block at which an exit was initiated.
    pub exit_block: Option<BlockNumber>,
    /// Block at which the validator was last reported offline.
    pub offline_block: Option<BlockNumber>,
    /// Stake backing an active validator.
    pub locked_vet: U256,
    /// Stake released by an exit, not yet cooled down.
    pub pending_unlock_vet: U256,
    /// Stake waiting for activation.
    pub queued_vet: U256,
    /// Stake in the cooldown window.
    pub cooldown_vet: U256,
    /// Stake free to withdraw.
    pub withdrawable_vet: U256,
}

impl Validation {
    /// Total VET currently bound to this validation.
    pub fn total_stake(&self) -> U256 {
        self.locked_vet +
            self.pending_unlock_vet +
            self.queued_vet +
            self.cooldown_vet +
            self.withdrawable_vet
    }

    /// Whether all stake has drained out of the record.
    pub fn is_drained(&self) -> bool {
        self.total_stake().is_zero()
    }

    /// Reward recipient for this validator, given its master address.
    pub fn reward_beneficiary(&self, master: Address) -> Address {
        self.beneficiary.unwrap_or(master)
    }
}

/// Storage form of [`Validation`]; rlp has no optionals, so absent block
/// numbers are stored as zero and absent beneficiaries as the zero address.
#[derive(Debug, Default, Clone, RlpEncodable, RlpDecodable)]
pub struct StoredValidation {
    pub endorsor: Address,
    pub beneficiary: Address,
    pub weight: U256,
    pub period: u32,
    pub completed_iterations: u32,
    pub status: u8,
    pub start_block: BlockNumber,
    pub exit_block: BlockNumber,
    pub offline_block: BlockNumber,
    pub locked_vet: U256,
    pub pending_unlock_vet: U256,
    pub queued_vet: U256,
    pub cooldown_vet: U256,
    pub withdrawable_vet: U256,
}

impl From<&Validation> for StoredValidation {
    fn from(v: &Validation) -> Self {
        Self {
            endorsor: v.endorsor,
            beneficiary: v.beneficiary.unwrap_or_default(),
            weight: v.weight,
            period: v.period,
            completed_iterations: v.completed_iterations,
            status: v.status as u8,
            start_block: v.start_block,
            exit_block: v.exit_block.unwrap_or_default(),
            offline_block: v.offline_block.unwrap_or_default(),
            locked_vet: v.locked_vet,
            pending_unlock_vet: v.pending_unlock_vet,
            queued_vet: v.queued_vet,
            cooldown_vet: v.cooldown_vet,
            withdrawable_vet: v.withdrawable_vet,
        }
    }
}

impl From<StoredValidation> for Validation {
    fn from(v: StoredValidation) -> Self {
        let status = match v.status {
            1 => ValidationStatus::Active,
            2 => ValidationStatus::Exit,
            _ => ValidationStatus::Queued,
        };
        Self {
            endorsor: v.endorsor,
            beneficiary: (!v.beneficiary.is_zero()).then_some(v.beneficiary),
            weight: v.weight,
            period: v.period,
            completed_iterations: v.completed_iterations,
            status,
            start_block: v.start_block,
            exit_block: (v.exit_block != 0).then_some(v.exit_block),
            offline_block: (v.offline_block != 0).then_some(v.offline_block),
            locked_vet: v.locked_vet,
            pending_unlock_vet: v.pending_unlock_vet,
            queued_vet: v.queued_vet,
            cooldown_vet: v.cooldown_vet,
            withdrawable_vet: v.withdrawable_vet,
        }
    }
}
