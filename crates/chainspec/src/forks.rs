use serde::{Deserialize, Serialize};

/// Block number at which a fork never activates.
pub const NEVER: u32 = u32::MAX;

/// Block numbers at which incompatible consensus rules activate.
///
/// `0` means active from genesis, [`NEVER`] means never.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForkConfig {
    /// Origin/delegator block-list enforcement.
    pub blocklist: u32,
    /// Designated gas payer (fee delegation).
    pub vip191: u32,
    /// Randomness-seeded proposer scheduling.
    pub vip214: u32,
    /// Finality vote flag in headers.
    pub finality: u32,
    /// Base fee and dynamic-fee transactions.
    pub galactica: u32,
    /// Delegated proof of stake introduction.
    pub hayabusa: u32,
    /// Length in blocks of the dPoS transition period.
    pub hayabusa_tp: u32,
}

impl Default for ForkConfig {
    fn default() -> Self {
        Self {
            blocklist: NEVER,
            vip191: NEVER,
            vip214: NEVER,
            finality: NEVER,
            galactica: NEVER,
            hayabusa: NEVER,
            hayabusa_tp: NEVER,
        }
    }
}

impl ForkConfig {
    /// A config with every fork active from genesis and a one-block
    /// transition period.
    pub const fn latest() -> Self {
        Self {
            blocklist: 0,
            vip191: 0,
            vip214: 0,
            finality: 0,
            galactica: 0,
            hayabusa: 0,
            hayabusa_tp: 1,
        }
    }

    /// Convenience method to check if the block-list fork is active at a given
    /// block.
    pub const fn is_blocklist_active_at_block(&self, block_number: u32) -> bool {
        block_number >= self.blocklist
    }

    /// Convenience method to check if fee delegation is active at a given
    /// block.
    pub const fn is_vip191_active_at_block(&self, block_number: u32) -> bool {
        block_number >= self.vip191
    }

    /// Convenience method to check if seeded scheduling is active at a given
    /// block.
    pub const fn is_vip214_active_at_block(&self, block_number: u32) -> bool {
        block_number >= self.vip214
    }

    /// Convenience method to check if the finality flag is allowed at a given
    /// block.
    pub const fn is_finality_active_at_block(&self, block_number: u32) -> bool {
        block_number >= self.finality
    }

    /// Convenience method to check if the fee market is active at a given
    /// block.
    pub const fn is_galactica_active_at_block(&self, block_number: u32) -> bool {
        block_number >= self.galactica
    }

    /// Convenience method to check if the fee market firstly activates at a
    /// given block.
    pub const fn is_on_galactica_at_block(&self, block_number: u32) -> bool {
        block_number == self.galactica
    }

    /// Convenience method to check if the dPoS fork is active at a given
    /// block.
    pub const fn is_hayabusa_active_at_block(&self, block_number: u32) -> bool {
        block_number >= self.hayabusa
    }

    /// First block at which the dPoS transition may complete.
    pub const fn hayabusa_transition_end(&self) -> u32 {
        self.hayabusa.saturating_add(self.hayabusa_tp)
    }

    /// Whether `block_number` lies in the dPoS transition window, during which
    /// queued stake may back an authority endorsement.
    pub const fn in_hayabusa_transition_window(&self, block_number: u32) -> bool {
        block_number >= self.hayabusa && block_number < self.hayabusa_transition_end()
    }
}
