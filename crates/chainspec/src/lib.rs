//! Thor network parameters: protocol constants, the hardfork schedule and
//! per-network chain specs.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use alloy_primitives::{address, b256, Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

mod forks;
pub use forks::{ForkConfig, NEVER};

/// Seconds between consecutive rounds.
pub const BLOCK_INTERVAL: u64 = 10;

/// Rounds per epoch; scopes the scheduling-seed derivation.
pub const EPOCH_INTERVAL: u32 = 180;

/// Upper bound on the number of simultaneously active block proposers.
pub const MAX_BLOCK_PROPOSERS: u64 = 101;

/// Base fee of the first fee-market block, also the base-fee floor, in wei.
pub const INITIAL_BASE_FEE: u64 = 10_000_000_000_000;

/// Bounds how fast the base fee may move between blocks.
pub const BASE_FEE_CHANGE_DENOMINATOR: u64 = 8;

/// Ratio of gas limit to gas target.
pub const ELASTICITY_MULTIPLIER: u64 = 2;

/// Maximum relative gas-limit drift per block, as `parent_limit / divisor`.
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;

/// Network floor for the block gas limit.
pub const MIN_GAS_LIMIT: u64 = 10_000_000;

/// How many ancestors the runtime exposes for block-ref resolution.
pub const BLOCK_REF_WINDOW: u32 = 256;

/// Wei per VET.
pub const VET: u128 = 1_000_000_000_000_000_000;

/// Energy generated per `10^18` wei of VET per second, in wei.
pub const ENERGY_GROWTH_RATE: u64 = 5_000_000_000;

/// Minimum VET stake backing a staker validator, in wei.
pub fn min_validator_stake() -> U256 {
    U256::from(25_000_000u64) * U256::from(VET)
}

/// Blocks an exiting validator's stake spends pending unlock.
pub const UNBONDING_PERIOD: u32 = 30;

/// Blocks an exiting validator's stake spends cooling down after unlock.
pub const COOLDOWN_PERIOD: u32 = 60;

/// Blocks of inactivity after which housekeeping evicts an offline validator.
pub const OFFLINE_EVICTION_DELAY: u32 = 360;

/// Default length of one staking iteration in blocks.
pub const DEFAULT_STAKING_PERIOD: u32 = 30;

/// Network parameters shared by every component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSpec {
    /// One-byte network identifier mixed into every transaction.
    pub chain_tag: u8,
    /// Id of the genesis block.
    pub genesis_id: B256,
    /// Timestamp of the genesis block; anchors round numbering.
    pub genesis_timestamp: u64,
    /// Transaction features the network supports.
    pub txs_features: u32,
    /// Addresses barred from originating or sponsoring transactions once the
    /// block-list fork is active.
    pub blocked: HashSet<Address>,
    /// The hardfork schedule.
    pub forks: ForkConfig,
}

impl ChainSpec {
    /// The production network.
    pub fn mainnet() -> Self {
        Self {
            chain_tag: 0x4a,
            genesis_id: b256!("00000000851caf3cfdb6e899cf5958bfb1ac3413d346d43539627e6be7ec1b4a"),
            genesis_timestamp: 1_530_316_800,
            txs_features: 1,
            blocked: [
                address!("e427d02c2690924d0a154c108f9f9e0edc7d4b39"),
                address!("d802a148f38aba4759879c33e8d04e0a501bce27"),
            ]
            .into_iter()
            .collect(),
            forks: ForkConfig {
                blocklist: 4_817_300,
                vip191: 3_337_300,
                vip214: 9_254_300,
                finality: 13_815_000,
                galactica: 22_084_200,
                hayabusa: NEVER,
                hayabusa_tp: 8_640,
            },
        }
    }

    /// The public test network.
    pub fn testnet() -> Self {
        Self {
            chain_tag: 0x27,
            genesis_id: b256!("000000000b2bce3c70bc649a02749e8687721b09ed2e15997f466536b20bb127"),
            genesis_timestamp: 1_530_014_400,
            txs_features: 1,
            blocked: HashSet::new(),
            forks: ForkConfig {
                blocklist: 0,
                vip191: 2_898_800,
                vip214: 10_653_500,
                finality: 14_989_900,
                galactica: 24_098_000,
                hayabusa: 27_827_000,
                hayabusa_tp: 8_640,
            },
        }
    }

    /// A single-node development network with every fork live from the start.
    pub fn dev() -> Self {
        Self {
            chain_tag: 0xf6,
            genesis_id: B256::with_last_byte(0xf6),
            genesis_timestamp: 1_700_000_000,
            txs_features: 1,
            blocked: HashSet::new(),
            forks: ForkConfig::latest(),
        }
    }

    /// Whether `address` may not originate or sponsor transactions.
    pub fn is_blocked(&self, address: &Address) -> bool {
        self.blocked.contains(address)
    }

    /// The round of a timestamp relative to genesis.
    pub const fn round_of(&self, timestamp: u64) -> u64 {
        (timestamp - self.genesis_timestamp) / BLOCK_INTERVAL
    }
}
