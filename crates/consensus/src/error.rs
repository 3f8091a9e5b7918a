use alloy_primitives::{Address, Bytes, B256};
use thor_provider::{ExecutorError, ProviderError};

/// A consensus rule violation. Fatal to the offending block.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum ConsensusError {
    /// Block number does not follow the parent's.
    #[error("block number invalid: parent {parent}, current {current}")]
    BlockNumberInvalid { parent: u32, current: u32 },

    /// Block timestamp does not advance past the parent's.
    #[error("block timestamp behind parents: parent {parent}, current {current}")]
    TimestampBehindParent { parent: u64, current: u64 },

    /// Block timestamp is off the round grid.
    #[error("block interval not rounded: parent {parent}, current {current}")]
    IntervalNotRounded { parent: u64, current: u64 },

    /// Gas used overruns the block gas limit.
    #[error("block gas used exceeds limit: limit {gas_limit}, used {gas_used}")]
    GasUsedExceedsLimit { gas_limit: u64, gas_used: u64 },

    /// Gas limit drifted too far from the parent's or fell below the floor.
    #[error("block gas limit invalid: parent {parent}, current {current}")]
    GasLimitInvalid { parent: u64, current: u64 },

    /// Total score does not advance past the parent's.
    #[error("block total score invalid: parent {parent}, current {current}")]
    TotalScoreInvalid { parent: u64, current: u64 },

    /// The schedule yields a different score than the header claims.
    #[error("block total score invalid: have {have}, want {want}")]
    ScoreMismatch { have: u64, want: u64 },

    /// Signature byte length does not match the active fork's layout.
    #[error("block signature length invalid: have {have}, want {want}")]
    SignatureLengthInvalid { have: usize, want: usize },

    /// Alpha must be absent before the randomness fork.
    #[error("block alpha unexpected before fork")]
    AlphaUnexpected,

    /// Alpha does not continue the randomness chain.
    #[error("block alpha invalid: have {have}, want {want}")]
    AlphaMismatch { have: Bytes, want: Bytes },

    /// The randomness proof failed to verify.
    #[error("block randomness proof invalid: {0}")]
    VrfInvalid(String),

    /// The finality flag is not allowed yet.
    #[error("block com flag unexpected before fork")]
    ComUnexpected,

    /// Base fee must be absent before the fee-market fork.
    #[error("block baseFee unexpected: have {have}")]
    BaseFeeUnexpected { have: u64 },

    /// Base fee does not follow from the parent.
    #[error("block baseFee invalid: have {have}, want {want}")]
    BadBaseFee { have: u64, want: u64 },

    /// A signer could not be recovered.
    #[error("signer unavailable: {0}")]
    SignerUnavailable(String),

    /// The block signer is not an eligible proposer.
    #[error("block signer invalid: {signer} unauthorized")]
    SignerInvalid { signer: Address },

    /// The block signer holds no slot at the header timestamp.
    #[error("block timestamp unscheduled: timestamp {timestamp}, signer {signer}")]
    TimestampUnscheduled { timestamp: u64, signer: Address },

    /// Transaction root mismatch.
    #[error("block txs root mismatch: have {have}, want {want}")]
    TxsRootMismatch { have: B256, want: B256 },

    /// Receipts root mismatch after execution.
    #[error("block receipts root mismatch: have {have}, want {want}")]
    ReceiptsRootMismatch { have: B256, want: B256 },

    /// Gas used mismatch after execution.
    #[error("block gas used mismatch: have {have}, want {want}")]
    GasUsedMismatch { have: u64, want: u64 },

    /// State root mismatch after execution.
    #[error("block state root mismatch: have {have}, want {want}")]
    StateRootMismatch { have: B256, want: B256 },

    /// Transaction carries a foreign chain tag.
    #[error("tx chain tag mismatch: have {have}, want {want}")]
    TxChainTagMismatch { have: u8, want: u8 },

    /// Transaction references a block the chain has not reached.
    #[error("tx ref future block: ref {ref_number}, current {block_number}")]
    TxRefFuture { ref_number: u32, block_number: u32 },

    /// Transaction expired before this block.
    #[error("tx expired: id {id}")]
    TxExpired { id: B256 },

    /// Transaction type not yet activated.
    #[error("tx type unsupported: type {tx_type}")]
    TxTypeUnsupported { tx_type: u8 },

    /// Transaction uses features the block does not support.
    #[error("tx features invalid: id {id}")]
    TxFeaturesInvalid { id: B256 },

    /// Transaction gas does not cover the intrinsic cost.
    #[error("tx intrinsic gas exceeded: intrinsic {intrinsic}, provided {provided}")]
    IntrinsicGasExceeded { intrinsic: u64, provided: u64 },

    /// Origin or delegator is on the block list.
    #[error("tx origin blocked: {address}")]
    OriginBlocked { address: Address },

    /// The transaction was already included within its window.
    #[error("tx already exists: id {id}")]
    TxAlreadyExists { id: B256 },

    /// The declared dependency is not part of the chain.
    #[error("tx dep broken: id {id}, dep {dep}")]
    TxDepBroken { id: B256, dep: B256 },

    /// The declared dependency was reverted.
    #[error("tx dep reverted: id {id}, dep {dep}")]
    TxDepReverted { id: B256, dep: B256 },
}

/// Outcome of processing a block.
///
/// Only [`ProcessError::Consensus`] condemns the block; the two marker
/// variants ask the import pipeline to retry later.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum ProcessError {
    /// The header timestamp is beyond the wall clock plus one interval.
    /// Requeue, do not reject.
    #[error("block in the future")]
    FutureBlock,

    /// The parent block is not stored yet.
    #[error("parent block missing")]
    ParentMissing,

    /// The block violates a consensus rule.
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// A storage backend failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The runtime reported a fatal execution error.
    #[error("tx execution failed: {0}")]
    Execution(#[from] ExecutorError),
}

impl ProcessError {
    /// Whether the block itself is to blame.
    pub const fn is_consensus_failure(&self) -> bool {
        matches!(self, Self::Consensus(_))
    }
}
