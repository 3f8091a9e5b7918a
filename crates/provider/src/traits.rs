use crate::ProviderError;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rlp::{Decodable, Encodable};
use thor_primitives::{block_number_of, BlockNumber, BlockSummary, Receipt, TransactionSigned};

/// Where a transaction landed on a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxMeta {
    /// Id of the including block.
    pub block_id: B256,
    /// Whether execution was reverted.
    pub reverted: bool,
}

impl TxMeta {
    /// Number of the including block.
    pub fn block_number(&self) -> BlockNumber {
        block_number_of(&self.block_id)
    }
}

/// Read access to the block repository.
pub trait BlockStore {
    /// The ancestry view type produced by [`Self::new_chain`].
    type Chain: Chain;

    /// Looks up a stored block summary by id.
    fn get_block_summary(&self, id: &B256) -> Result<Option<BlockSummary>, ProviderError>;

    /// Creates a view over the ancestors of `head_id` (inclusive).
    fn new_chain(&self, head_id: B256) -> Self::Chain;
}

/// A linear view over one branch of the repository.
pub trait Chain {
    /// Id of the branch's genesis block.
    fn genesis_id(&self) -> Result<B256, ProviderError>;

    /// Looks up where a transaction landed within this branch.
    fn get_transaction_meta(&self, tx_id: &B256) -> Result<Option<TxMeta>, ProviderError>;

    /// Whether the branch contains `tx_id` at or above `since` block number.
    fn has_transaction(&self, tx_id: &B256, since: BlockNumber) -> Result<bool, ProviderError> {
        Ok(self
            .get_transaction_meta(tx_id)?
            .is_some_and(|meta| meta.block_number() >= since))
    }
}

/// Opens state views at committed roots.
pub trait Stater {
    /// The state view type.
    type State: State;

    /// Opens a fresh mutable view rooted at `root`.
    fn new_state(&self, root: B256) -> Result<Self::State, ProviderError>;
}

/// Version tag of a staged state commit.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StageVersion {
    /// Block number the stage belongs to.
    pub major: BlockNumber,
    /// Conflict counter distinguishing competing blocks at one number.
    pub minor: u32,
}

/// A mutable view over account state.
///
/// Between blocks the underlying store is immutable; all mutations go through
/// a view and only reach the store when its [`Stage`] is committed.
pub trait State {
    /// The speculative-commit type.
    type Stage: Stage;

    /// VET balance of an account.
    fn balance(&self, address: &Address) -> Result<U256, ProviderError>;

    /// Sets the VET balance of an account.
    fn set_balance(&mut self, address: Address, balance: U256) -> Result<(), ProviderError>;

    /// Code of an account.
    fn code(&self, address: &Address) -> Result<Bytes, ProviderError>;

    /// Sets the code of an account.
    fn set_code(&mut self, address: Address, code: Bytes) -> Result<(), ProviderError>;

    /// Raw storage value of an account; empty when unset.
    fn storage(&self, address: &Address, key: &B256) -> Result<Bytes, ProviderError>;

    /// Sets a raw storage value. Empty bytes delete the entry.
    fn set_storage(&mut self, address: Address, key: B256, value: Bytes)
        -> Result<(), ProviderError>;

    /// Batches all mutations made through this view into a stage.
    fn stage(&mut self, version: StageVersion) -> Result<Self::Stage, ProviderError>;
}

/// Typed storage access on top of the raw byte interface.
pub trait StateExt: State {
    /// Decodes a stored rlp value; `None` when the slot is empty.
    fn get_stored<T: Decodable>(
        &self,
        address: &Address,
        key: &B256,
    ) -> Result<Option<T>, ProviderError> {
        let raw = self.storage(address, key)?;
        if raw.is_empty() {
            return Ok(None);
        }
        T::decode(&mut raw.as_ref())
            .map(Some)
            .map_err(|err| ProviderError::Corrupted(err.to_string()))
    }

    /// Encodes and stores an rlp value.
    fn put_stored<T: Encodable>(
        &mut self,
        address: Address,
        key: B256,
        value: &T,
    ) -> Result<(), ProviderError> {
        let mut out = Vec::new();
        value.encode(&mut out);
        self.set_storage(address, key, Bytes::from(out))
    }
}

impl<S: State> StateExt for S {}

/// A batch of speculative state mutations.
pub trait Stage {
    /// Root the state would have after committing.
    fn hash(&self) -> B256;

    /// Persists the batch and returns the committed root.
    fn commit(self) -> Result<B256, ProviderError>;
}

/// Execution context a block provides to every transaction in it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlockContext {
    /// Reward recipient of the block.
    pub beneficiary: Address,
    /// The block proposer.
    pub signer: Address,
    pub number: BlockNumber,
    pub timestamp: u64,
    pub gas_limit: u64,
    pub total_score: u64,
    /// Present once the fee market is active.
    pub base_fee: Option<u64>,
}

/// Fatal transaction-execution error.
///
/// Anything recoverable (a revert) is expressed in the receipt instead.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum ExecutorError {
    /// The sender signature could not be resolved.
    #[error("bad transaction signature: {0}")]
    BadSignature(String),

    /// The gas provided does not cover the intrinsic cost.
    #[error("intrinsic gas {intrinsic} exceeds provided gas {provided}")]
    IntrinsicGasExceeded { intrinsic: u64, provided: u64 },

    /// The gas payer cannot cover the up-front energy cost.
    #[error("account {payer} has insufficient energy for gas")]
    InsufficientEnergy { payer: Address },

    /// The backing store failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// The transaction runtime: a black box turning transactions into receipts
/// against a mutable state.
pub trait TransactionExecutor<S: State> {
    /// Executes one transaction, mutating `state` and producing its receipt.
    fn execute_transaction(
        &self,
        state: &mut S,
        ctx: &BlockContext,
        tx: &TransactionSigned,
    ) -> Result<Receipt, ExecutorError>;
}
