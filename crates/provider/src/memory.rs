//! In-memory reference implementations of the storage interfaces. They back
//! the consensus test suites and single-process dev nodes; production engines
//! plug in through the same traits.

use crate::{
    BlockStore, Chain, ProviderError, Stage, StageVersion, State, Stater, TxMeta,
};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use thor_primitives::{Block, BlockSummary, Receipt};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Account {
    balance: U256,
    code: Bytes,
    storage: BTreeMap<B256, Bytes>,
}

type Accounts = BTreeMap<Address, Account>;

fn compute_root(accounts: &Accounts) -> B256 {
    let mut buf = Vec::new();
    for (address, account) in accounts {
        if account.balance.is_zero() && account.code.is_empty() && account.storage.is_empty() {
            continue;
        }
        buf.extend_from_slice(address.as_slice());
        buf.extend_from_slice(&account.balance.to_be_bytes::<32>());
        buf.extend_from_slice(keccak256(&account.code).as_slice());
        for (key, value) in &account.storage {
            buf.extend_from_slice(key.as_slice());
            buf.extend_from_slice(keccak256(value).as_slice());
        }
    }
    keccak256(&buf)
}

/// Root of the empty state.
pub(crate) fn empty_root() -> B256 {
    compute_root(&Accounts::new())
}

#[derive(Debug, Default)]
struct StaterInner {
    snapshots: HashMap<B256, Accounts>,
}

/// An in-memory [`Stater`] holding committed snapshots keyed by root.
#[derive(Debug, Clone)]
pub struct MemoryStater {
    inner: Arc<RwLock<StaterInner>>,
}

impl Default for MemoryStater {
    fn default() -> Self {
        let mut inner = StaterInner::default();
        inner.snapshots.insert(empty_root(), Accounts::new());
        Self { inner: Arc::new(RwLock::new(inner)) }
    }
}

impl MemoryStater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root of the empty state, usable as a genesis starting point.
    pub fn empty_root(&self) -> B256 {
        empty_root()
    }
}

impl Stater for MemoryStater {
    type State = MemoryState;

    fn new_state(&self, root: B256) -> Result<MemoryState, ProviderError> {
        let accounts = self
            .inner
            .read()
            .snapshots
            .get(&root)
            .cloned()
            .ok_or(ProviderError::StateRootNotFound(root))?;
        Ok(MemoryState { inner: self.inner.clone(), accounts })
    }
}

/// A mutable account-state view copied out of a [`MemoryStater`] snapshot.
#[derive(Debug)]
pub struct MemoryState {
    inner: Arc<RwLock<StaterInner>>,
    accounts: Accounts,
}

impl State for MemoryState {
    type Stage = MemoryStage;

    fn balance(&self, address: &Address) -> Result<U256, ProviderError> {
        Ok(self.accounts.get(address).map(|acc| acc.balance).unwrap_or_default())
    }

    fn set_balance(&mut self, address: Address, balance: U256) -> Result<(), ProviderError> {
        self.accounts.entry(address).or_default().balance = balance;
        Ok(())
    }

    fn code(&self, address: &Address) -> Result<Bytes, ProviderError> {
        Ok(self.accounts.get(address).map(|acc| acc.code.clone()).unwrap_or_default())
    }

    fn set_code(&mut self, address: Address, code: Bytes) -> Result<(), ProviderError> {
        self.accounts.entry(address).or_default().code = code;
        Ok(())
    }

    fn storage(&self, address: &Address, key: &B256) -> Result<Bytes, ProviderError> {
        Ok(self
            .accounts
            .get(address)
            .and_then(|acc| acc.storage.get(key).cloned())
            .unwrap_or_default())
    }

    fn set_storage(
        &mut self,
        address: Address,
        key: B256,
        value: Bytes,
    ) -> Result<(), ProviderError> {
        let account = self.accounts.entry(address).or_default();
        if value.is_empty() {
            account.storage.remove(&key);
        } else {
            account.storage.insert(key, value);
        }
        Ok(())
    }

    fn stage(&mut self, version: StageVersion) -> Result<MemoryStage, ProviderError> {
        Ok(MemoryStage {
            inner: self.inner.clone(),
            accounts: self.accounts.clone(),
            root: compute_root(&self.accounts),
            version,
        })
    }
}

/// A speculative snapshot awaiting commit.
#[derive(Debug)]
pub struct MemoryStage {
    inner: Arc<RwLock<StaterInner>>,
    accounts: Accounts,
    root: B256,
    #[allow(dead_code)]
    version: StageVersion,
}

impl Stage for MemoryStage {
    fn hash(&self) -> B256 {
        self.root
    }

    fn commit(self) -> Result<B256, ProviderError> {
        self.inner.write().snapshots.insert(self.root, self.accounts);
        Ok(self.root)
    }
}

#[derive(Debug, Clone)]
struct StoredBlock {
    summary: BlockSummary,
    // tx id -> reverted
    tx_results: HashMap<B256, bool>,
}

#[derive(Debug, Default)]
struct StoreInner {
    blocks: HashMap<B256, StoredBlock>,
}

/// An in-memory block repository.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlockStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a block together with its execution results.
    pub fn insert_block(&self, block: &Block, receipts: &[Receipt]) -> Result<B256, ProviderError> {
        let summary = block
            .summarize()
            .map_err(|err| ProviderError::Corrupted(err.to_string()))?;
        let id = summary.id;

        let mut tx_results = HashMap::with_capacity(summary.txs.len());
        for (tx_id, receipt) in summary.txs.iter().zip(receipts) {
            tx_results.insert(*tx_id, receipt.reverted);
        }

        self.inner.write().blocks.insert(id, StoredBlock { summary, tx_results });
        Ok(id)
    }
}

impl BlockStore for MemoryBlockStore {
    type Chain = MemoryChain;

    fn get_block_summary(&self, id: &B256) -> Result<Option<BlockSummary>, ProviderError> {
        Ok(self.inner.read().blocks.get(id).map(|stored| stored.summary.clone()))
    }

    fn new_chain(&self, head_id: B256) -> MemoryChain {
        MemoryChain { inner: self.inner.clone(), head_id }
    }
}

/// Ancestry view over a [`MemoryBlockStore`] branch.
#[derive(Debug, Clone)]
pub struct MemoryChain {
    inner: Arc<RwLock<StoreInner>>,
    head_id: B256,
}

impl MemoryChain {
    fn walk<T>(
        &self,
        mut visit: impl FnMut(&StoredBlock) -> Option<T>,
    ) -> Result<Option<T>, ProviderError> {
        let inner = self.inner.read();
        let mut cursor = self.head_id;
        loop {
            let Some(stored) = inner.blocks.get(&cursor) else {
                // walked past the oldest stored block
                return Ok(None);
            };
            if let Some(found) = visit(stored) {
                return Ok(Some(found));
            }
            if stored.summary.header.number == 0 {
                return Ok(None);
            }
            cursor = stored.summary.header.parent_id;
        }
    }
}

impl Chain for MemoryChain {
    fn genesis_id(&self) -> Result<B256, ProviderError> {
        self.walk(|stored| (stored.summary.header.number == 0).then_some(stored.summary.id))?
            .ok_or(ProviderError::BlockNotFound(self.head_id))
    }

    fn get_transaction_meta(&self, tx_id: &B256) -> Result<Option<TxMeta>, ProviderError> {
        self.walk(|stored| {
            stored
                .tx_results
                .get(tx_id)
                .map(|&reverted| TxMeta { block_id: stored.summary.id, reverted })
        })
    }
}
