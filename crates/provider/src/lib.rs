//! Narrow interfaces the consensus core consumes from the rest of the node:
//! the block repository, the state trie and the transaction runtime. Backing
//! engines are black boxes behind these traits; this crate additionally ships
//! in-memory implementations backing tests and dev tooling.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod error;
pub use error::ProviderError;

mod traits;
pub use traits::{
    BlockContext, BlockStore, Chain, ExecutorError, Stage, StageVersion, State, StateExt, Stater,
    TransactionExecutor, TxMeta,
};

mod memory;
pub use memory::{MemoryBlockStore, MemoryChain, MemoryStage, MemoryState, MemoryStater};
