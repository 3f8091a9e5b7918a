use alloy_primitives::B256;

/// Error raised by a storage backend.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum ProviderError {
    /// The referenced block is not stored.
    #[error("block {0} not found")]
    BlockNotFound(B256),

    /// No state is stored under the given root.
    #[error("state root {0} not found")]
    StateRootNotFound(B256),

    /// A stored value failed to decode.
    #[error("corrupted storage entry: {0}")]
    Corrupted(String),
}
