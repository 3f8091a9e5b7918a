use crate::{proofs, Header, SignatureError, TransactionSigned, B256};

/// A sealed block: header plus transaction list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<TransactionSigned>,
}

impl Block {
    pub const fn new(header: Header, transactions: Vec<TransactionSigned>) -> Self {
        Self { header, transactions }
    }

    /// Block id, see [`Header::id`].
    pub fn id(&self) -> Result<B256, SignatureError> {
        self.header.id()
    }

    /// Merkle root of the transaction list.
    pub fn txs_root(&self) -> B256 {
        proofs::calculate_txs_root(&self.transactions)
    }

    /// Reduces the block to its summary.
    pub fn summarize(&self) -> Result<BlockSummary, SignatureError> {
        Ok(BlockSummary {
            id: self.id()?,
            header: self.header.clone(),
            txs: self
                .transactions
                .iter()
                .map(|tx| tx.id())
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

/// A stored block's header together with its transaction ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSummary {
    /// Cached block id.
    pub id: B256,
    pub header: Header,
    /// Transaction ids in block order.
    pub txs: Vec<B256>,
}
