//! Merkle root derivation for block contents.

use crate::{Receipt, TransactionSigned};
use alloy_primitives::B256;
use alloy_rlp::Encodable;
use alloy_trie::root::ordered_trie_root_with_encoder;

/// Calculates the transaction root of a block body.
pub fn calculate_txs_root(transactions: &[TransactionSigned]) -> B256 {
    ordered_trie_root_with_encoder(transactions, |tx, buf| tx.encode(buf))
}

/// Calculates the receipt root of an executed block.
pub fn calculate_receipts_root(receipts: &[Receipt]) -> B256 {
    ordered_trie_root_with_encoder(receipts, |receipt, buf| receipt.encode(buf))
}
