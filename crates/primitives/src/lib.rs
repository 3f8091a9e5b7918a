//! Commonly used types for the Thor chain: block headers, transactions,
//! receipts, authority candidates and staking validations.

#![allow(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use alloy_primitives::{self, keccak256, Address, Bytes, B256, U256};

mod authority;
pub use authority::Candidate;

mod block;
pub use block::{Block, BlockSummary};

mod crypto;
pub use crypto::{public_key_to_address, recover_signer, sign_hash, SignatureError};

mod header;
pub use header::{
    block_number_of, compose_block_id, Header, COMPLEX_SIGNATURE_SIZE, SIGNATURE_SIZE,
};

pub mod proofs;

mod receipt;
pub use receipt::{Event, Output, Receipt, Transfer};

mod staking;
pub use staking::{StoredValidation, Validation, ValidationStatus};

pub mod transaction;
pub use transaction::{
    block_ref_of, sign_transaction, Clause, DynamicFeeTransaction, Features, LegacyTransaction,
    Transaction, TransactionSigned, TxType,
};

pub mod vrf;

/// A block number. The high 32 bits of a block id encode it.
pub type BlockNumber = u32;
