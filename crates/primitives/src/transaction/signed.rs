use super::Transaction;
use crate::crypto::{self, SignatureError};
use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_rlp::Encodable;

const SIG_SIZE: usize = 65;

/// A transaction with its signature.
///
/// Delegated transactions carry two concatenated signatures: the origin's,
/// then the fee delegator's over the delegator signing hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSigned {
    /// The unsigned body.
    pub transaction: Transaction,
    /// 65 bytes, or 130 for delegated transactions.
    pub signature: Bytes,
}

impl TransactionSigned {
    pub const fn new(transaction: Transaction, signature: Bytes) -> Self {
        Self { transaction, signature }
    }

    /// Recovers the transaction sender.
    pub fn origin(&self) -> Result<Address, SignatureError> {
        let expected = if self.transaction.features().is_delegated() {
            2 * SIG_SIZE
        } else {
            SIG_SIZE
        };
        if self.signature.len() != expected {
            return Err(SignatureError::InvalidLength(self.signature.len()));
        }

        crypto::recover_signer(&self.transaction.signing_hash(), &self.signature[..SIG_SIZE])
    }

    /// Recovers the fee delegator, if the delegated feature bit is set.
    pub fn delegator(&self) -> Result<Option<Address>, SignatureError> {
        if !self.transaction.features().is_delegated() {
            return Ok(None);
        }
        let origin = self.origin()?;

        crypto::recover_signer(
            &self.transaction.delegator_signing_hash(&origin),
            &self.signature[SIG_SIZE..],
        )
        .map(Some)
    }

    /// The account charged for gas: the delegator when present, else the
    /// origin.
    pub fn gas_payer(&self) -> Result<Address, SignatureError> {
        match self.delegator()? {
            Some(delegator) => Ok(delegator),
            None => self.origin(),
        }
    }

    /// The transaction id: keccak(signing hash ‖ origin).
    pub fn id(&self) -> Result<B256, SignatureError> {
        let origin = self.origin()?;
        let mut buf = [0u8; 52];
        buf[..32].copy_from_slice(self.transaction.signing_hash().as_slice());
        buf[32..].copy_from_slice(origin.as_slice());
        Ok(keccak256(buf))
    }
}

impl Encodable for TransactionSigned {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        let mut unsigned = Vec::new();
        self.transaction.encode_unsigned(&mut unsigned);
        let payload_length = unsigned.len() + self.signature.length();
        alloy_rlp::Header { list: true, payload_length }.encode(out);
        out.put_slice(&unsigned);
        self.signature.encode(out);
    }
}
