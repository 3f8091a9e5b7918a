//! Transaction types.
//!
//! Two pricing models share one body shape: legacy transactions carry a gas
//! price coefficient applied to the network base gas price, dynamic-fee
//! transactions carry EIP-1559-style fee caps and are only legal once the
//! dynamic-fee fork is active.

use crate::{
    crypto::{self, SignatureError},
    BlockNumber,
};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::Encodable;

mod signed;
pub use signed::TransactionSigned;

/// Intrinsic gas charged for any transaction.
pub const TX_GAS: u64 = 5_000;
/// Intrinsic gas charged per clause calling an existing account.
pub const CLAUSE_GAS: u64 = 16_000;
/// Intrinsic gas charged per contract-creation clause.
pub const CLAUSE_GAS_CONTRACT_CREATION: u64 = 48_000;
/// Intrinsic gas per zero byte of clause data.
pub const TX_DATA_ZERO_GAS: u64 = 4;
/// Intrinsic gas per non-zero byte of clause data.
pub const TX_DATA_NON_ZERO_GAS: u64 = 68;

/// Transaction type marker byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TxType {
    /// Coefficient-priced transaction.
    Legacy = 0x00,
    /// Fee-market priced transaction.
    DynamicFee = 0x51,
}

/// Reserved feature bits understood by this implementation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Features(pub u32);

impl Encodable for Features {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        self.0.encode(out);
    }

    fn length(&self) -> usize {
        self.0.length()
    }
}

impl Features {
    /// Fee payment delegated to a sponsoring co-signer.
    pub const DELEGATED: Self = Self(1);

    /// Whether the delegated-fee bit is set.
    pub const fn is_delegated(&self) -> bool {
        self.0 & Self::DELEGATED.0 != 0
    }

    /// Whether every set bit is also supported by `supported`.
    pub const fn is_subset_of(&self, supported: u32) -> bool {
        self.0 & !supported == 0
    }
}

/// A single call carried by a transaction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Clause {
    /// Call target, `None` for contract creation.
    pub to: Option<Address>,
    /// VET transferred to the target.
    pub value: U256,
    /// Call input data.
    pub data: Bytes,
}

impl Encodable for Clause {
    fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        let to = self.to.as_ref().map_or(&[][..], |to| to.as_slice());
        let payload_length = to.length() + self.value.length() + self.data.length();
        alloy_rlp::Header { list: true, payload_length }.encode(out);
        to.encode(out);
        self.value.encode(out);
        self.data.encode(out);
    }

    fn length(&self) -> usize {
        let to = self.to.as_ref().map_or(&[][..], |to| to.as_slice());
        let payload_length = to.length() + self.value.length() + self.data.length();
        payload_length + alloy_rlp::Header { list: true, payload_length }.length()
    }
}

/// An unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Legacy(LegacyTransaction),
    DynamicFee(DynamicFeeTransaction),
}

/// Body of a coefficient-priced transaction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    /// One-byte network identifier, replay protection.
    pub chain_tag: u8,
    /// First eight bytes of a historic block id.
    pub block_ref: u64,
    /// Number of blocks past `block_ref` the transaction stays valid.
    pub expiration: u32,
    /// Calls executed in order.
    pub clauses: Vec<Clause>,
    /// Coefficient applied on top of the base gas price, 0..=255.
    pub gas_price_coef: u8,
    /// Max gas provided for execution.
    pub gas: u64,
    /// Id of a transaction this one depends on.
    pub depends_on: Option<B256>,
    /// Arbitrary user-set value.
    pub nonce: u64,
    /// Reserved feature bits.
    pub features: Features,
}

/// Body of a fee-market priced transaction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DynamicFeeTransaction {
    pub chain_tag: u8,
    pub block_ref: u64,
    pub expiration: u32,
    pub clauses: Vec<Clause>,
    /// Absolute fee cap per unit of gas.
    pub max_fee_per_gas: u128,
    /// Tip cap per unit of gas on top of the base fee.
    pub max_priority_fee_per_gas: u128,
    pub gas: u64,
    pub depends_on: Option<B256>,
    pub nonce: u64,
    pub features: Features,
}

impl Transaction {
    pub const fn tx_type(&self) -> TxType {
        match self {
            Self::Legacy(_) => TxType::Legacy,
            Self::DynamicFee(_) => TxType::DynamicFee,
        }
    }

    pub const fn chain_tag(&self) -> u8 {
        match self {
            Self::Legacy(tx) => tx.chain_tag,
            Self::DynamicFee(tx) => tx.chain_tag,
        }
    }

    pub const fn block_ref(&self) -> u64 {
        match self {
            Self::Legacy(tx) => tx.block_ref,
            Self::DynamicFee(tx) => tx.block_ref,
        }
    }

    /// Block number encoded in the high 32 bits of the block ref.
    pub const fn block_ref_number(&self) -> BlockNumber {
        (self.block_ref() >> 32) as BlockNumber
    }

    pub const fn expiration(&self) -> u32 {
        match self {
            Self::Legacy(tx) => tx.expiration,
            Self::DynamicFee(tx) => tx.expiration,
        }
    }

    pub fn clauses(&self) -> &[Clause] {
        match self {
            Self::Legacy(tx) => &tx.clauses,
            Self::DynamicFee(tx) => &tx.clauses,
        }
    }

    pub const fn gas(&self) -> u64 {
        match self {
            Self::Legacy(tx) => tx.gas,
            Self::DynamicFee(tx) => tx.gas,
        }
    }

    pub const fn depends_on(&self) -> Option<B256> {
        match self {
            Self::Legacy(tx) => tx.depends_on,
            Self::DynamicFee(tx) => tx.depends_on,
        }
    }

    pub const fn nonce(&self) -> u64 {
        match self {
            Self::Legacy(tx) => tx.nonce,
            Self::DynamicFee(tx) => tx.nonce,
        }
    }

    pub const fn features(&self) -> Features {
        match self {
            Self::Legacy(tx) => tx.features,
            Self::DynamicFee(tx) => tx.features,
        }
    }

    /// Whether the transaction's window has passed at `block_num`.
    pub const fn is_expired(&self, block_num: BlockNumber) -> bool {
        block_num.saturating_sub(self.block_ref_number()) > self.expiration()
    }

    /// Whether every feature bit is supported by the header bitmap.
    pub const fn test_features(&self, supported: u32) -> bool {
        self.features().is_subset_of(supported)
    }

    /// Gas consumed before any clause executes.
    pub fn intrinsic_gas(&self) -> u64 {
        let clauses = self.clauses();
        if clauses.is_empty() {
            return TX_GAS + CLAUSE_GAS;
        }

        clauses.iter().fold(TX_GAS, |total, clause| {
            let base = if clause.to.is_some() { CLAUSE_GAS } else { CLAUSE_GAS_CONTRACT_CREATION };
            total + base + data_gas(&clause.data)
        })
    }

    /// Gas price of a legacy transaction given the network base gas price.
    ///
    /// For dynamic-fee transactions this is the fee cap.
    pub fn gas_price(&self, base_gas_price: U256) -> U256 {
        match self {
            Self::Legacy(tx) => {
                base_gas_price +
                    base_gas_price * U256::from(tx.gas_price_coef) / U256::from(255u64)
            }
            Self::DynamicFee(tx) => U256::from(tx.max_fee_per_gas),
        }
    }

    /// Effective priority fee per gas against `base_fee`, if affordable.
    pub fn effective_priority_fee(&self, base_fee: u128) -> Option<u128> {
        match self {
            Self::Legacy(_) => None,
            Self::DynamicFee(tx) => tx
                .max_fee_per_gas
                .checked_sub(base_fee)
                .map(|headroom| headroom.min(tx.max_priority_fee_per_gas)),
        }
    }

    /// Hash signed by the transaction origin.
    pub fn signing_hash(&self) -> B256 {
        let mut out = Vec::new();
        self.encode_unsigned(&mut out);
        keccak256(&out)
    }

    /// Hash countersigned by a fee delegator on behalf of `origin`.
    pub fn delegator_signing_hash(&self, origin: &Address) -> B256 {
        let mut buf = [0u8; 52];
        buf[..32].copy_from_slice(self.signing_hash().as_slice());
        buf[32..].copy_from_slice(origin.as_slice());
        keccak256(buf)
    }

    /// Attaches a signature.
    pub fn into_signed(self, signature: Bytes) -> TransactionSigned {
        TransactionSigned::new(self, signature)
    }

    fn encode_unsigned(&self, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        match self {
            Self::Legacy(tx) => {
                tx.chain_tag.encode(&mut payload);
                tx.block_ref.encode(&mut payload);
                tx.expiration.encode(&mut payload);
                tx.clauses.encode(&mut payload);
                tx.gas_price_coef.encode(&mut payload);
                tx.gas.encode(&mut payload);
                tx.depends_on.unwrap_or_default().encode(&mut payload);
                tx.nonce.encode(&mut payload);
                tx.features.encode(&mut payload);
            }
            Self::DynamicFee(tx) => {
                tx.chain_tag.encode(&mut payload);
                tx.block_ref.encode(&mut payload);
                tx.expiration.encode(&mut payload);
                tx.clauses.encode(&mut payload);
                tx.max_fee_per_gas.encode(&mut payload);
                tx.max_priority_fee_per_gas.encode(&mut payload);
                tx.gas.encode(&mut payload);
                tx.depends_on.unwrap_or_default().encode(&mut payload);
                tx.nonce.encode(&mut payload);
                tx.features.encode(&mut payload);
            }
        }

        if self.tx_type() != TxType::Legacy {
            out.push(self.tx_type() as u8);
        }
        alloy_rlp::Header { list: true, payload_length: payload.len() }.encode(out);
        out.extend_from_slice(&payload);
    }
}

fn data_gas(data: &[u8]) -> u64 {
    data.iter().fold(0, |total, byte| {
        total + if *byte == 0 { TX_DATA_ZERO_GAS } else { TX_DATA_NON_ZERO_GAS }
    })
}

/// Builds a block ref out of a block id.
pub fn block_ref_of(id: &B256) -> u64 {
    u64::from_be_bytes(id.0[..8].try_into().unwrap())
}

/// Signs a transaction with the origin key, optionally countersigned by a
/// delegator key.
pub fn sign_transaction(
    tx: Transaction,
    origin: &secp256k1::SecretKey,
    delegator: Option<&secp256k1::SecretKey>,
) -> Result<TransactionSigned, SignatureError> {
    let origin_sig = crypto::sign_hash(&tx.signing_hash(), origin);
    let mut sig = origin_sig.to_vec();

    if let Some(delegator) = delegator {
        let origin_addr = crypto::recover_signer(&tx.signing_hash(), &origin_sig)?;
        let delegator_sig = crypto::sign_hash(&tx.delegator_signing_hash(&origin_addr), delegator);
        sig.extend_from_slice(&delegator_sig);
    }

    Ok(tx.into_signed(Bytes::from(sig)))
}
