use crate::{
    crypto::{self, SignatureError},
    vrf, BlockNumber,
};
use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_rlp::Encodable;
use lazy_static::lazy_static;
use lru::LruCache;
use parking_lot::RwLock;
use std::num::NonZeroUsize;

/// Byte length of a plain ECDSA block signature.
pub const SIGNATURE_SIZE: usize = 65;
/// Byte length of a complex block signature: ECDSA seal plus randomness proof.
pub const COMPLEX_SIGNATURE_SIZE: usize = SIGNATURE_SIZE + vrf::PROOF_SIZE;

const RECOVERED_SIGNER_CACHE_NUM: usize = 4096;

lazy_static! {
    // recovered signer cache keyed by the sealed header hash
    static ref RECOVERED_SIGNER_CACHE: RwLock<LruCache<B256, Address>> =
        RwLock::new(LruCache::new(NonZeroUsize::new(RECOVERED_SIGNER_CACHE_NUM).unwrap()));
}

/// A block header.
///
/// The identity of a header is fully determined by its content; `id` embeds
/// the block number in its high 32 bits.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Header {
    /// Id of the parent block.
    pub parent_id: B256,
    /// Block number, always `parent.number + 1`.
    pub number: BlockNumber,
    /// Unix timestamp, seconds.
    pub timestamp: u64,
    /// Gas limit of the block.
    pub gas_limit: u64,
    /// Address credited with block rewards.
    pub beneficiary: Address,
    /// Total gas spent by the block's transactions.
    pub gas_used: u64,
    /// Accumulated schedule score of the chain up to this block.
    pub total_score: u64,
    /// Merkle root of the transaction list.
    pub txs_root: B256,
    /// Transaction features the block supports.
    pub txs_features: u32,
    /// Root of the post-state.
    pub state_root: B256,
    /// Merkle root of the receipt list.
    pub receipts_root: B256,
    /// Finality vote flag. Settable only once the finality fork is active.
    pub com: bool,
    /// Randomness-chain input. Empty before the VRF fork.
    pub alpha: Bytes,
    /// Base fee per gas. Present iff the dynamic-fee fork is active.
    pub base_fee_per_gas: Option<u64>,
    /// 65-byte ECDSA seal, or seal plus 65-byte randomness proof.
    pub signature: Bytes,
}

impl Header {
    /// Hash committing to everything but the signature.
    pub fn signing_hash(&self) -> B256 {
        let mut out = Vec::new();
        self.encode_unsigned(&mut out);
        keccak256(&out)
    }

    /// Hash of the sealed header, including the signature.
    pub fn hash(&self) -> B256 {
        let mut out = Vec::new();
        self.encode_unsigned(&mut out);
        self.signature.encode(&mut out);
        keccak256(&out)
    }

    /// Recovers the block signer from the ECDSA part of the signature.
    ///
    /// Results are cached by sealed-header hash.
    pub fn signer(&self) -> Result<Address, SignatureError> {
        if self.signature.len() != SIGNATURE_SIZE &&
            self.signature.len() != COMPLEX_SIGNATURE_SIZE
        {
            return Err(SignatureError::InvalidLength(self.signature.len()));
        }

        let hash = self.hash();
        if let Some(&signer) = RECOVERED_SIGNER_CACHE.write().get(&hash) {
            return Ok(signer);
        }

        let signer = crypto::recover_signer(&self.signing_hash(), &self.signature[..SIGNATURE_SIZE])?;
        RECOVERED_SIGNER_CACHE.write().put(hash, signer);
        Ok(signer)
    }

    /// The block id: keccak(signing hash ‖ signer) with the block number
    /// spliced into the first four bytes.
    pub fn id(&self) -> Result<B256, SignatureError> {
        let signer = self.signer()?;
        Ok(compose_block_id(self.number, &self.signing_hash(), &signer))
    }

    /// The randomness proof appended to a complex signature, if any.
    pub fn randomness_proof(&self) -> Option<&[u8]> {
        (self.signature.len() == COMPLEX_SIGNATURE_SIZE)
            .then(|| &self.signature[SIGNATURE_SIZE..])
    }

    /// Verifies the randomness proof against `alpha` and derives `beta`.
    ///
    /// `Ok(None)` for plain signatures (pre-VRF blocks).
    pub fn beta(&self) -> Result<Option<B256>, vrf::VrfError> {
        let Some(proof) = self.randomness_proof() else { return Ok(None) };
        let signer = self.signer().map_err(vrf::VrfError::Signature)?;
        vrf::verify(signer, &self.alpha, proof).map(Some)
    }

    fn encode_unsigned(&self, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        self.parent_id.encode(&mut payload);
        self.number.encode(&mut payload);
        self.timestamp.encode(&mut payload);
        self.gas_limit.encode(&mut payload);
        self.beneficiary.encode(&mut payload);
        self.gas_used.encode(&mut payload);
        self.total_score.encode(&mut payload);
        self.txs_root.encode(&mut payload);
        self.txs_features.encode(&mut payload);
        self.state_root.encode(&mut payload);
        self.receipts_root.encode(&mut payload);

        // trailing extension, trimmed from the right
        if let Some(base_fee) = self.base_fee_per_gas {
            self.alpha.encode(&mut payload);
            self.com.encode(&mut payload);
            base_fee.encode(&mut payload);
        } else if self.com {
            self.alpha.encode(&mut payload);
            self.com.encode(&mut payload);
        } else if !self.alpha.is_empty() {
            self.alpha.encode(&mut payload);
        }

        alloy_rlp::Header { list: true, payload_length: payload.len() }.encode(out);
        out.extend_from_slice(&payload);
    }
}

/// Builds a block id from its parts.
pub fn compose_block_id(number: BlockNumber, signing_hash: &B256, signer: &Address) -> B256 {
    let mut buf = [0u8; 52];
    buf[..32].copy_from_slice(signing_hash.as_slice());
    buf[32..].copy_from_slice(signer.as_slice());

    let mut id = keccak256(buf);
    id.0[..4].copy_from_slice(&number.to_be_bytes());
    id
}

/// Extracts the block number encoded in the high 32 bits of a block id.
pub fn block_number_of(id: &B256) -> BlockNumber {
    BlockNumber::from_be_bytes([id.0[0], id.0[1], id.0[2], id.0[3]])
}
