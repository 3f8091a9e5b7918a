//! Chained-randomness proofs binding a block's `alpha` input to its signer.
//!
//! The proof is a deterministic (RFC 6979) recoverable signature over a
//! domain-separated digest of `alpha`; the output `beta` is the keccak of the
//! proof bytes. Determinism makes `beta` a pure function of (signer, alpha),
//! while remaining unpredictable to anyone without the signer's key.

use crate::crypto::{self, SignatureError};
use alloy_primitives::{keccak256, Address, B256};
use secp256k1::SecretKey;

/// Byte length of a randomness proof.
pub const PROOF_SIZE: usize = 65;

/// Domain separation prefix for proof digests.
const PROOF_DOMAIN: &[u8] = b"thor.proof.alpha";

fn alpha_digest(alpha: &[u8]) -> B256 {
    let mut buf = Vec::with_capacity(PROOF_DOMAIN.len() + alpha.len());
    buf.extend_from_slice(PROOF_DOMAIN);
    buf.extend_from_slice(alpha);
    keccak256(&buf)
}

/// Produces the proof over `alpha` with the given key.
pub fn prove(alpha: &[u8], secret: &SecretKey) -> [u8; PROOF_SIZE] {
    crypto::sign_hash(&alpha_digest(alpha), secret)
}

/// Derives `beta` from a proof without verifying it.
pub fn beta_of(proof: &[u8]) -> B256 {
    keccak256(proof)
}

/// Verifies that `proof` was produced over `alpha` by `signer` and returns the
/// derived `beta`.
pub fn verify(signer: Address, alpha: &[u8], proof: &[u8]) -> Result<B256, VrfError> {
    if proof.len() != PROOF_SIZE {
        return Err(VrfError::InvalidProofLength(proof.len()));
    }

    let prover = crypto::recover_signer(&alpha_digest(alpha), proof)?;
    if prover != signer {
        return Err(VrfError::ProverMismatch { prover, signer });
    }

    Ok(beta_of(proof))
}

/// Error verifying a randomness proof.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum VrfError {
    /// The proof byte length is wrong.
    #[error("proof length {0} is invalid")]
    InvalidProofLength(usize),

    /// The proof does not recover to the expected signer.
    #[error("proof prover {prover} does not match signer {signer}")]
    ProverMismatch { prover: Address, signer: Address },

    /// The proof bytes are not a valid recoverable signature.
    #[error(transparent)]
    Signature(#[from] SignatureError),
}
