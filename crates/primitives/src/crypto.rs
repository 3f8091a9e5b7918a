use alloy_primitives::{keccak256, Address, B256};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, PublicKey, SecretKey, SECP256K1,
};

/// Error recovering or producing a secp256k1 signature.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum SignatureError {
    /// The signature byte length does not match any supported layout.
    #[error("signature length {0} is invalid")]
    InvalidLength(usize),

    /// The recovery id byte is out of range.
    #[error("invalid signature recovery id")]
    InvalidRecoveryId,

    /// Error when encountering a recover ecdsa inner error.
    #[error("recover ecdsa inner error")]
    RecoverInnerError,
}

/// Converts an uncompressed public key to its 20-byte address.
pub fn public_key_to_address(public: &PublicKey) -> Address {
    Address::from_slice(&keccak256(&public.serialize_uncompressed()[1..])[12..])
}

/// Recovers the signing address from a 65-byte recoverable signature over `hash`.
pub fn recover_signer(hash: &B256, signature: &[u8]) -> Result<Address, SignatureError> {
    if signature.len() != 65 {
        return Err(SignatureError::InvalidLength(signature.len()));
    }

    let recovery_id = RecoveryId::from_i32(signature[64] as i32)
        .map_err(|_| SignatureError::InvalidRecoveryId)?;
    let signature = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|_| SignatureError::RecoverInnerError)?;
    let message = Message::from_digest(hash.0);

    let public = SECP256K1
        .recover_ecdsa(&message, &signature)
        .map_err(|_| SignatureError::RecoverInnerError)?;
    Ok(public_key_to_address(&public))
}

/// Produces a 65-byte recoverable signature over `hash`.
///
/// Signing is deterministic (RFC 6979), so the same key and hash always yield
/// the same bytes.
pub fn sign_hash(hash: &B256, secret: &SecretKey) -> [u8; 65] {
    let message = Message::from_digest(hash.0);
    let signature = SECP256K1.sign_ecdsa_recoverable(&message, secret);
    let (recovery_id, compact) = signature.serialize_compact();

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&compact);
    out[64] = recovery_id.to_i32() as u8;
    out
}
