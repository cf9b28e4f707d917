use std::fs;
use std::path::Path;

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::generic_array::GenericArray;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::EncodedPoint;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::errors::{LedgerError, LedgerResult};

/// Uncompressed P-256 coordinates, X then Y, each 32 bytes zero-padded.
pub const PUBLIC_KEY_LEN: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredKeypair {
    pub public_key: String,
    pub secret_key: String,
}

pub fn generate_keypair() -> SigningKey {
    SigningKey::random(&mut OsRng)
}

pub fn save_keypair(path: &Path, key: &SigningKey) -> LedgerResult<()> {
    let stored = StoredKeypair {
        public_key: hex::encode(public_key_to_bytes(key.verifying_key())),
        secret_key: hex::encode(key.to_bytes()),
    };
    let encoded = toml::to_string_pretty(&stored)
        .map_err(|err| LedgerError::Internal(format!("failed to encode keypair: {err}")))?;
    fs::create_dir_all(path.parent().unwrap_or_else(|| Path::new(".")))?;
    fs::write(path, encoded)?;
    Ok(())
}

pub fn load_keypair(path: &Path) -> LedgerResult<SigningKey> {
    let raw = fs::read_to_string(path)?;
    let stored: StoredKeypair = toml::from_str(&raw)
        .map_err(|err| LedgerError::InvalidArgument(format!("failed to decode keypair: {err}")))?;
    let secret_bytes = hex::decode(stored.secret_key)
        .map_err(|_| LedgerError::InvalidArgument("invalid secret key encoding".into()))?;
    SigningKey::from_slice(&secret_bytes)
        .map_err(|_| LedgerError::InvalidArgument("invalid secret key bytes".into()))
}

/// Encodes a public key as fixed 64 bytes so the hex address length is
/// stable (128 characters) and can be parsed back without framing.
pub fn public_key_to_bytes(public_key: &VerifyingKey) -> [u8; PUBLIC_KEY_LEN] {
    let point = public_key.to_encoded_point(false);
    let mut bytes = [0u8; PUBLIC_KEY_LEN];
    bytes[..32].copy_from_slice(point.x().expect("uncompressed point has x").as_slice());
    bytes[32..].copy_from_slice(point.y().expect("uncompressed point has y").as_slice());
    bytes
}

pub fn address_from_public_key(public_key: &VerifyingKey) -> String {
    hex::encode(public_key_to_bytes(public_key))
}

pub fn public_key_from_bytes(bytes: &[u8]) -> LedgerResult<VerifyingKey> {
    if bytes.len() != PUBLIC_KEY_LEN {
        return Err(LedgerError::InvalidArgument(format!(
            "invalid public key length: expected {PUBLIC_KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    let point = EncodedPoint::from_untagged_bytes(GenericArray::from_slice(bytes));
    VerifyingKey::from_encoded_point(&point).map_err(|_| {
        LedgerError::InvalidArgument("invalid public key: point is not on the P-256 curve".into())
    })
}

pub fn public_key_from_address(address: &str) -> LedgerResult<VerifyingKey> {
    let bytes = hex::decode(address)
        .map_err(|_| LedgerError::InvalidArgument("invalid address: not hex".into()))?;
    public_key_from_bytes(&bytes)
}

/// ECDSA over SHA-256 of the given hash bytes, DER-encoded. The signature
/// therefore covers a second digest of the canonical transaction hash.
pub fn sign_canonical_hash(key: &SigningKey, hash: &[u8; 32]) -> Vec<u8> {
    let signature: Signature = key.sign(hash);
    signature.to_der().as_bytes().to_vec()
}

pub fn verify_der_signature(
    public_key: &VerifyingKey,
    hash: &[u8; 32],
    der: &[u8],
) -> LedgerResult<()> {
    let signature = Signature::from_der(der)
        .map_err(|err| LedgerError::SignatureInvalid(format!("malformed ASN.1 signature: {err}")))?;
    public_key
        .verify(hash, &signature)
        .map_err(|_| LedgerError::SignatureInvalid("ECDSA verification failed".into()))
}
