use std::fmt;

use p256::ecdsa::SigningKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::crypto;
use crate::errors::{LedgerError, LedgerResult};

use super::Address;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TxType {
    Mint = 0,
    Transfer = 1,
    Freeze = 2,
    Unfreeze = 3,
}

impl TxType {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(TxType::Mint),
            1 => Some(TxType::Transfer),
            2 => Some(TxType::Freeze),
            3 => Some(TxType::Unfreeze),
            _ => None,
        }
    }

    /// Mint and transfer move value and therefore require a non-zero amount.
    pub fn requires_amount(self) -> bool {
        matches!(self, TxType::Mint | TxType::Transfer)
    }

    /// Freeze and unfreeze neither check nor advance the sender nonce.
    pub fn advances_nonce(self) -> bool {
        matches!(self, TxType::Mint | TxType::Transfer)
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxType::Mint => "mint",
            TxType::Transfer => "transfer",
            TxType::Freeze => "freeze",
            TxType::Unfreeze => "unfreeze",
        };
        write!(f, "{name}")
    }
}

impl Serialize for TxType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i32(*self as i32)
    }
}

impl<'de> Deserialize<'de> for TxType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = i32::deserialize(deserializer)?;
        TxType::from_i32(value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown transaction type {value}")))
    }
}

/// A signed value-ledger transaction. The wire field names are fixed; every
/// replica must decode the same bytes identically.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Transaction {
    #[serde(rename = "Type")]
    pub kind: TxType,
    pub sender: Address,
    pub receiver: Address,
    pub amount: u64,
    pub nonce: u64,
    /// Lowercase hex of the ASN.1 DER signature bytes.
    pub signature: String,
}

impl Transaction {
    pub fn new(kind: TxType, sender: Address, receiver: Address, amount: u64, nonce: u64) -> Self {
        Self {
            kind,
            sender,
            receiver,
            amount,
            nonce,
            signature: String::new(),
        }
    }

    /// Digest of the signing pre-image: big-endian type, raw sender and
    /// receiver bytes with no length prefixes, big-endian amount and nonce.
    /// The unprefixed layout is load-bearing for signature compatibility and
    /// must not change.
    pub fn canonical_hash(&self) -> [u8; 32] {
        let mut data =
            Vec::with_capacity(4 + self.sender.len() + self.receiver.len() + 8 + 8);
        data.extend_from_slice(&(self.kind as i32).to_be_bytes());
        data.extend_from_slice(self.sender.as_bytes());
        data.extend_from_slice(self.receiver.as_bytes());
        data.extend_from_slice(&self.amount.to_be_bytes());
        data.extend_from_slice(&self.nonce.to_be_bytes());
        Sha256::digest(&data).into()
    }

    pub fn sign(&mut self, key: &SigningKey) {
        self.signature = hex::encode(crypto::sign_canonical_hash(key, &self.canonical_hash()));
    }

    pub fn verify_signature(&self) -> LedgerResult<()> {
        let public_key = crypto::public_key_from_address(&self.sender)?;
        let der = hex::decode(&self.signature)
            .map_err(|_| LedgerError::SignatureInvalid("signature is not valid hex".into()))?;
        crypto::verify_der_signature(&public_key, &self.canonical_hash(), &der)
    }
}
