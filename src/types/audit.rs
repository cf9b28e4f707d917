use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::{LedgerError, LedgerResult};

const ENTRY_HEADER_LEN: usize = 8 + 32 + 32 + 4;

/// One link of the tamper-evident audit chain. `tx_bytes` holds exactly the
/// payload that was appended; it is never re-derived from ledger state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub index: u64,
    #[serde(with = "hex_hash")]
    pub prev_hash: [u8; 32],
    #[serde(with = "hex_hash")]
    pub entry_hash: [u8; 32],
    #[serde(with = "hex_payload")]
    pub tx_bytes: Vec<u8>,
}

impl AuditEntry {
    /// Little-endian framing: index, prev hash, entry hash, payload length,
    /// payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ENTRY_HEADER_LEN + self.tx_bytes.len());
        out.extend_from_slice(&self.index.to_le_bytes());
        out.extend_from_slice(&self.prev_hash);
        out.extend_from_slice(&self.entry_hash);
        out.extend_from_slice(&(self.tx_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.tx_bytes);
        out
    }

    pub fn decode(bytes: &[u8]) -> LedgerResult<Self> {
        if bytes.len() < ENTRY_HEADER_LEN {
            return Err(LedgerError::InvalidArgument(
                "audit entry bytes too short".into(),
            ));
        }
        let index = u64::from_le_bytes(bytes[..8].try_into().expect("sliced 8 bytes"));
        let mut prev_hash = [0u8; 32];
        prev_hash.copy_from_slice(&bytes[8..40]);
        let mut entry_hash = [0u8; 32];
        entry_hash.copy_from_slice(&bytes[40..72]);
        let tx_len = u32::from_le_bytes(bytes[72..76].try_into().expect("sliced 4 bytes")) as usize;
        if bytes.len() != ENTRY_HEADER_LEN + tx_len {
            return Err(LedgerError::InvalidArgument(
                "audit entry length mismatch".into(),
            ));
        }
        Ok(Self {
            index,
            prev_hash,
            entry_hash,
            tx_bytes: bytes[ENTRY_HEADER_LEN..].to_vec(),
        })
    }
}

/// Chaining digest for audit entries. The entry commits to a hash of the
/// payload rather than the raw payload; verification recomputes the same
/// nesting.
pub fn chain_hash(index: u64, prev_hash: &[u8; 32], tx_bytes: &[u8]) -> [u8; 32] {
    let tx_hash: [u8; 32] = Sha256::digest(tx_bytes).into();
    let mut hasher = Sha256::new();
    hasher.update(index.to_le_bytes());
    hasher.update(prev_hash);
    hasher.update(tx_hash);
    hasher.finalize().into()
}

mod hex_hash {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        let bytes = hex::decode(&raw).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected a 32-byte hash"))
    }
}

mod hex_payload {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        hex::decode(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> AuditEntry {
        let prev_hash = [7u8; 32];
        let tx_bytes = br#"{"Type":0}"#.to_vec();
        AuditEntry {
            index: 3,
            prev_hash,
            entry_hash: chain_hash(3, &prev_hash, &tx_bytes),
            tx_bytes,
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let entry = sample_entry();
        let decoded = AuditEntry::decode(&entry.encode()).expect("decode");
        assert_eq!(decoded, entry);
    }

    #[test]
    fn empty_payload_is_allowed() {
        let entry = AuditEntry {
            index: 1,
            prev_hash: [0u8; 32],
            entry_hash: chain_hash(1, &[0u8; 32], &[]),
            tx_bytes: Vec::new(),
        };
        let decoded = AuditEntry::decode(&entry.encode()).expect("decode");
        assert!(decoded.tx_bytes.is_empty());
    }

    #[test]
    fn decode_rejects_truncated_bytes() {
        let entry = sample_entry();
        let encoded = entry.encode();
        assert!(AuditEntry::decode(&encoded[..encoded.len() - 1]).is_err());
        assert!(AuditEntry::decode(&encoded[..10]).is_err());
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut encoded = sample_entry().encode();
        encoded.push(0);
        assert!(AuditEntry::decode(&encoded).is_err());
    }

    #[test]
    fn chain_hash_commits_to_payload_digest() {
        let prev = [0u8; 32];
        let payload = b"payload".to_vec();

        let tx_hash: [u8; 32] = Sha256::digest(&payload).into();
        let mut hasher = Sha256::new();
        hasher.update(5u64.to_le_bytes());
        hasher.update(prev);
        hasher.update(tx_hash);
        let expected: [u8; 32] = hasher.finalize().into();

        assert_eq!(chain_hash(5, &prev, &payload), expected);
        assert_ne!(chain_hash(5, &prev, b"tampered"), expected);
        assert_ne!(chain_hash(6, &prev, &payload), expected);
    }
}
