use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: u64, got: u64 },
    #[error("account is frozen: {0}")]
    Frozen(String),
    #[error("insufficient balance: have {balance}, need {amount}")]
    InsufficientBalance { balance: u64, amount: u64 },
    #[error("balance overflow {0}")]
    Overflow(String),
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),
    #[error("audit chain corrupted at index {index}: {reason}")]
    ChainCorrupted { index: u64, reason: String },
    #[error("not the cluster leader")]
    NotLeader { leader: Option<String> },
    #[error("proposal did not commit before the deadline")]
    Timeout,
    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
