mod account;
mod audit;
mod transaction;

pub use account::{Account, Role};
pub use audit::{chain_hash, AuditEntry};
pub use transaction::{Transaction, TxType};

pub type Address = String;
