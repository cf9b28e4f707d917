use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use rocksdb::{IteratorMode, MultiThreaded, Options, TransactionDB, TransactionDBOptions};

use crate::errors::{LedgerError, LedgerResult};
use crate::types::{chain_hash, Account, AuditEntry, Role, Transaction, TxType};

pub const KEY_PREFIX_ACCOUNT: &str = "acc:";
pub(crate) const KEY_PREFIX_AUDIT_ENTRY: &[u8] = b"audit:entry:";
pub(crate) const KEY_AUDIT_LAST_INDEX: &[u8] = b"audit:lastIndex";
pub(crate) const KEY_AUDIT_LAST_HASH: &[u8] = b"audit:lastHash";

pub type KvTransaction<'db> = rocksdb::Transaction<'db, TransactionDB<MultiThreaded>>;

fn account_key(address: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(KEY_PREFIX_ACCOUNT.len() + address.len());
    key.extend_from_slice(KEY_PREFIX_ACCOUNT.as_bytes());
    key.extend_from_slice(address.as_bytes());
    key
}

pub(crate) fn audit_entry_key(index: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(KEY_PREFIX_AUDIT_ENTRY.len() + 8);
    key.extend_from_slice(KEY_PREFIX_AUDIT_ENTRY);
    key.extend_from_slice(&index.to_le_bytes());
    key
}

/// Account records and the audit chain share one transactional keyspace so a
/// single [`KvTransaction`] can cover both.
pub struct Store {
    db: Arc<TransactionDB<MultiThreaded>>,
}

impl Store {
    pub fn open(path: &Path) -> LedgerResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = TransactionDB::open(&opts, &TransactionDBOptions::default(), path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn begin(&self) -> KvTransaction<'_> {
        self.db.transaction()
    }

    pub fn register_account(&self, address: &str) -> LedgerResult<()> {
        let txn = self.begin();
        let key = account_key(address);
        if txn.get_for_update(&key, true)?.is_some() {
            return Err(LedgerError::AlreadyExists(format!("account {address}")));
        }
        let account = Account::new(address.to_string());
        txn.put(&key, serde_json::to_vec(&account)?)?;
        txn.commit()?;
        Ok(())
    }

    pub fn get_account(&self, address: &str) -> LedgerResult<Account> {
        match self.db.get(account_key(address))? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Err(LedgerError::NotFound(format!("account {address}"))),
        }
    }

    pub fn set_role(&self, address: &str, role: Role) -> LedgerResult<()> {
        let txn = self.begin();
        let mut account = self.account_in(&txn, address)?;
        account.role = role;
        self.put_account_in(&txn, &account)?;
        txn.commit()?;
        Ok(())
    }

    pub fn get_role(&self, address: &str) -> LedgerResult<Role> {
        Ok(self.get_account(address)?.role)
    }

    pub(crate) fn account_in(
        &self,
        txn: &KvTransaction<'_>,
        address: &str,
    ) -> LedgerResult<Account> {
        match txn.get_for_update(account_key(address), true)? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Err(LedgerError::NotFound(format!("account {address}"))),
        }
    }

    pub(crate) fn put_account_in(
        &self,
        txn: &KvTransaction<'_>,
        account: &Account,
    ) -> LedgerResult<()> {
        txn.put(account_key(&account.address), serde_json::to_vec(account)?)?;
        Ok(())
    }

    /// Mutates the sender and receiver records for one transaction. Runs
    /// entirely inside the caller's transaction; a failure leaves every
    /// touched key unwritten.
    pub fn apply_transaction_in(
        &self,
        txn: &KvTransaction<'_>,
        tx: &Transaction,
    ) -> LedgerResult<()> {
        let mut sender = self.account_in(txn, &tx.sender)?;

        if tx.kind == TxType::Transfer {
            if sender.balance < tx.amount {
                return Err(LedgerError::InsufficientBalance {
                    balance: sender.balance,
                    amount: tx.amount,
                });
            }
            if sender.is_frozen {
                return Err(LedgerError::Frozen(tx.sender.clone()));
            }
            sender.balance -= tx.amount;
        }

        if tx.kind.advances_nonce() {
            if tx.nonce != sender.nonce + 1 {
                return Err(LedgerError::NonceMismatch {
                    expected: sender.nonce + 1,
                    got: tx.nonce,
                });
            }
            sender.nonce += 1;
        }

        let mut receiver = self.account_in(txn, &tx.receiver)?;

        match tx.kind {
            TxType::Mint | TxType::Transfer => {
                receiver.balance = receiver.balance.checked_add(tx.amount).ok_or_else(|| {
                    LedgerError::Overflow(format!("crediting {} to {}", tx.amount, tx.receiver))
                })?;
            }
            TxType::Freeze => receiver.is_frozen = true,
            TxType::Unfreeze => receiver.is_frozen = false,
        }

        self.put_account_in(txn, &sender)?;
        self.put_account_in(txn, &receiver)
    }

    /// Appends one entry to the audit chain, advancing the last-index and
    /// last-hash pointers in the same transaction.
    pub fn append_audit_in(
        &self,
        txn: &KvTransaction<'_>,
        tx_bytes: &[u8],
    ) -> LedgerResult<AuditEntry> {
        let (last_index, last_hash) = self.load_last_in(txn)?;
        let index = last_index + 1;
        let tx_bytes = tx_bytes.to_vec();
        let entry = AuditEntry {
            index,
            prev_hash: last_hash,
            entry_hash: chain_hash(index, &last_hash, &tx_bytes),
            tx_bytes,
        };
        txn.put(audit_entry_key(index), entry.encode())?;
        txn.put(KEY_AUDIT_LAST_INDEX, index.to_le_bytes())?;
        txn.put(KEY_AUDIT_LAST_HASH, entry.entry_hash)?;
        Ok(entry)
    }

    fn load_last_in(&self, txn: &KvTransaction<'_>) -> LedgerResult<(u64, [u8; 32])> {
        let mut last_index = 0u64;
        let mut last_hash = [0u8; 32];
        if let Some(raw) = txn.get_for_update(KEY_AUDIT_LAST_INDEX, true)? {
            let bytes: [u8; 8] = raw
                .as_slice()
                .try_into()
                .map_err(|_| LedgerError::Internal("invalid audit lastIndex encoding".into()))?;
            last_index = u64::from_le_bytes(bytes);
        }
        if let Some(raw) = txn.get_for_update(KEY_AUDIT_LAST_HASH, true)? {
            last_hash = raw
                .as_slice()
                .try_into()
                .map_err(|_| LedgerError::Internal("invalid audit lastHash encoding".into()))?;
        }
        Ok((last_index, last_hash))
    }

    pub fn last_audit_index(&self) -> LedgerResult<u64> {
        match self.db.get(KEY_AUDIT_LAST_INDEX)? {
            Some(raw) => {
                let bytes: [u8; 8] = raw
                    .as_slice()
                    .try_into()
                    .map_err(|_| LedgerError::Internal("invalid audit lastIndex encoding".into()))?;
                Ok(u64::from_le_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    /// A missing or undecodable entry at or below the last index is chain
    /// corruption, not absence.
    pub fn audit_entry(&self, index: u64) -> LedgerResult<AuditEntry> {
        let last = self.last_audit_index()?;
        if index == 0 || index > last {
            return Err(LedgerError::NotFound(format!("audit entry {index}")));
        }
        match self.db.get(audit_entry_key(index))? {
            Some(raw) => AuditEntry::decode(&raw).map_err(|err| LedgerError::ChainCorrupted {
                index,
                reason: err.to_string(),
            }),
            None => Err(LedgerError::ChainCorrupted {
                index,
                reason: "entry missing below last index".into(),
            }),
        }
    }

    pub fn audit_entries(&self) -> LedgerResult<Vec<AuditEntry>> {
        let last = self.last_audit_index()?;
        let mut entries = Vec::with_capacity(last as usize);
        for index in 1..=last {
            entries.push(self.audit_entry(index)?);
        }
        Ok(entries)
    }

    /// Walks the whole chain, recomputing every link. Fails fast with the
    /// first offending index.
    pub fn verify_chain(&self) -> LedgerResult<()> {
        let last = self.last_audit_index()?;
        let mut prev_hash = [0u8; 32];
        for index in 1..=last {
            let raw = self
                .db
                .get(audit_entry_key(index))?
                .ok_or_else(|| LedgerError::ChainCorrupted {
                    index,
                    reason: "entry missing below last index".into(),
                })?;
            let entry = AuditEntry::decode(&raw).map_err(|err| LedgerError::ChainCorrupted {
                index,
                reason: err.to_string(),
            })?;
            if entry.index != index {
                return Err(LedgerError::ChainCorrupted {
                    index,
                    reason: format!("index mismatch: stored {}", entry.index),
                });
            }
            if entry.prev_hash != prev_hash {
                return Err(LedgerError::ChainCorrupted {
                    index,
                    reason: "previous hash mismatch".into(),
                });
            }
            if entry.entry_hash != chain_hash(index, &prev_hash, &entry.tx_bytes) {
                return Err(LedgerError::ChainCorrupted {
                    index,
                    reason: "entry hash mismatch".into(),
                });
            }
            prev_hash = entry.entry_hash;
        }
        Ok(())
    }

    /// Streams every key-value pair from a consistent snapshot, in
    /// lexicographic key order, as length-prefixed frames. Replicas with
    /// identical state produce identical bytes.
    pub fn snapshot_to(&self, writer: &mut dyn Write) -> LedgerResult<()> {
        let snapshot = self.db.snapshot();
        for item in snapshot.iterator(IteratorMode::Start) {
            let (key, value) = item?;
            writer.write_all(&(key.len() as u32).to_le_bytes())?;
            writer.write_all(&key)?;
            writer.write_all(&(value.len() as u32).to_le_bytes())?;
            writer.write_all(&value)?;
        }
        Ok(())
    }

    /// Drops every existing key and reloads the keyspace from a snapshot
    /// stream, all within one transaction.
    pub fn restore_from(&self, reader: &mut dyn Read) -> LedgerResult<()> {
        let txn = self.begin();
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, _) = item?;
            txn.delete(key)?;
        }
        loop {
            let mut len_buf = [0u8; 4];
            match reader.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(err) => return Err(err.into()),
            }
            let key = read_frame(reader, u32::from_le_bytes(len_buf))?;
            reader.read_exact(&mut len_buf)?;
            let value = read_frame(reader, u32::from_le_bytes(len_buf))?;
            txn.put(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }
}

fn read_frame(reader: &mut dyn Read, len: u32) -> LedgerResult<Vec<u8>> {
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
        }
    }
}
