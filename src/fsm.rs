use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{LedgerError, LedgerResult};
use crate::replication::StateMachine;
use crate::storage::Store;
use crate::types::Transaction;
use crate::validator::Validator;

pub const COMMAND_TRANSACTION: &str = "transaction";

/// Tagged envelope replicated through the log. The tag is the single
/// extension point for future command kinds; an unrecognized tag indicates
/// version skew between replicas, not a client error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
}

impl Command {
    pub fn transaction(tx: Transaction) -> Self {
        Self {
            kind: COMMAND_TRANSACTION.to_string(),
            transaction: Some(tx),
        }
    }
}

/// Applies committed log entries to the ledger. Validation, the audit
/// append, and the account mutations share one KV transaction, so a failure
/// at any step leaves no trace of the entry.
pub struct LedgerFsm {
    store: Store,
    validator: Validator,
}

impl LedgerFsm {
    pub fn new(store: Store) -> Self {
        let validator = Validator::new(store.clone());
        Self { store, validator }
    }

    fn apply_transaction(&self, tx: &Transaction) -> LedgerResult<()> {
        let txn = self.store.begin();
        self.validator.validate(&txn, tx)?;
        let payload = serde_json::to_vec(tx)?;
        self.store.append_audit_in(&txn, &payload)?;
        self.store.apply_transaction_in(&txn, tx)?;
        txn.commit()?;
        Ok(())
    }
}

impl StateMachine for LedgerFsm {
    fn apply(&self, index: u64, command: &[u8]) -> LedgerResult<()> {
        let command: Command = serde_json::from_slice(command)
            .map_err(|err| LedgerError::Internal(format!("undecodable log command: {err}")))?;
        match command.kind.as_str() {
            COMMAND_TRANSACTION => {
                let tx = command.transaction.ok_or_else(|| {
                    LedgerError::Internal("command is missing its transaction".into())
                })?;
                if let Err(err) = self.apply_transaction(&tx) {
                    warn!(index, %err, "rejected committed transaction");
                    return Err(err);
                }
                Ok(())
            }
            other => Err(LedgerError::Internal(format!(
                "unknown command type: {other}"
            ))),
        }
    }

    fn snapshot(&self, writer: &mut dyn Write) -> LedgerResult<()> {
        self.store.snapshot_to(writer)
    }

    fn restore(&self, reader: &mut dyn Read) -> LedgerResult<()> {
        self.store.restore_from(reader)?;
        self.store.verify_chain()
    }
}
