use crate::errors::{LedgerError, LedgerResult};
use crate::storage::{KvTransaction, Store};
use crate::types::{Account, Transaction, TxType};

/// Checks a candidate transaction against the current ledger state without
/// mutating it. Runs on the leader's submission path and again on every
/// replica's replay, always inside the same transaction the applier uses.
pub struct Validator {
    store: Store,
}

impl Validator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn validate(&self, txn: &KvTransaction<'_>, tx: &Transaction) -> LedgerResult<()> {
        if tx.kind.requires_amount() && tx.amount == 0 {
            return Err(LedgerError::InvalidArgument(
                "amount must be greater than zero".into(),
            ));
        }
        tx.verify_signature()?;

        match tx.kind {
            TxType::Mint => {
                let sender = self.store.account_in(txn, &tx.sender)?;
                check_nonce(&sender, tx)?;
                self.check_permission(txn, tx)
            }
            TxType::Transfer => {
                let sender = self.store.account_in(txn, &tx.sender)?;
                check_nonce(&sender, tx)?;
                if sender.is_frozen {
                    return Err(LedgerError::Frozen(tx.sender.clone()));
                }
                if sender.balance < tx.amount {
                    return Err(LedgerError::InsufficientBalance {
                        balance: sender.balance,
                        amount: tx.amount,
                    });
                }
                Ok(())
            }
            // Freeze and unfreeze are gated on role alone; the nonce is
            // neither checked nor advanced for them.
            TxType::Freeze | TxType::Unfreeze => self.check_permission(txn, tx),
        }
    }

    fn check_permission(&self, txn: &KvTransaction<'_>, tx: &Transaction) -> LedgerResult<()> {
        let sender = self.store.account_in(txn, &tx.sender)?;
        if !sender.role.may_execute(tx.kind) {
            return Err(LedgerError::PermissionDenied(format!(
                "{} may not submit {} transactions",
                tx.sender, tx.kind
            )));
        }
        Ok(())
    }
}

fn check_nonce(sender: &Account, tx: &Transaction) -> LedgerResult<()> {
    if tx.nonce != sender.nonce + 1 {
        return Err(LedgerError::NonceMismatch {
            expected: sender.nonce + 1,
            got: tx.nonce,
        });
    }
    Ok(())
}
