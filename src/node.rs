use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::NodeConfig;
use crate::errors::{LedgerError, LedgerResult};
use crate::fsm::{Command, LedgerFsm};
use crate::replication::{ClusterStatus, LocalReplicator, Replicator};
use crate::storage::Store;
use crate::types::{Account, AuditEntry, Role, Transaction, TxType};

/// How long a submission waits for its command to commit and apply.
const PROPOSE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Node {
    inner: Arc<NodeInner>,
}

#[derive(Clone)]
pub struct NodeHandle {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    config: NodeConfig,
    store: Store,
    replicator: Arc<dyn Replicator>,
}

impl Node {
    /// Boot order matters: the audit chain is verified before the
    /// replication layer comes up, and nothing is accepted until both are
    /// ready. A corrupted chain aborts the boot.
    pub fn new(config: NodeConfig) -> LedgerResult<Self> {
        config.ensure_directories()?;
        let store = Store::open(&config.data_dir.join("db"))?;
        store.verify_chain()?;
        info!(
            node_id = %config.node_id,
            last_index = store.last_audit_index()?,
            "audit chain verified"
        );

        let fsm = Arc::new(LedgerFsm::new(store.clone()));
        let replicator: Arc<dyn Replicator> = Arc::new(LocalReplicator::new(
            config.node_id.clone(),
            config.raft_bind.to_string(),
            config.raft_bootstrap,
            config.raft_peers.clone(),
            fsm,
        ));

        Ok(Self {
            inner: Arc::new(NodeInner {
                config,
                store,
                replicator,
            }),
        })
    }

    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            inner: self.inner.clone(),
        }
    }

    pub fn close(&self) {
        self.inner.replicator.shutdown();
    }
}

impl NodeHandle {
    pub fn register_account(&self, address: &str, role: Option<Role>) -> LedgerResult<()> {
        self.inner.store.register_account(address)?;
        if let Some(role) = role {
            if role != Role::User {
                self.inner.store.set_role(address, role)?;
            }
        }
        Ok(())
    }

    pub fn grant_role(&self, address: &str, role: Role) -> LedgerResult<()> {
        self.inner.store.set_role(address, role)
    }

    pub fn get_account(&self, address: &str) -> LedgerResult<Account> {
        self.inner.store.get_account(address)
    }

    /// Wraps the signed transaction as a log command and hands it to the
    /// replication layer. Never retried here: after a timeout the command
    /// may still commit, so retrying is the client's call (with a fresh
    /// nonce).
    pub fn submit_transaction(&self, tx: Transaction) -> LedgerResult<()> {
        let payload = serde_json::to_vec(&Command::transaction(tx))?;
        self.inner.replicator.propose(payload, PROPOSE_TIMEOUT)
    }

    pub fn audit_entry(&self, index: u64) -> LedgerResult<AuditEntry> {
        self.inner.store.audit_entry(index)
    }

    pub fn audit_entries(&self) -> LedgerResult<Vec<AuditEntry>> {
        self.inner.store.audit_entries()
    }

    pub fn list_transactions(&self, requester: &str) -> LedgerResult<TransactionQuery> {
        self.inner.list_transactions(requester)
    }

    pub fn cluster_join(&self, node_id: &str, address: &str) -> LedgerResult<()> {
        self.inner.replicator.add_voter(node_id, address)
    }

    pub fn cluster_remove(&self, node_id: &str) -> LedgerResult<()> {
        self.inner.replicator.remove_server(node_id)
    }

    pub fn cluster_status(&self) -> ClusterStatus {
        self.inner.replicator.status()
    }

    pub fn node_id(&self) -> &str {
        &self.inner.config.node_id
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub index: u64,
    #[serde(rename = "type")]
    pub kind: TxType,
    pub sender: String,
    pub receiver: String,
    pub amount: u64,
    pub nonce: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub transactions: Vec<TransactionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_minted: Option<u64>,
}

impl NodeInner {
    /// Role-filtered view over the audit chain: admins see transfers,
    /// the creator sees mints to admins plus the running total. Plain users
    /// get nothing.
    fn list_transactions(&self, requester: &str) -> LedgerResult<TransactionQuery> {
        let account = self.store.get_account(requester)?;
        if account.role == Role::User {
            return Err(LedgerError::PermissionDenied(
                "transaction history requires the ADMIN or CREATOR role".into(),
            ));
        }

        let mut records = Vec::new();
        let mut total_minted = 0u64;
        for entry in self.store.audit_entries()? {
            let Ok(tx) = serde_json::from_slice::<Transaction>(&entry.tx_bytes) else {
                continue;
            };
            if account.role == Role::Admin {
                if tx.kind == TxType::Transfer {
                    records.push(record(entry.index, &tx));
                }
                continue;
            }
            if tx.kind != TxType::Mint {
                continue;
            }
            let receiver_is_admin = self
                .store
                .get_account(&tx.receiver)
                .map(|receiver| receiver.role == Role::Admin)
                .unwrap_or(false);
            if receiver_is_admin {
                total_minted = total_minted.saturating_add(tx.amount);
                records.push(record(entry.index, &tx));
            }
        }

        Ok(TransactionQuery {
            transactions: records,
            total_minted: (account.role == Role::Creator).then_some(total_minted),
        })
    }
}

fn record(index: u64, tx: &Transaction) -> TransactionRecord {
    TransactionRecord {
        index,
        kind: tx.kind,
        sender: tx.sender.clone(),
        receiver: tx.receiver.clone(),
        amount: tx.amount,
        nonce: tx.nonce,
    }
}
