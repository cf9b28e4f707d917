//! Permissioned replicated value-ledger node.
//!
//! The ledger tracks accounts (balance, monotonic nonce, freeze flag, role)
//! and applies signed mint/transfer/freeze/unfreeze transactions through a
//! leader-based replicated log. Every applied transaction is also recorded
//! in a hash-linked audit chain that is re-verified on boot.
//!
//! `storage` owns the transactional keyspace shared by the account store and
//! the audit chain, `validator` and `fsm` implement the deterministic apply
//! pipeline, and `replication` pins the contract with the consensus
//! collaborator. Applications bootstrap through [`config::NodeConfig`] and
//! [`node::Node`], and expose the service operations over HTTP via `api`.

pub mod api;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod fsm;
pub mod node;
pub mod replication;
pub mod storage;
pub mod types;
pub mod validator;
