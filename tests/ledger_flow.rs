use ledgerd::config::NodeConfig;
use ledgerd::crypto::{address_from_public_key, generate_keypair};
use ledgerd::errors::LedgerError;
use ledgerd::node::{Node, NodeHandle};
use ledgerd::types::{AuditEntry, Role, Transaction, TxType};
use p256::ecdsa::SigningKey;
use rocksdb::{MultiThreaded, Options, TransactionDB, TransactionDBOptions};
use tempfile::TempDir;

fn test_config(dir: &TempDir) -> NodeConfig {
    NodeConfig {
        node_id: "n1".into(),
        data_dir: dir.path().join("data"),
        raft_dir: dir.path().join("raft"),
        raft_bind: "127.0.0.1:7000".parse().expect("socket addr"),
        http_port: 8080,
        raft_peers: Vec::new(),
        raft_bootstrap: true,
    }
}

struct Wallet {
    key: SigningKey,
    address: String,
}

fn wallet() -> Wallet {
    let key = generate_keypair();
    let address = address_from_public_key(key.verifying_key());
    Wallet { key, address }
}

struct TestLedger {
    dir: TempDir,
    node: Node,
    handle: NodeHandle,
    creator: Wallet,
    admin: Wallet,
    user: Wallet,
}

fn ledger() -> TestLedger {
    let dir = tempfile::tempdir().expect("tempdir");
    let node = Node::new(test_config(&dir)).expect("boot");
    let handle = node.handle();

    let creator = wallet();
    let admin = wallet();
    let user = wallet();
    handle
        .register_account(&creator.address, Some(Role::Creator))
        .expect("register creator");
    handle
        .register_account(&admin.address, Some(Role::Admin))
        .expect("register admin");
    handle
        .register_account(&user.address, None)
        .expect("register user");

    TestLedger {
        dir,
        node,
        handle,
        creator,
        admin,
        user,
    }
}

fn signed(
    wallet: &Wallet,
    kind: TxType,
    receiver: &str,
    amount: u64,
    nonce: u64,
) -> Transaction {
    let mut tx = Transaction::new(
        kind,
        wallet.address.clone(),
        receiver.to_string(),
        amount,
        nonce,
    );
    tx.sign(&wallet.key);
    tx
}

#[test]
fn mint_happy_path() {
    let ledger = ledger();
    let mint = signed(&ledger.creator, TxType::Mint, &ledger.admin.address, 5_000, 1);
    ledger.handle.submit_transaction(mint).expect("mint");

    let creator = ledger.handle.get_account(&ledger.creator.address).unwrap();
    let admin = ledger.handle.get_account(&ledger.admin.address).unwrap();
    assert_eq!(creator.nonce, 1);
    assert_eq!(admin.balance, 5_000);
    assert_eq!(ledger.handle.audit_entries().unwrap().len(), 1);
}

#[test]
fn transfer_then_replay_is_rejected() {
    let ledger = ledger();
    let mint = signed(&ledger.creator, TxType::Mint, &ledger.admin.address, 5_000, 1);
    ledger.handle.submit_transaction(mint).expect("mint");

    let transfer = signed(&ledger.admin, TxType::Transfer, &ledger.user.address, 1_000, 1);
    ledger
        .handle
        .submit_transaction(transfer.clone())
        .expect("transfer");

    let admin = ledger.handle.get_account(&ledger.admin.address).unwrap();
    let user = ledger.handle.get_account(&ledger.user.address).unwrap();
    assert_eq!(admin.balance, 4_000);
    assert_eq!(admin.nonce, 1);
    assert_eq!(user.balance, 1_000);
    assert_eq!(ledger.handle.audit_entries().unwrap().len(), 2);

    // The exact same signed bytes must not apply twice.
    let err = ledger.handle.submit_transaction(transfer).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::NonceMismatch {
            expected: 2,
            got: 1
        }
    ));
    let admin = ledger.handle.get_account(&ledger.admin.address).unwrap();
    assert_eq!(admin.balance, 4_000);
    assert_eq!(ledger.handle.audit_entries().unwrap().len(), 2);
}

#[test]
fn unauthorized_mint_is_denied() {
    let ledger = ledger();
    let mint = signed(&ledger.user, TxType::Mint, &ledger.admin.address, 100, 1);
    let err = ledger.handle.submit_transaction(mint).unwrap_err();
    assert!(matches!(err, LedgerError::PermissionDenied(_)));
    assert_eq!(ledger.handle.audit_entries().unwrap().len(), 0);
}

#[test]
fn freeze_blocks_transfers_until_unfrozen() {
    let ledger = ledger();
    let mint = signed(&ledger.creator, TxType::Mint, &ledger.admin.address, 5_000, 1);
    ledger.handle.submit_transaction(mint).expect("mint");
    let fund_user = signed(&ledger.admin, TxType::Transfer, &ledger.user.address, 2_000, 1);
    ledger.handle.submit_transaction(fund_user).expect("fund");

    let freeze = signed(&ledger.creator, TxType::Freeze, &ledger.user.address, 0, 0);
    ledger.handle.submit_transaction(freeze).expect("freeze");
    assert!(ledger.handle.get_account(&ledger.user.address).unwrap().is_frozen);

    let transfer = signed(&ledger.user, TxType::Transfer, &ledger.admin.address, 500, 1);
    let err = ledger
        .handle
        .submit_transaction(transfer.clone())
        .unwrap_err();
    assert!(matches!(err, LedgerError::Frozen(_)));

    let unfreeze = signed(&ledger.creator, TxType::Unfreeze, &ledger.user.address, 0, 0);
    ledger.handle.submit_transaction(unfreeze).expect("unfreeze");

    // The failed attempt consumed no nonce, so the same signed transfer now
    // applies.
    ledger.handle.submit_transaction(transfer).expect("transfer");
    let user = ledger.handle.get_account(&ledger.user.address).unwrap();
    assert_eq!(user.balance, 1_500);
    assert_eq!(user.nonce, 1);
}

#[test]
fn mint_with_zero_amount_is_invalid() {
    let ledger = ledger();
    let mint = signed(&ledger.creator, TxType::Mint, &ledger.admin.address, 0, 1);
    let err = ledger.handle.submit_transaction(mint).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidArgument(_)));
}

#[test]
fn mint_to_unregistered_receiver_fails() {
    let ledger = ledger();
    let ghost = wallet();
    let mint = signed(&ledger.creator, TxType::Mint, &ghost.address, 100, 1);
    let err = ledger.handle.submit_transaction(mint).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn creator_query_totals_mints_to_admins() {
    let ledger = ledger();
    let mint = signed(&ledger.creator, TxType::Mint, &ledger.admin.address, 5_000, 1);
    ledger.handle.submit_transaction(mint).expect("mint");
    let transfer = signed(&ledger.admin, TxType::Transfer, &ledger.user.address, 1_000, 1);
    ledger.handle.submit_transaction(transfer).expect("transfer");

    let creator_view = ledger
        .handle
        .list_transactions(&ledger.creator.address)
        .expect("query");
    assert_eq!(creator_view.transactions.len(), 1);
    assert_eq!(creator_view.transactions[0].kind, TxType::Mint);
    assert_eq!(creator_view.total_minted, Some(5_000));

    let admin_view = ledger
        .handle
        .list_transactions(&ledger.admin.address)
        .expect("query");
    assert_eq!(admin_view.transactions.len(), 1);
    assert_eq!(admin_view.transactions[0].kind, TxType::Transfer);
    assert_eq!(admin_view.total_minted, None);

    let err = ledger
        .handle
        .list_transactions(&ledger.user.address)
        .unwrap_err();
    assert!(matches!(err, LedgerError::PermissionDenied(_)));
}

#[test]
fn tampered_audit_entry_fails_the_next_boot() {
    let ledger = ledger();
    let mint = signed(&ledger.creator, TxType::Mint, &ledger.admin.address, 5_000, 1);
    ledger.handle.submit_transaction(mint).expect("mint");
    let transfer = signed(&ledger.admin, TxType::Transfer, &ledger.user.address, 1_000, 1);
    ledger.handle.submit_transaction(transfer).expect("transfer");
    let freeze = signed(&ledger.creator, TxType::Freeze, &ledger.user.address, 0, 0);
    ledger.handle.submit_transaction(freeze).expect("freeze");
    assert_eq!(ledger.handle.audit_entries().unwrap().len(), 3);

    let config = test_config(&ledger.dir);
    let TestLedger {
        dir, node, handle, ..
    } = ledger;
    node.close();
    drop(handle);
    drop(node);

    // Rewrite entry 3's payload behind the node's back.
    let db_path = dir.path().join("data/db");
    let db: TransactionDB<MultiThreaded> = TransactionDB::open(
        &Options::default(),
        &TransactionDBOptions::default(),
        &db_path,
    )
    .expect("reopen raw db");
    let mut key = b"audit:entry:".to_vec();
    key.extend_from_slice(&3u64.to_le_bytes());
    let raw = db.get(&key).expect("read").expect("entry present");
    let mut entry = AuditEntry::decode(&raw).expect("decode");
    entry.tx_bytes = b"forged payload".to_vec();
    db.put(&key, entry.encode()).expect("overwrite");
    drop(db);

    let err = Node::new(config).err().expect("boot must fail");
    assert!(matches!(err, LedgerError::ChainCorrupted { index: 3, .. }));
}
