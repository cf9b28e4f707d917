use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{LedgerError, LedgerResult};

/// The deterministic state machine fed by the replicated log. The replication
/// layer calls `apply` exactly once per committed index, in index order, on
/// every replica.
pub trait StateMachine: Send + Sync {
    fn apply(&self, index: u64, command: &[u8]) -> LedgerResult<()>;
    fn snapshot(&self, writer: &mut dyn Write) -> LedgerResult<()>;
    fn restore(&self, reader: &mut dyn Read) -> LedgerResult<()>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaRole {
    Follower,
    Candidate,
    Leader,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterMember {
    pub node_id: String,
    pub address: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub node_id: String,
    pub role: ReplicaRole,
    pub leader: Option<String>,
    pub last_index: u64,
    pub members: Vec<ClusterMember>,
}

/// Contract with the leader-based replication collaborator. Everything behind
/// it (elections, log shipping, membership RPCs) is the collaborator's
/// business; the ledger core only depends on this surface.
pub trait Replicator: Send + Sync {
    /// Replicates a command, blocking until it commits and the state machine
    /// responds or the deadline passes. The state machine's rejection comes
    /// back verbatim; a timed-out proposal may still commit later.
    fn propose(&self, command: Vec<u8>, timeout: Duration) -> LedgerResult<()>;
    fn role(&self) -> ReplicaRole;
    fn leader_hint(&self) -> Option<String>;
    fn add_voter(&self, node_id: &str, address: &str) -> LedgerResult<()>;
    fn remove_server(&self, node_id: &str) -> LedgerResult<()>;
    fn status(&self) -> ClusterStatus;
    fn shutdown(&self);
}

struct LogState {
    last_index: u64,
    stopped: bool,
}

/// Crash-fault, single-leader replicator running in process. Commands commit
/// in proposal order and reach the state machine exactly once per index; a
/// node started without `bootstrap` stays a follower and points submitters at
/// its configured peers.
pub struct LocalReplicator {
    node_id: String,
    fsm: Arc<dyn StateMachine>,
    log: Mutex<LogState>,
    role: RwLock<ReplicaRole>,
    leader: RwLock<Option<String>>,
    members: RwLock<Vec<ClusterMember>>,
}

impl LocalReplicator {
    pub fn new(
        node_id: String,
        address: String,
        bootstrap: bool,
        peers: Vec<String>,
        fsm: Arc<dyn StateMachine>,
    ) -> Self {
        let (role, leader, members) = if bootstrap {
            info!(%node_id, "bootstrapping single-node cluster");
            (
                ReplicaRole::Leader,
                Some(node_id.clone()),
                vec![ClusterMember {
                    node_id: node_id.clone(),
                    address,
                }],
            )
        } else {
            (ReplicaRole::Follower, peers.into_iter().next(), Vec::new())
        };
        Self {
            node_id,
            fsm,
            log: Mutex::new(LogState {
                last_index: 0,
                stopped: false,
            }),
            role: RwLock::new(role),
            leader: RwLock::new(leader),
            members: RwLock::new(members),
        }
    }

    fn require_leader(&self) -> LedgerResult<()> {
        if self.role() != ReplicaRole::Leader {
            return Err(LedgerError::NotLeader {
                leader: self.leader_hint(),
            });
        }
        Ok(())
    }
}

impl Replicator for LocalReplicator {
    fn propose(&self, command: Vec<u8>, _timeout: Duration) -> LedgerResult<()> {
        self.require_leader()?;
        let mut log = self.log.lock();
        if log.stopped {
            return Err(LedgerError::Internal("replication layer is shut down".into()));
        }
        // A rejected command still consumed its log index.
        let index = log.last_index + 1;
        let result = self.fsm.apply(index, &command);
        log.last_index = index;
        result
    }

    fn role(&self) -> ReplicaRole {
        *self.role.read()
    }

    fn leader_hint(&self) -> Option<String> {
        self.leader.read().clone()
    }

    fn add_voter(&self, node_id: &str, address: &str) -> LedgerResult<()> {
        self.require_leader()?;
        let mut members = self.members.write();
        if let Some(existing) = members.iter_mut().find(|member| member.node_id == node_id) {
            existing.address = address.to_string();
        } else {
            members.push(ClusterMember {
                node_id: node_id.to_string(),
                address: address.to_string(),
            });
        }
        info!(%node_id, %address, "added voter");
        Ok(())
    }

    fn remove_server(&self, node_id: &str) -> LedgerResult<()> {
        self.require_leader()?;
        let mut members = self.members.write();
        let before = members.len();
        members.retain(|member| member.node_id != node_id);
        if members.len() == before {
            return Err(LedgerError::NotFound(format!("cluster member {node_id}")));
        }
        info!(%node_id, "removed server");
        Ok(())
    }

    fn status(&self) -> ClusterStatus {
        ClusterStatus {
            node_id: self.node_id.clone(),
            role: self.role(),
            leader: self.leader_hint(),
            last_index: self.log.lock().last_index,
            members: self.members.read().clone(),
        }
    }

    fn shutdown(&self) {
        self.log.lock().stopped = true;
        info!(node_id = %self.node_id, "replication layer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as TestMutex;

    #[derive(Default)]
    struct RecordingFsm {
        applied: TestMutex<Vec<(u64, Vec<u8>)>>,
        reject: bool,
    }

    impl StateMachine for RecordingFsm {
        fn apply(&self, index: u64, command: &[u8]) -> LedgerResult<()> {
            self.applied.lock().push((index, command.to_vec()));
            if self.reject {
                return Err(LedgerError::InvalidArgument("rejected".into()));
            }
            Ok(())
        }

        fn snapshot(&self, _writer: &mut dyn Write) -> LedgerResult<()> {
            Ok(())
        }

        fn restore(&self, _reader: &mut dyn Read) -> LedgerResult<()> {
            Ok(())
        }
    }

    fn leader(fsm: Arc<RecordingFsm>) -> LocalReplicator {
        LocalReplicator::new("n1".into(), "127.0.0.1:7000".into(), true, Vec::new(), fsm)
    }

    #[test]
    fn bootstrap_forms_single_node_cluster() {
        let replicator = leader(Arc::new(RecordingFsm::default()));
        let status = replicator.status();
        assert_eq!(status.role, ReplicaRole::Leader);
        assert_eq!(status.leader.as_deref(), Some("n1"));
        assert_eq!(status.members.len(), 1);
    }

    #[test]
    fn commands_reach_the_fsm_in_index_order() {
        let fsm = Arc::new(RecordingFsm::default());
        let replicator = leader(fsm.clone());
        for payload in [b"a".to_vec(), b"b".to_vec(), b"c".to_vec()] {
            replicator
                .propose(payload, Duration::from_secs(5))
                .expect("propose");
        }
        let applied = fsm.applied.lock();
        let indices: Vec<u64> = applied.iter().map(|(index, _)| *index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    fn rejected_command_consumes_its_index() {
        let fsm = Arc::new(RecordingFsm {
            reject: true,
            ..RecordingFsm::default()
        });
        let replicator = leader(fsm.clone());
        assert!(replicator
            .propose(b"a".to_vec(), Duration::from_secs(5))
            .is_err());
        assert_eq!(replicator.status().last_index, 1);
    }

    #[test]
    fn follower_refuses_proposals_with_leader_hint() {
        let replicator = LocalReplicator::new(
            "n2".into(),
            "127.0.0.1:7001".into(),
            false,
            vec!["127.0.0.1:7000".into()],
            Arc::new(RecordingFsm::default()),
        );
        let err = replicator
            .propose(b"a".to_vec(), Duration::from_secs(5))
            .unwrap_err();
        match err {
            LedgerError::NotLeader { leader } => {
                assert_eq!(leader.as_deref(), Some("127.0.0.1:7000"));
            }
            other => panic!("expected NotLeader, got {other}"),
        }
    }

    #[test]
    fn shutdown_stops_new_proposals() {
        let replicator = leader(Arc::new(RecordingFsm::default()));
        replicator.shutdown();
        assert!(matches!(
            replicator.propose(b"a".to_vec(), Duration::from_secs(5)),
            Err(LedgerError::Internal(_))
        ));
    }

    #[test]
    fn membership_updates_require_leadership() {
        let replicator = leader(Arc::new(RecordingFsm::default()));
        replicator.add_voter("n2", "127.0.0.1:7001").expect("join");
        assert_eq!(replicator.status().members.len(), 2);
        replicator.remove_server("n2").expect("remove");
        assert_eq!(replicator.status().members.len(), 1);
        assert!(matches!(
            replicator.remove_server("ghost"),
            Err(LedgerError::NotFound(_))
        ));

        let follower = LocalReplicator::new(
            "n3".into(),
            "127.0.0.1:7002".into(),
            false,
            Vec::new(),
            Arc::new(RecordingFsm::default()),
        );
        assert!(matches!(
            follower.add_voter("n4", "127.0.0.1:7003"),
            Err(LedgerError::NotLeader { .. })
        ));
    }
}
