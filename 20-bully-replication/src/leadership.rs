//! This node's view of the current leader.

use std::fmt;

use parking_lot::Mutex;
use serde::Serialize;

use crate::cluster::NodeId;

/// Where this node stands in the election state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    NoLeader,
    Electing,
    Leader,
    Follower,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::NoLeader => "no-leader",
            Role::Electing => "electing",
            Role::Leader => "leader",
            Role::Follower => "follower",
        };
        f.write_str(name)
    }
}

/// The node's single mutable view of who leads the cluster.
///
/// Every RPC handler and the failure detector read it; only the elector and
/// leadership notifications write it. Last writer wins.
#[derive(Debug)]
pub struct LeadershipState {
    self_id: NodeId,
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    leader: Option<NodeId>,
    electing: bool,
}

impl LeadershipState {
    pub fn new(self_id: NodeId) -> Self {
        Self {
            self_id,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn self_id(&self) -> NodeId {
        self.self_id
    }

    pub fn current(&self) -> Option<NodeId> {
        self.inner.lock().leader
    }

    /// Overwrites the leader and returns the previous value.
    pub fn set(&self, leader: Option<NodeId>) -> Option<NodeId> {
        std::mem::replace(&mut self.inner.lock().leader, leader)
    }

    pub fn is_leader(&self) -> bool {
        self.current() == Some(self.self_id)
    }

    /// Runs `f` only while this node leads. The leadership lock is held for the whole
    /// call, so a notice cannot demote the node halfway through. `f` must not touch
    /// this state again.
    pub fn while_leading<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        let inner = self.inner.lock();
        (inner.leader == Some(self.self_id)).then(f)
    }

    pub fn role(&self) -> Role {
        let inner = self.inner.lock();
        if inner.electing {
            return Role::Electing;
        }
        match inner.leader {
            None => Role::NoLeader,
            Some(id) if id == self.self_id => Role::Leader,
            Some(_) => Role::Follower,
        }
    }

    pub(crate) fn set_electing(&self, electing: bool) {
        self.inner.lock().electing = electing;
    }
}
