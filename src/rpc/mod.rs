//! Cluster RPC endpoint capability.
//!
//! The shell never talks to a transport directly.  It asks a
//! [`ClusterConnector`] for a [`ClusterClient`] bound to one group and
//! drives the four admin operations through it.  Two implementations
//! ship with the crate: [`http`] for real clusters and [`memory`] for
//! tests and dry runs.

pub mod http;
pub mod memory;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::peer::{Group, GroupId, Peer, PeerAddress, PeerId};

/// Opens clients for a group.
pub trait ClusterConnector: Send + Sync {
    /// A client addressing `group`.  Dropping it releases the connection.
    fn connect(&self, group: &Group) -> anyhow::Result<Box<dyn ClusterClient>>;
}

/// Admin operations against one group.
pub trait ClusterClient: Send + Sync {
    /// Ids of every group `peer` participates in.
    fn list_groups(
        &self,
        peer: &Peer,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<GroupId>>> + Send + '_>>;

    /// Membership, role and commit state of `group_id` as seen by `peer`.
    fn group_info(
        &self,
        peer: &Peer,
        group_id: GroupId,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<GroupInfoReply>> + Send + '_>>;

    /// Replace the bound group's membership and priorities.
    fn set_configuration(
        &self,
        peers: &[Peer],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ClientReply>> + Send + '_>>;

    /// Ask the group to hand leadership to `target` within `timeout`.
    fn transfer_leadership(
        &self,
        target: &PeerId,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ClientReply>> + Send + '_>>;
}

// -- Replies -----------------------------------------------------------------

/// Outcome of a cluster request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    /// Set when the receiving peer is not the leader and did not apply the request.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub not_leader: bool,
    /// The leader as known by the receiving peer, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader_hint: Option<PeerAddress>,
}

impl ClientReply {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(exception: impl Into<String>) -> Self {
        Self {
            success: false,
            exception: Some(exception.into()),
            ..Self::default()
        }
    }

    /// Rejection by a follower, optionally pointing at the leader.
    pub fn not_leader(hint: Option<PeerAddress>) -> Self {
        Self {
            success: false,
            exception: Some("NotLeaderException: request was sent to a non-leader peer".into()),
            not_leader: true,
            leader_hint: hint,
        }
    }

    /// Text describing why the request failed.
    pub fn error_message(&self) -> String {
        match &self.exception {
            Some(e) => e.clone(),
            None => "reply failed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Leader,
    Follower,
    Candidate,
    Listener,
}

/// Id and address of a server, as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub address: PeerAddress,
}

impl From<&Peer> for PeerInfo {
    fn from(peer: &Peer) -> Self {
        Self {
            id: peer.id.clone(),
            address: peer.address.clone(),
        }
    }
}

/// Role of the answering server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
    pub role: Role,
    #[serde(rename = "self")]
    pub self_peer: PeerInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leader: Option<PeerInfo>,
}

impl RoleInfo {
    /// The current leader: the answering server itself when it leads.
    pub fn leader(&self) -> Option<&PeerInfo> {
        match self.role {
            Role::Leader => Some(&self.self_peer),
            _ => self.leader.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub server: PeerInfo,
    pub commit_index: u64,
}

/// Answer to a group info request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfoReply {
    #[serde(flatten)]
    pub reply: ClientReply,
    pub group: Group,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleInfo>,
    #[serde(default)]
    pub commit_infos: Vec<CommitInfo>,
}

impl GroupInfoReply {
    /// A failed reply carrying no group state.
    pub fn failure(group_id: GroupId, exception: impl Into<String>) -> Self {
        Self {
            reply: ClientReply::failure(exception),
            group: Group::new(group_id, Vec::new()),
            role: None,
            commit_infos: Vec::new(),
        }
    }
}
