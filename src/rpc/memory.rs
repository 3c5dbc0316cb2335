//! In-process cluster model.
//!
//! [`MemoryCluster`] keeps a handful of groups behind a mutex and answers
//! the admin operations the way a small healthy cluster would.  Tests
//! use the failure switches (unreachable peers, rejected
//! configurations, failing transfers) and inspect what was submitted.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::anyhow;
use tracing::debug;

use super::{
    ClientReply, ClusterClient, ClusterConnector, CommitInfo, GroupInfoReply, PeerInfo, Role,
    RoleInfo,
};
use crate::peer::{Group, GroupId, Peer, PeerId};

/// A leadership transfer as requested by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub group_id: GroupId,
    pub target: PeerId,
    pub timeout: Duration,
}

#[derive(Debug)]
struct GroupState {
    group: Group,
    leader: Option<PeerId>,
    commit_index: u64,
}

#[derive(Debug, Default)]
struct ClusterState {
    groups: Vec<GroupState>,
    unreachable: HashSet<PeerId>,
    configuration_rejection: Option<String>,
    transfer_rejection: Option<String>,
    transfer_unreachable: bool,
    submitted: Vec<(GroupId, Vec<Peer>)>,
    transfers: Vec<TransferRequest>,
    contacted: Vec<PeerId>,
    connects: usize,
    open_clients: usize,
}

impl ClusterState {
    fn group_mut(&mut self, id: GroupId) -> Option<&mut GroupState> {
        self.groups.iter_mut().find(|g| g.group.id == id)
    }

    fn reach(&mut self, peer: &PeerId) -> anyhow::Result<()> {
        self.contacted.push(peer.clone());
        if self.unreachable.contains(peer) {
            return Err(anyhow!("connection refused by {}", peer));
        }
        Ok(())
    }
}

/// Shared handle to the modelled cluster.  Clones see the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().expect("memory cluster mutex poisoned")
    }

    /// Add a group; `leader` must be one of its members.
    pub fn add_group(&self, group: Group, leader: Option<PeerId>) -> &Self {
        let leader = leader.filter(|id| group.contains(id));
        self.state().groups.push(GroupState {
            group,
            leader,
            commit_index: 0,
        });
        self
    }

    /// Make every RPC to `peer` fail at the transport level.
    pub fn set_unreachable(&self, peer: &PeerId) -> &Self {
        self.state().unreachable.insert(peer.clone());
        self
    }

    /// Answer configuration changes with a failure reply.
    pub fn reject_configuration(&self, exception: impl Into<String>) -> &Self {
        self.state().configuration_rejection = Some(exception.into());
        self
    }

    /// Answer leadership transfers with a failure reply.
    pub fn reject_transfer(&self, exception: impl Into<String>) -> &Self {
        self.state().transfer_rejection = Some(exception.into());
        self
    }

    /// Make leadership transfers fail at the transport level.
    pub fn fail_transfer(&self) -> &Self {
        self.state().transfer_unreachable = true;
        self
    }

    pub fn set_commit_index(&self, group_id: GroupId, index: u64) -> &Self {
        if let Some(g) = self.state().group_mut(group_id) {
            g.commit_index = index;
        }
        self
    }

    /// Current membership of `group_id`.
    pub fn group(&self, group_id: GroupId) -> Option<Group> {
        let mut state = self.state();
        state.group_mut(group_id).map(|g| g.group.clone())
    }

    pub fn leader(&self, group_id: GroupId) -> Option<PeerId> {
        let mut state = self.state();
        state.group_mut(group_id).and_then(|g| g.leader.clone())
    }

    /// Every configuration submitted, in order, accepted or not.
    pub fn submitted(&self) -> Vec<(GroupId, Vec<Peer>)> {
        self.state().submitted.clone()
    }

    /// Every leadership transfer requested, in order.
    pub fn transfers(&self) -> Vec<TransferRequest> {
        self.state().transfers.clone()
    }

    /// Peers addressed by `list_groups` and `group_info`, in call order.
    pub fn contacted(&self) -> Vec<PeerId> {
        self.state().contacted.clone()
    }

    /// Number of clients ever handed out.
    pub fn connects(&self) -> usize {
        self.state().connects
    }

    /// Number of clients not yet dropped.
    pub fn open_clients(&self) -> usize {
        self.state().open_clients
    }

    fn list_groups_now(&self, peer: &PeerId) -> anyhow::Result<Vec<GroupId>> {
        let mut state = self.state();
        state.reach(peer)?;
        Ok(state
            .groups
            .iter()
            .filter(|g| g.group.contains(peer))
            .map(|g| g.group.id)
            .collect())
    }

    fn group_info_now(&self, peer: &PeerId, group_id: GroupId) -> anyhow::Result<GroupInfoReply> {
        let mut state = self.state();
        state.reach(peer)?;
        let Some(g) = state.group_mut(group_id) else {
            return Ok(GroupInfoReply::failure(
                group_id,
                format!("GroupMismatchException: group {} not found", group_id),
            ));
        };
        let Some(me) = g.group.peer(peer) else {
            return Ok(GroupInfoReply::failure(
                group_id,
                format!("GroupMismatchException: {} is not a member of {}", peer, group_id),
            ));
        };
        let leader = g
            .leader
            .as_ref()
            .and_then(|id| g.group.peer(id))
            .map(PeerInfo::from);
        let role = if g.leader.as_ref() == Some(&me.id) {
            Role::Leader
        } else {
            Role::Follower
        };
        let commit_infos = g
            .group
            .peers()
            .iter()
            .map(|p| CommitInfo {
                server: PeerInfo::from(p),
                commit_index: g.commit_index,
            })
            .collect();
        Ok(GroupInfoReply {
            reply: ClientReply::ok(),
            group: g.group.clone(),
            role: Some(RoleInfo {
                role,
                self_peer: PeerInfo::from(me),
                leader,
            }),
            commit_infos,
        })
    }

    fn set_configuration_now(&self, group_id: GroupId, peers: &[Peer]) -> anyhow::Result<ClientReply> {
        let mut state = self.state();
        state.submitted.push((group_id, peers.to_vec()));
        if let Some(exception) = state.configuration_rejection.clone() {
            return Ok(ClientReply::failure(exception));
        }
        let unreachable = state.unreachable.clone();
        let Some(g) = state.group_mut(group_id) else {
            return Ok(ClientReply::failure(format!(
                "GroupMismatchException: group {} not found",
                group_id
            )));
        };
        if g.group.peers().iter().all(|p| unreachable.contains(&p.id)) {
            return Err(anyhow!("no peer of group {} is reachable", group_id));
        }
        g.group = Group::new(group_id, peers.to_vec());
        if let Some(leader) = &g.leader {
            if !g.group.contains(leader) {
                g.leader = None;
            }
        }
        g.commit_index += 1;
        debug!("Group {} now has {} peers", group_id, g.group.peers().len());
        Ok(ClientReply::ok())
    }

    fn transfer_leadership_now(
        &self,
        group_id: GroupId,
        target: &PeerId,
        timeout: Duration,
    ) -> anyhow::Result<ClientReply> {
        let mut state = self.state();
        state.transfers.push(TransferRequest {
            group_id,
            target: target.clone(),
            timeout,
        });
        if state.transfer_unreachable {
            return Err(anyhow!("transfer of group {} timed out", group_id));
        }
        if let Some(exception) = state.transfer_rejection.clone() {
            return Ok(ClientReply::failure(exception));
        }
        let Some(g) = state.group_mut(group_id) else {
            return Ok(ClientReply::failure(format!(
                "GroupMismatchException: group {} not found",
                group_id
            )));
        };
        if !g.group.contains(target) {
            return Ok(ClientReply::failure(format!(
                "TransferLeadershipException: {} is not a member of {}",
                target, group_id
            )));
        }
        g.leader = Some(target.clone());
        Ok(ClientReply::ok())
    }
}

impl ClusterConnector for MemoryCluster {
    fn connect(&self, group: &Group) -> anyhow::Result<Box<dyn ClusterClient>> {
        let mut state = self.state();
        state.connects += 1;
        state.open_clients += 1;
        Ok(Box::new(MemoryClient {
            cluster: self.clone(),
            group_id: group.id,
        }))
    }
}

/// Client bound to one group of a [`MemoryCluster`].
#[derive(Debug)]
pub struct MemoryClient {
    cluster: MemoryCluster,
    group_id: GroupId,
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        let mut state = self.cluster.state();
        state.open_clients = state.open_clients.saturating_sub(1);
    }
}

impl ClusterClient for MemoryClient {
    fn list_groups(
        &self,
        peer: &Peer,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<GroupId>>> + Send + '_>> {
        let result = self.cluster.list_groups_now(&peer.id);
        Box::pin(async move { result })
    }

    fn group_info(
        &self,
        peer: &Peer,
        group_id: GroupId,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<GroupInfoReply>> + Send + '_>> {
        let result = self.cluster.group_info_now(&peer.id, group_id);
        Box::pin(async move { result })
    }

    fn set_configuration(
        &self,
        peers: &[Peer],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ClientReply>> + Send + '_>> {
        let result = self.cluster.set_configuration_now(self.group_id, peers);
        Box::pin(async move { result })
    }

    fn transfer_leadership(
        &self,
        target: &PeerId,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ClientReply>> + Send + '_>> {
        let result = self
            .cluster
            .transfer_leadership_now(self.group_id, target, timeout);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::PeerAddress;

    fn peer(host: &str) -> Peer {
        Peer::from_address(PeerAddress::new(host, 9870))
    }

    fn three_node() -> (MemoryCluster, Group) {
        let group = Group::new(GroupId::DEFAULT, vec![peer("h1"), peer("h2"), peer("h3")]);
        let cluster = MemoryCluster::new();
        cluster.add_group(group.clone(), Some(peer("h1").id));
        (cluster, group)
    }

    #[tokio::test]
    async fn test_group_info_reports_roles() {
        let (cluster, group) = three_node();
        let client = cluster.connect(&group).unwrap();

        let leader = client.group_info(&peer("h1"), group.id).await.unwrap();
        assert_eq!(leader.role.as_ref().unwrap().role, Role::Leader);

        let follower = client.group_info(&peer("h2"), group.id).await.unwrap();
        let role = follower.role.unwrap();
        assert_eq!(role.role, Role::Follower);
        assert_eq!(role.leader().unwrap().id, peer("h1").id);
        assert_eq!(follower.commit_infos.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_group_is_a_failed_reply() {
        let (cluster, group) = three_node();
        let client = cluster.connect(&group).unwrap();
        let other = GroupId::from_uuid(uuid::Uuid::from_u128(9));
        let reply = client.group_info(&peer("h1"), other).await.unwrap();
        assert!(!reply.reply.success);
        assert!(reply.group.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_peer_errors() {
        let (cluster, group) = three_node();
        cluster.set_unreachable(&peer("h2").id);
        let client = cluster.connect(&group).unwrap();
        assert!(client.list_groups(&peer("h2")).await.is_err());
        assert_eq!(client.list_groups(&peer("h3")).await.unwrap(), vec![group.id]);
        assert_eq!(cluster.contacted(), vec![peer("h2").id, peer("h3").id]);
    }

    #[tokio::test]
    async fn test_configuration_applies_and_drops_removed_leader() {
        let (cluster, group) = three_node();
        let client = cluster.connect(&group).unwrap();
        let reply = client
            .set_configuration(&[peer("h2"), peer("h3")])
            .await
            .unwrap();
        assert!(reply.success);
        assert_eq!(cluster.group(group.id).unwrap().peers().len(), 2);
        assert_eq!(cluster.leader(group.id), None);
        assert_eq!(cluster.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_configuration_is_recorded_but_not_applied() {
        let (cluster, group) = three_node();
        cluster.reject_configuration("SetConfigurationException: busy");
        let client = cluster.connect(&group).unwrap();
        let reply = client.set_configuration(&[peer("h1")]).await.unwrap();
        assert!(!reply.success);
        assert_eq!(cluster.group(group.id).unwrap().peers().len(), 3);
        assert_eq!(cluster.submitted()[0].1, vec![peer("h1")]);
    }

    #[tokio::test]
    async fn test_transfer_moves_leader() {
        let (cluster, group) = three_node();
        let client = cluster.connect(&group).unwrap();
        let reply = client
            .transfer_leadership(&peer("h3").id, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(reply.success);
        assert_eq!(cluster.leader(group.id), Some(peer("h3").id));
        assert_eq!(cluster.transfers()[0].timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_dropping_client_releases_it() {
        let (cluster, group) = three_node();
        let a = cluster.connect(&group).unwrap();
        let b = cluster.connect(&group).unwrap();
        assert_eq!(cluster.open_clients(), 2);
        drop(a);
        drop(b);
        assert_eq!(cluster.open_clients(), 0);
        assert_eq!(cluster.connects(), 2);
    }
}
