//! Group resolution.
//!
//! Turns the operator's `-peers` / `-groupid` / `-serviceid` options into
//! the group as the cluster itself reports it.  Every reconfiguration
//! command works on the [`ResolvedGroup`], never on the raw options.

use tracing::{debug, info};

use crate::config::keys::{SERVICE_GROUP_ID, SERVICE_PEERS};
use crate::config::Configuration;
use crate::errors::AdminError;
use crate::peer::{parse_peer_list, Group, GroupId, Peer, PeerAddress};
use crate::retry;
use crate::rpc::{ClusterClient, ClusterConnector, GroupInfoReply};

/// Group selection options as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct GroupRequest {
    pub peers: Option<String>,
    pub group_id: Option<String>,
    pub service_id: Option<String>,
}

/// Where the seed group id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seed {
    Explicit(GroupId),
    Configured(GroupId),
    Fallback,
}

/// The group a command operates on.
#[derive(Debug, Clone)]
pub struct ResolvedGroup {
    /// Members confirmed by the cluster, with the cluster's addresses and priorities.
    pub group: Group,
    /// Operator-supplied peers the cluster did not list as members.
    pub contacts: Vec<Peer>,
    /// The group info reply members were taken from.
    pub info: GroupInfoReply,
}

impl ResolvedGroup {
    /// Members followed by the extra contact points.
    pub fn contact_peers(&self) -> Vec<Peer> {
        let mut peers = self.group.peers().to_vec();
        peers.extend(self.contacts.iter().cloned());
        peers
    }
}

pub struct GroupResolver<'a> {
    conf: &'a Configuration,
    connector: &'a dyn ClusterConnector,
}

impl<'a> GroupResolver<'a> {
    pub fn new(conf: &'a Configuration, connector: &'a dyn ClusterConnector) -> Self {
        Self { conf, connector }
    }

    pub async fn resolve(&self, request: &GroupRequest) -> Result<ResolvedGroup, AdminError> {
        let addresses = self.peer_addresses(request)?;
        let seed = self.seed(request)?;
        let candidate = Group::new(
            match seed {
                Seed::Explicit(id) | Seed::Configured(id) => id,
                Seed::Fallback => GroupId::DEFAULT,
            },
            addresses.into_iter().map(Peer::from_address),
        );
        if candidate.is_empty() {
            return Err(AdminError::invalid_argument("no peer address given"));
        }

        let client = self.connector.connect(&candidate)?;
        let group_id = match seed {
            Seed::Explicit(id) | Seed::Configured(id) => id,
            Seed::Fallback => discover(client.as_ref(), &candidate).await?,
        };
        let info = fetch_info(client.as_ref(), &candidate, group_id).await?;
        drop(client);

        let group = Group::new(group_id, info.group.peers().iter().cloned());
        let contacts: Vec<Peer> = candidate
            .peers()
            .iter()
            .filter(|p| group.peer_at(&p.address).is_none())
            .cloned()
            .collect();
        for peer in &contacts {
            debug!("{} is not a member of {}, keeping it as a contact point", peer.address, group_id);
        }
        info!("Resolved group {} with {} members", group_id, group.peers().len());
        Ok(ResolvedGroup {
            group,
            contacts,
            info,
        })
    }

    fn peer_addresses(&self, request: &GroupRequest) -> Result<Vec<PeerAddress>, AdminError> {
        let list = match (&request.peers, &request.service_id) {
            (Some(peers), _) => peers.clone(),
            (None, Some(service_id)) => {
                let key = self.conf.template_key(&SERVICE_PEERS, service_id);
                self.conf.get(&key)?
            }
            (None, None) => {
                return Err(AdminError::invalid_argument(
                    "should provide at least one of [serviceid] and [peers]",
                ))
            }
        };
        let addresses = parse_peer_list(&list)?;
        if addresses.is_empty() {
            return Err(AdminError::invalid_argument("no peer address given"));
        }
        Ok(addresses)
    }

    fn seed(&self, request: &GroupRequest) -> Result<Seed, AdminError> {
        if let Some(raw) = &request.group_id {
            let id = raw.parse::<GroupId>().map_err(|e| {
                AdminError::invalid_argument(format!("invalid group id \"{}\": {}", raw, e))
            })?;
            return Ok(Seed::Explicit(id));
        }
        let Some(service_id) = &request.service_id else {
            return Ok(Seed::Fallback);
        };
        let key = self.conf.template_key(&SERVICE_GROUP_ID, service_id);
        match self.conf.get(&key) {
            Ok(raw) => match raw.parse::<GroupId>() {
                Ok(id) => Ok(Seed::Configured(id)),
                Err(e) => {
                    debug!("Ignoring {} = \"{}\": {}", key, raw, e);
                    Ok(Seed::Fallback)
                }
            },
            Err(e) => {
                debug!("No group id configured for service {}: {}", service_id, e);
                Ok(Seed::Fallback)
            }
        }
    }
}

/// The single group advertised by the candidate peers.
async fn discover(client: &dyn ClusterClient, candidate: &Group) -> Result<GroupId, AdminError> {
    let ids = retry::run(candidate.peers(), |peer| async move {
        let ids = client.list_groups(peer).await?;
        Ok::<_, anyhow::Error>((!ids.is_empty()).then_some(ids))
    })
    .await
    .ok_or_else(|| no_reachable_peer("list groups", candidate))?;
    match ids.as_slice() {
        [only] => {
            debug!("Discovered group {}", only);
            Ok(*only)
        }
        _ => Err(AdminError::AmbiguousGroup { group_ids: ids }),
    }
}

async fn fetch_info(
    client: &dyn ClusterClient,
    candidate: &Group,
    group_id: GroupId,
) -> Result<GroupInfoReply, AdminError> {
    retry::run(candidate.peers(), |peer| async move {
        let reply = client.group_info(peer, group_id).await?;
        if !reply.reply.success {
            debug!("{} answered group info with: {}", peer, reply.reply.error_message());
            return Ok(None);
        }
        Ok::<_, anyhow::Error>((!reply.group.is_empty()).then_some(reply))
    })
    .await
    .ok_or_else(|| no_reachable_peer("group info", candidate))
}

fn no_reachable_peer(operation: &'static str, candidate: &Group) -> AdminError {
    AdminError::NoReachablePeer {
        operation,
        peers: candidate
            .peers()
            .iter()
            .map(|p| p.address.to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::memory::MemoryCluster;

    fn peer(host: &str) -> Peer {
        Peer::from_address(PeerAddress::new(host, 9870))
    }

    fn gid(n: u128) -> GroupId {
        GroupId::from_uuid(uuid::Uuid::from_u128(n))
    }

    fn by_peers(peers: &str) -> GroupRequest {
        GroupRequest {
            peers: Some(peers.to_string()),
            ..GroupRequest::default()
        }
    }

    #[tokio::test]
    async fn test_discovers_single_advertised_group() {
        let cluster = MemoryCluster::new();
        cluster.add_group(
            Group::new(gid(7), vec![peer("h1"), peer("h2"), peer("h3")]),
            Some(peer("h1").id),
        );
        let conf = Configuration::new();
        let resolved = GroupResolver::new(&conf, &cluster)
            .resolve(&by_peers("h1:9870,h2:9870,h3:9870"))
            .await
            .unwrap();
        assert_eq!(resolved.group.id, gid(7));
        assert_eq!(resolved.group.peers().len(), 3);
        assert!(resolved.contacts.is_empty());
        assert_eq!(cluster.open_clients(), 0);
    }

    #[tokio::test]
    async fn test_two_groups_are_ambiguous() {
        let cluster = MemoryCluster::new();
        cluster
            .add_group(Group::new(gid(1), vec![peer("h1"), peer("h2")]), None)
            .add_group(Group::new(gid(2), vec![peer("h1"), peer("h3")]), None);
        let conf = Configuration::new();
        let err = GroupResolver::new(&conf, &cluster)
            .resolve(&by_peers("h1:9870,h2:9870,h3:9870"))
            .await
            .unwrap_err();
        match err {
            AdminError::AmbiguousGroup { group_ids } => {
                assert_eq!(group_ids, vec![gid(1), gid(2)]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_discovery_adopts_first_peer_with_a_group() {
        let cluster = MemoryCluster::new();
        cluster
            .add_group(Group::new(gid(1), vec![peer("h1")]), Some(peer("h1").id))
            .add_group(Group::new(gid(2), vec![peer("h2")]), Some(peer("h2").id));
        let conf = Configuration::new();
        let resolved = GroupResolver::new(&conf, &cluster)
            .resolve(&by_peers("h1:9870,h2:9870"))
            .await
            .unwrap();
        assert_eq!(resolved.group.id, gid(1));
        assert_eq!(resolved.group.peers(), &[peer("h1")]);
        assert_eq!(resolved.contacts, vec![peer("h2")]);
    }

    #[tokio::test]
    async fn test_explicit_group_id_skips_discovery() {
        let cluster = MemoryCluster::new();
        cluster
            .add_group(Group::new(gid(1), vec![peer("h1")]), None)
            .add_group(Group::new(gid(2), vec![peer("h1")]), None);
        let conf = Configuration::new();
        let request = GroupRequest {
            group_id: Some(gid(2).to_string()),
            ..by_peers("h1:9870")
        };
        let resolved = GroupResolver::new(&conf, &cluster)
            .resolve(&request)
            .await
            .unwrap();
        assert_eq!(resolved.group.id, gid(2));
    }

    #[tokio::test]
    async fn test_unreachable_peers_are_skipped() {
        let cluster = MemoryCluster::new();
        cluster
            .add_group(
                Group::new(gid(3), vec![peer("h1"), peer("h2"), peer("h3")]),
                None,
            )
            .set_unreachable(&peer("h1").id);
        let conf = Configuration::new();
        let resolved = GroupResolver::new(&conf, &cluster)
            .resolve(&by_peers("h1:9870,h2:9870"))
            .await
            .unwrap();
        assert_eq!(resolved.group.id, gid(3));
        assert_eq!(resolved.group.peers().len(), 3);
    }

    #[tokio::test]
    async fn test_no_reachable_peer() {
        let cluster = MemoryCluster::new();
        cluster
            .add_group(Group::new(gid(3), vec![peer("h1"), peer("h2")]), None)
            .set_unreachable(&peer("h1").id)
            .set_unreachable(&peer("h2").id);
        let conf = Configuration::new();
        let err = GroupResolver::new(&conf, &cluster)
            .resolve(&by_peers("h1:9870,h2:9870"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, AdminError::NoReachablePeer { operation: "list groups", ref peers } if peers.len() == 2)
        );
    }

    #[tokio::test]
    async fn test_unconfirmed_peer_is_only_a_contact() {
        let cluster = MemoryCluster::new();
        cluster.add_group(Group::new(gid(4), vec![peer("h1"), peer("h2")]), None);
        let conf = Configuration::new();
        let resolved = GroupResolver::new(&conf, &cluster)
            .resolve(&by_peers("h1:9870,h9:9870"))
            .await
            .unwrap();
        assert_eq!(resolved.group.peers(), &[peer("h1"), peer("h2")]);
        assert_eq!(resolved.contacts, vec![peer("h9")]);
        assert_eq!(resolved.contact_peers().len(), 3);
    }

    #[tokio::test]
    async fn test_service_id_supplies_peers_and_group() {
        let cluster = MemoryCluster::new();
        cluster
            .add_group(Group::new(gid(5), vec![peer("h1")]), None)
            .add_group(Group::new(gid(6), vec![peer("h1")]), None);
        let mut conf = Configuration::new();
        conf.merge([
            ("quorumsh.meta.peers", "h1:9870".to_string()),
            ("quorumsh.meta.groupid", gid(6).to_string()),
        ]);
        let request = GroupRequest {
            service_id: Some("meta".into()),
            ..GroupRequest::default()
        };
        let resolved = GroupResolver::new(&conf, &cluster)
            .resolve(&request)
            .await
            .unwrap();
        assert_eq!(resolved.group.id, gid(6));
    }

    #[tokio::test]
    async fn test_invalid_configured_group_id_falls_back_to_discovery() {
        let cluster = MemoryCluster::new();
        cluster.add_group(Group::new(gid(8), vec![peer("h1")]), None);
        let mut conf = Configuration::new();
        conf.merge([
            ("quorumsh.meta.peers", "h1:9870"),
            ("quorumsh.meta.groupid", "not-a-uuid"),
        ]);
        let request = GroupRequest {
            service_id: Some("meta".into()),
            ..GroupRequest::default()
        };
        let resolved = GroupResolver::new(&conf, &cluster)
            .resolve(&request)
            .await
            .unwrap();
        assert_eq!(resolved.group.id, gid(8));
    }

    #[tokio::test]
    async fn test_input_errors_precede_network_calls() {
        let cluster = MemoryCluster::new();
        let conf = Configuration::new();
        let resolver = GroupResolver::new(&conf, &cluster);

        let err = resolver.resolve(&by_peers("h1:9870,h2")).await.unwrap_err();
        assert!(matches!(err, AdminError::InvalidAddress { .. }));

        let err = resolver
            .resolve(&GroupRequest {
                group_id: Some("1-2-3".into()),
                ..by_peers("h1:9870")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::InvalidArgument { .. }));

        let err = resolver.resolve(&GroupRequest::default()).await.unwrap_err();
        assert!(matches!(err, AdminError::InvalidArgument { .. }));

        assert_eq!(cluster.connects(), 0);
    }
}
