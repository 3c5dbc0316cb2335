//! JSON-over-HTTP cluster client.
//!
//! Every peer is expected to serve a small admin API under `/v1`:
//!
//! | Operation | Request |
//! |---|---|
//! | list groups | `GET /v1/groups` |
//! | group info | `GET /v1/groups/{gid}` |
//! | set configuration | `POST /v1/groups/{gid}/configuration` |
//! | transfer leadership | `POST /v1/groups/{gid}/leadership` |
//!
//! Reads go to the peer they name.  Mutations start at the first member
//! and follow `not_leader` rejections (and their leader hints) until some
//! peer gives a real answer.  Transport errors on mutations are returned
//! as-is; they are never retried.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ClientReply, ClusterClient, ClusterConnector, GroupInfoReply};
use crate::config::keys::{RPC_REQUEST_TIMEOUT_MS, RPC_SCHEME};
use crate::config::Configuration;
use crate::errors::ConfigError;
use crate::peer::{Group, GroupId, Peer, PeerAddress, PeerId};

#[derive(Debug, Serialize, Deserialize)]
struct GroupListResponse {
    group_ids: Vec<GroupId>,
}

#[derive(Debug, Serialize)]
struct ConfigurationRequest<'a> {
    peers: &'a [Peer],
}

#[derive(Debug, Serialize)]
struct TransferRequest<'a> {
    target: &'a PeerId,
    timeout_ms: u64,
}

/// Builds [`HttpClusterClient`]s.
#[derive(Debug, Clone)]
pub struct HttpConnector {
    scheme: String,
    request_timeout: Duration,
}

impl HttpConnector {
    pub fn new(scheme: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            scheme: scheme.into(),
            request_timeout,
        }
    }

    /// Scheme and timeout from `quorumsh.rpc.*`.
    pub fn from_config(conf: &Configuration) -> Result<Self, ConfigError> {
        let scheme = conf.get(&RPC_SCHEME)?;
        let request_timeout = conf.get_duration_ms(&RPC_REQUEST_TIMEOUT_MS)?;
        Ok(Self::new(scheme, request_timeout))
    }
}

impl ClusterConnector for HttpConnector {
    fn connect(&self, group: &Group) -> anyhow::Result<Box<dyn ClusterClient>> {
        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;
        debug!(
            "HTTP cluster client for group {} ({} peers)",
            group.id,
            group.peers().len()
        );
        Ok(Box::new(HttpClusterClient {
            http,
            scheme: self.scheme.clone(),
            request_timeout: self.request_timeout,
            group: group.clone(),
        }))
    }
}

/// Client for one group over HTTP.
#[derive(Debug)]
pub struct HttpClusterClient {
    http: reqwest::Client,
    scheme: String,
    request_timeout: Duration,
    group: Group,
}

impl HttpClusterClient {
    fn url(&self, address: &PeerAddress, path: &str) -> String {
        format!("{}://{}/v1{}", self.scheme, address, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, address: &PeerAddress, path: &str) -> anyhow::Result<T> {
        let url = self.url(address, path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;
        decode(&url, resp).await
    }

    /// POST `body` to the leader, following `not_leader` rejections.
    async fn submit<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> anyhow::Result<ClientReply> {
        let mut pending: VecDeque<PeerAddress> =
            self.group.peers().iter().map(|p| p.address.clone()).collect();
        let mut tried: Vec<PeerAddress> = Vec::new();
        let mut last = None;
        while let Some(address) = pending.pop_front() {
            if tried.contains(&address) {
                continue;
            }
            tried.push(address.clone());
            let url = self.url(&address, path);
            let resp = self
                .http
                .post(&url)
                .timeout(timeout)
                .json(body)
                .send()
                .await
                .with_context(|| format!("POST {}", url))?;
            let reply: ClientReply = decode(&url, resp).await?;
            if !reply.not_leader {
                return Ok(reply);
            }
            debug!(
                "{} is not the leader of {} (hint: {:?})",
                address, self.group.id, reply.leader_hint
            );
            if let Some(hint) = &reply.leader_hint {
                pending.push_front(hint.clone());
            }
            last = Some(reply);
        }
        last.ok_or_else(|| anyhow!("group {} has no peers to send {} to", self.group.id, path))
    }
}

/// Decode a JSON body.  Error statuses are accepted when the body still parses.
async fn decode<T: DeserializeOwned>(url: &str, resp: reqwest::Response) -> anyhow::Result<T> {
    let status = resp.status();
    let bytes = resp
        .bytes()
        .await
        .with_context(|| format!("reading response of {}", url))?;
    match serde_json::from_slice::<T>(&bytes) {
        Ok(value) => Ok(value),
        Err(_) if !status.is_success() => Err(anyhow!("{} returned HTTP {}", url, status)),
        Err(e) => Err(anyhow!("malformed response from {}: {}", url, e)),
    }
}

impl ClusterClient for HttpClusterClient {
    fn list_groups(
        &self,
        peer: &Peer,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<GroupId>>> + Send + '_>> {
        let address = peer.address.clone();
        Box::pin(async move {
            let resp: GroupListResponse = self.get_json(&address, "/groups").await?;
            Ok(resp.group_ids)
        })
    }

    fn group_info(
        &self,
        peer: &Peer,
        group_id: GroupId,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<GroupInfoReply>> + Send + '_>> {
        let address = peer.address.clone();
        Box::pin(async move {
            self.get_json(&address, &format!("/groups/{}", group_id))
                .await
        })
    }

    fn set_configuration(
        &self,
        peers: &[Peer],
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ClientReply>> + Send + '_>> {
        let peers = peers.to_vec();
        Box::pin(async move {
            let path = format!("/groups/{}/configuration", self.group.id);
            let body = ConfigurationRequest { peers: &peers };
            self.submit(&path, &body, self.request_timeout).await
        })
    }

    fn transfer_leadership(
        &self,
        target: &PeerId,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ClientReply>> + Send + '_>> {
        let target = target.clone();
        Box::pin(async move {
            let path = format!("/groups/{}/leadership", self.group.id);
            let body = TransferRequest {
                target: &target,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            };
            let request_timeout = self.request_timeout.max(timeout);
            self.submit(&path, &body, request_timeout).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    async fn serve(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn peer_at(addr: SocketAddr) -> Peer {
        Peer::from_address(PeerAddress::new(addr.ip().to_string(), addr.port()))
    }

    fn client_for(peers: Vec<Peer>) -> Box<dyn ClusterClient> {
        let group = Group::new(GroupId::DEFAULT, peers);
        HttpConnector::new("http", Duration::from_secs(5))
            .connect(&group)
            .unwrap()
    }

    #[test]
    fn test_connector_reads_config() {
        let mut conf = Configuration::new();
        conf.set(&RPC_SCHEME, "https").unwrap();
        conf.set(&RPC_REQUEST_TIMEOUT_MS, 250).unwrap();
        let connector = HttpConnector::from_config(&conf).unwrap();
        assert_eq!(connector.scheme, "https");
        assert_eq!(connector.request_timeout, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_list_groups_and_group_info() {
        let gid = GroupId::from_uuid(uuid::Uuid::from_u128(42));
        let router = Router::new()
            .route(
                "/v1/groups",
                get(move || async move { Json(serde_json::json!({ "group_ids": [gid] })) }),
            )
            .route(
                "/v1/groups/:gid",
                get(|Path(gid): Path<String>| async move {
                    let gid: GroupId = gid.parse().unwrap();
                    Json(GroupInfoReply::failure(gid, "GroupMismatchException"))
                }),
            );
        let addr = serve(router).await;
        let peer = peer_at(addr);
        let client = client_for(vec![peer.clone()]);

        assert_eq!(client.list_groups(&peer).await.unwrap(), vec![gid]);
        let info = client.group_info(&peer, gid).await.unwrap();
        assert!(!info.reply.success);
        assert_eq!(info.group.id, gid);
    }

    #[tokio::test]
    async fn test_mutation_follows_leader_hint() {
        let seen: Arc<Mutex<Option<serde_json::Value>>> = Arc::new(Mutex::new(None));
        let leader_seen = seen.clone();
        let leader = serve(Router::new().route(
            "/v1/groups/:gid/configuration",
            post(move |Json(body): Json<serde_json::Value>| {
                let seen = leader_seen.clone();
                async move {
                    *seen.lock().unwrap() = Some(body);
                    Json(ClientReply::ok())
                }
            }),
        ))
        .await;
        let hint = peer_at(leader).address;
        let follower = serve(Router::new().route(
            "/v1/groups/:gid/configuration",
            post(move || {
                let hint = hint.clone();
                async move { Json(ClientReply::not_leader(Some(hint))) }
            }),
        ))
        .await;

        let peers = vec![peer_at(follower), peer_at(leader)];
        let client = client_for(peers.clone());
        let reply = client.set_configuration(&peers).await.unwrap();
        assert!(reply.success);

        let body = seen.lock().unwrap().clone().unwrap();
        assert_eq!(body["peers"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_error_status_with_reply_body_is_a_reply() {
        let addr = serve(Router::new().route(
            "/v1/groups/:gid/leadership",
            post(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ClientReply::failure("TransferLeadershipException: timed out")),
                )
            }),
        ))
        .await;
        let client = client_for(vec![peer_at(addr)]);
        let reply = client
            .transfer_leadership(&PeerId::new("h1", 1), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!reply.success);
        assert_eq!(reply.error_message(), "TransferLeadershipException: timed out");
    }

    #[tokio::test]
    async fn test_error_status_without_body_is_an_error() {
        let addr = serve(Router::new().route(
            "/v1/groups",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        ))
        .await;
        let peer = peer_at(addr);
        let client = client_for(vec![peer.clone()]);
        let err = client.list_groups(&peer).await.unwrap_err();
        assert!(err.to_string().contains("500"), "{err}");
    }

    #[tokio::test]
    async fn test_unreachable_peer_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let peer = peer_at(addr);
        let client = client_for(vec![peer.clone()]);
        assert!(client.list_groups(&peer).await.is_err());
    }
}
