//! Peer and group identity types.
//!
//! A peer is identified by a [`PeerId`] derived from its network
//! address (`host_port`).  Priority is a property of a configuration,
//! not of identity: two [`Peer`] values with the same id but different
//! priorities describe the same member at different epochs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AdminError;

// -- Addresses ---------------------------------------------------------------

/// A `host:port` pair.  Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddress {
    host: String,
    port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for PeerAddress {
    type Err = AdminError;

    /// Split at the last colon so bracketed IPv6 hosts keep their colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = |reason| AdminError::InvalidAddress {
            address: trimmed.to_string(),
            reason,
        };
        let (host, port) = trimmed
            .rsplit_once(':')
            .ok_or_else(|| invalid("expected HOST:PORT"))?;
        if host.is_empty() {
            return Err(invalid("host is empty"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| invalid("port is not a number between 0 and 65535"))?;
        Ok(PeerAddress::new(host, port))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = AdminError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeerAddress> for String {
    fn from(addr: PeerAddress) -> Self {
        addr.to_string()
    }
}

/// Parse a comma separated `host:port` list.  Blank entries are skipped.
pub fn parse_peer_list(list: &str) -> Result<Vec<PeerAddress>, AdminError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

// -- Peers -------------------------------------------------------------------

/// Stable identity of a cluster member, `host_port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Derive the id of the peer listening at `host:port`.
    pub fn new(host: &str, port: u16) -> Self {
        PeerId(format!("{}_{}", host, port))
    }

    pub fn from_address(address: &PeerAddress) -> Self {
        Self::new(address.host(), address.port())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        PeerId(id)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One member of a group at a given configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: PeerId,
    pub address: PeerAddress,
    #[serde(default)]
    pub priority: u32,
}

impl Peer {
    /// A peer with the id derived from `address` and priority 0.
    pub fn from_address(address: PeerAddress) -> Self {
        Self {
            id: PeerId::from_address(&address),
            address,
            priority: 0,
        }
    }

    /// Copy of this peer with a different priority.
    pub fn with_priority(&self, priority: u32) -> Self {
        Self {
            priority,
            ..self.clone()
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|priority={}", self.id, self.address, self.priority)
    }
}

// -- Groups ------------------------------------------------------------------

/// Opaque 128-bit group identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(Uuid);

impl GroupId {
    /// The well-known bootstrap group id (`1-1-1-1-1` in its short form).
    pub const DEFAULT: GroupId = GroupId(Uuid::from_u128(0x00000001_0001_0001_0001_000000000001));

    pub const fn from_uuid(uuid: Uuid) -> Self {
        GroupId(uuid)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}

impl FromStr for GroupId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(GroupId)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A replica set: a group id plus its members, unique by [`PeerId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "GroupRepr", into = "GroupRepr")]
pub struct Group {
    pub id: GroupId,
    peers: Vec<Peer>,
}

/// Wire form of [`Group`]; decoding goes through [`Group::new`].
#[derive(Serialize, Deserialize)]
struct GroupRepr {
    id: GroupId,
    #[serde(default)]
    peers: Vec<Peer>,
}

impl From<GroupRepr> for Group {
    fn from(repr: GroupRepr) -> Self {
        Group::new(repr.id, repr.peers)
    }
}

impl From<Group> for GroupRepr {
    fn from(group: Group) -> Self {
        GroupRepr {
            id: group.id,
            peers: group.peers,
        }
    }
}

impl Group {
    /// Build a group; a repeated peer id keeps its first occurrence.
    pub fn new(id: GroupId, peers: impl IntoIterator<Item = Peer>) -> Self {
        let mut unique: Vec<Peer> = Vec::new();
        for peer in peers {
            if !unique.iter().any(|p| p.id == peer.id) {
                unique.push(peer);
            }
        }
        Self { id, peers: unique }
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn peer(&self, id: &PeerId) -> Option<&Peer> {
        self.peers.iter().find(|p| &p.id == id)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.peer(id).is_some()
    }

    /// Member listening at `address`, matched by address or derived id.
    pub fn peer_at(&self, address: &PeerAddress) -> Option<&Peer> {
        let id = PeerId::from_address(address);
        self.peers
            .iter()
            .find(|p| &p.address == address || p.id == id)
    }
}
