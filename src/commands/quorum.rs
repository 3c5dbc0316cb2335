//! `quorumAdd` and `quorumRemove`.
//!
//! Both compute a new member list from the resolved group and submit it
//! as a whole.  Neither checks that the result is a viable quorum; the
//! cluster rejects changes it cannot apply.

use clap::Args;
use tracing::debug;

use super::{address_values, Context, GroupOptions};
use crate::errors::AdminError;
use crate::peer::{Peer, PeerId};

#[derive(Args, Debug, Clone)]
pub struct QuorumAddCommand {
    /// Peers to add, comma separated or repeated
    #[arg(long = "addPeer", value_name = "HOST:PORT", num_args = 0..=1)]
    pub add_peer: Vec<String>,

    #[command(flatten)]
    pub group: GroupOptions,
}

impl QuorumAddCommand {
    pub const NAME: &'static str = "quorumAdd";
    pub const DESCRIPTION: &'static str = "Add peers to a raft group";

    pub fn usage() -> String {
        format!(
            "{} -addPeer <PEER0_HOST:PEER0_PORT[,PEER1_HOST:PEER1_PORT]> {}",
            Self::NAME,
            GroupOptions::USAGE
        )
    }

    pub fn validate(&self) -> Result<(), AdminError> {
        self.group.validate()
    }

    pub async fn run(&self, ctx: &mut Context<'_>) -> Result<i32, AdminError> {
        let addresses = address_values(&self.add_peer, "addPeer")?;
        let resolved = ctx.resolve(&self.group).await?;

        let mut peers = resolved.group.peers().to_vec();
        for address in addresses {
            let peer = Peer::from_address(address);
            if peers.iter().any(|p| p.id == peer.id) {
                debug!("{} is already a member of {}", peer.id, resolved.group.id);
                continue;
            }
            peers.push(peer);
        }
        ctx.apply_configuration(&resolved, &peers, "failed to add raft peer")
            .await
    }
}

#[derive(Args, Debug, Clone)]
pub struct QuorumRemoveCommand {
    /// Peers to remove, comma separated or repeated
    #[arg(long = "removePeer", value_name = "HOST:PORT", num_args = 0..=1)]
    pub remove_peer: Vec<String>,

    #[command(flatten)]
    pub group: GroupOptions,
}

impl QuorumRemoveCommand {
    pub const NAME: &'static str = "quorumRemove";
    pub const DESCRIPTION: &'static str = "Remove peers from a raft group";

    pub fn usage() -> String {
        format!(
            "{} -removePeer <PEER0_HOST:PEER0_PORT[,PEER1_HOST:PEER1_PORT]> {}",
            Self::NAME,
            GroupOptions::USAGE
        )
    }

    pub fn validate(&self) -> Result<(), AdminError> {
        self.group.validate()
    }

    pub async fn run(&self, ctx: &mut Context<'_>) -> Result<i32, AdminError> {
        let removed: Vec<PeerId> = address_values(&self.remove_peer, "removePeer")?
            .iter()
            .map(PeerId::from_address)
            .collect();
        let resolved = ctx.resolve(&self.group).await?;

        let peers: Vec<Peer> = resolved
            .group
            .peers()
            .iter()
            .filter(|p| !removed.contains(&p.id))
            .cloned()
            .collect();
        ctx.apply_configuration(&resolved, &peers, "failed to remove raft peer")
            .await
    }
}
