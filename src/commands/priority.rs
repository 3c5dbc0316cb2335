use clap::Args;
use tracing::debug;

use super::{Context, GroupOptions};
use crate::errors::AdminError;
use crate::peer::{Peer, PeerAddress};

/// `setPriority`: overwrite the priority of selected members.
///
/// Requested addresses that match no member are ignored.
#[derive(Args, Debug, Clone)]
pub struct SetPriorityCommand {
    /// `HOST:PORT,PRIORITY` pairs, `;` separated or repeated
    #[arg(long = "addressPriority", value_name = "HOST:PORT,PRIORITY", num_args = 0..=1)]
    pub address_priority: Vec<String>,

    #[command(flatten)]
    pub group: GroupOptions,
}

impl SetPriorityCommand {
    pub const NAME: &'static str = "setPriority";
    pub const DESCRIPTION: &'static str = "Set priorities of peers of a raft group";

    pub fn usage() -> String {
        format!(
            "{} -addressPriority <PEER_HOST:PEER_PORT,PRIORITY[;PEER_HOST:PEER_PORT,PRIORITY]> {}",
            Self::NAME,
            GroupOptions::USAGE
        )
    }

    pub fn validate(&self) -> Result<(), AdminError> {
        self.group.validate()
    }

    pub async fn run(&self, ctx: &mut Context<'_>) -> Result<i32, AdminError> {
        let requested = parse_pairs(&self.address_priority)?;
        let resolved = ctx.resolve(&self.group).await?;

        let peers: Vec<Peer> = resolved
            .group
            .peers()
            .iter()
            .map(|p| {
                // Last occurrence of an address wins.
                match requested.iter().rev().find(|(a, _)| *a == p.address) {
                    Some((_, priority)) => p.with_priority(*priority),
                    None => p.clone(),
                }
            })
            .collect();
        for (address, _) in &requested {
            if !resolved.group.peers().iter().any(|p| &p.address == address) {
                debug!("{} is not a member of {}, ignoring", address, resolved.group.id);
            }
        }
        ctx.apply_configuration(&resolved, &peers, "failed to set peer priorities")
            .await
    }
}

/// Parse `HOST:PORT,PRIORITY` pairs.
fn parse_pairs(values: &[String]) -> Result<Vec<(PeerAddress, u32)>, AdminError> {
    let mut pairs = Vec::new();
    for value in values {
        for pair in value.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (address, priority) = pair.rsplit_once(',').ok_or_else(|| {
                AdminError::invalid_argument(format!(
                    "invalid address priority \"{}\", expected HOST:PORT,PRIORITY",
                    pair
                ))
            })?;
            let priority = priority.trim().parse::<u32>().map_err(|_| {
                AdminError::invalid_argument(format!(
                    "invalid priority \"{}\" for {}",
                    priority.trim(),
                    address.trim()
                ))
            })?;
            pairs.push((address.parse::<PeerAddress>()?, priority));
        }
    }
    if pairs.is_empty() {
        return Err(AdminError::MissingInput {
            option: "addressPriority",
        });
    }
    Ok(pairs)
}
