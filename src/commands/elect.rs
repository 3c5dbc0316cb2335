use clap::Args;
use tracing::{info, warn};

use super::{process_reply, Context, GroupOptions};
use crate::config::keys::{ELECT_SETTLE_DELAY_MS, ELECT_TRANSFER_TIMEOUT_MS};
use crate::errors::{join, AdminError, EXIT_ERROR, EXIT_OK};
use crate::peer::{Peer, PeerAddress};

/// Priority given to the transfer target.
const TARGET_PRIORITY: u32 = 2;
/// Priority given to every other member.
const OTHER_PRIORITY: u32 = 1;

/// `elect`: move leadership to a chosen member.
///
/// The target is first given the highest priority so the group keeps
/// preferring it, then, after a settle delay, asked to take over.
#[derive(Args, Debug, Clone)]
pub struct ElectCommand {
    /// Server to transfer leadership to
    #[arg(long = "address", value_name = "HOSTNAME:PORT")]
    pub address: Option<String>,

    #[command(flatten)]
    pub group: GroupOptions,
}

impl ElectCommand {
    pub const NAME: &'static str = "elect";
    pub const DESCRIPTION: &'static str = "Transfer the group leader to the specified server";

    pub fn usage() -> String {
        format!("{} -address <HOSTNAME:PORT> {}", Self::NAME, GroupOptions::USAGE)
    }

    pub fn validate(&self) -> Result<(), AdminError> {
        self.group.validate()?;
        self.target()?;
        Ok(())
    }

    fn target(&self) -> Result<PeerAddress, AdminError> {
        match &self.address {
            Some(address) => address.parse(),
            None => Err(AdminError::invalid_argument("option -address is required")),
        }
    }

    pub async fn run(&self, ctx: &mut Context<'_>) -> Result<i32, AdminError> {
        let target = self.target()?;
        let settle_delay = ctx.conf.get_duration_ms(&ELECT_SETTLE_DELAY_MS)?;
        let transfer_timeout = ctx.conf.get_duration_ms(&ELECT_TRANSFER_TIMEOUT_MS)?;

        let resolved = ctx.resolve(&self.group).await?;
        let member = resolved
            .group
            .peer_at(&target)
            .cloned()
            .ok_or_else(|| AdminError::PeerNotInQuorum {
                address: target.to_string(),
                quorum: resolved
                    .group
                    .peers()
                    .iter()
                    .map(|p| p.address.to_string())
                    .collect(),
            })?;

        let peers: Vec<Peer> = resolved
            .group
            .peers()
            .iter()
            .map(|p| {
                let priority = if p.id == member.id {
                    TARGET_PRIORITY
                } else {
                    OTHER_PRIORITY
                };
                p.with_priority(priority)
            })
            .collect();

        let client = ctx.connect(&resolved)?;
        writeln!(
            ctx.out,
            "Applying new peer state before transferring leadership: {}",
            join(&peers)
        )?;
        let reply = client.set_configuration(&peers).await?;
        process_reply(
            &reply,
            "failed to set priorities before initiating election",
            &mut *ctx.out,
        )?;

        writeln!(
            ctx.out,
            "Transferring leadership to server with address <{}> and with peer id <{}>",
            member.address, member.id
        )?;
        // Let the new priorities commit before asking for the transfer.
        tokio::time::sleep(settle_delay).await;

        let outcome = match client.transfer_leadership(&member.id, transfer_timeout).await {
            Ok(reply) => process_reply(&reply, "election failed", &mut *ctx.out),
            Err(e) => Err(AdminError::from(e)),
        };
        if let Err(e) = outcome {
            warn!("Leadership transfer to {} failed: {}", member.id, e);
            writeln!(ctx.out, "caught an error when executing transfer: {}", e)?;
            return Ok(EXIT_ERROR);
        }
        info!("Leadership transfer to {} initiated", member.id);
        writeln!(ctx.out, "Transferring leadership initiated")?;
        Ok(EXIT_OK)
    }
}
