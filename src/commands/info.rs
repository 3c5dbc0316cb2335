use clap::Args;

use super::{process_reply, Context, GroupOptions};
use crate::errors::{AdminError, EXIT_OK};

/// `info`: group id, leader and commit indices.
#[derive(Args, Debug, Clone)]
pub struct InfoCommand {
    #[command(flatten)]
    pub group: GroupOptions,
}

impl InfoCommand {
    pub const NAME: &'static str = "info";
    pub const DESCRIPTION: &'static str = "Display the information of a specific raft group";

    pub fn usage() -> String {
        format!("{} {}", Self::NAME, GroupOptions::USAGE)
    }

    pub fn validate(&self) -> Result<(), AdminError> {
        self.group.validate()
    }

    pub async fn run(&self, ctx: &mut Context<'_>) -> Result<i32, AdminError> {
        let resolved = ctx.resolve(&self.group).await?;
        writeln!(ctx.out, "group id: {}", resolved.group.id)?;

        let client = ctx.connect(&resolved)?;
        let first = resolved
            .group
            .peers()
            .first()
            .ok_or_else(|| AdminError::NoReachablePeer {
                operation: "group info",
                peers: Vec::new(),
            })?;
        let reply = client.group_info(first, resolved.group.id).await?;
        process_reply(&reply.reply, "failed to get info", &mut *ctx.out)?;

        match reply.role.as_ref().and_then(|r| r.leader()) {
            Some(leader) => writeln!(ctx.out, "leader info: {}({})", leader.id, leader.address)?,
            None => writeln!(ctx.out, "leader info: unknown")?,
        }
        writeln!(ctx.out)?;
        for commit in &reply.commit_infos {
            writeln!(
                ctx.out,
                "  {}({}): commit index {}",
                commit.server.id, commit.server.address, commit.commit_index
            )?;
        }
        Ok(EXIT_OK)
    }
}
