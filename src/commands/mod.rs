//! Administrative commands.
//!
//! [`Command`] is the registry: one variant per command, each holding only
//! the options that command takes.  Every command resolves its group
//! first and works on the [`ResolvedGroup`] from then on.

pub mod elect;
pub mod info;
pub mod priority;
pub mod quorum;

use std::io::Write;

use clap::{Args, Subcommand};

use crate::config::Configuration;
use crate::errors::{join, AdminError, EXIT_OK};
use crate::peer::{Group, Peer, PeerAddress};
use crate::resolver::{GroupRequest, GroupResolver, ResolvedGroup};
use crate::rpc::{ClientReply, ClusterClient, ClusterConnector};

pub use elect::ElectCommand;
pub use info::InfoCommand;
pub use priority::SetPriorityCommand;
pub use quorum::{QuorumAddCommand, QuorumRemoveCommand};

/// Options selecting the target group, shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GroupOptions {
    /// Comma separated peer addresses
    #[arg(long = "peers", value_name = "P0_HOST:P0_PORT,P1_HOST:P1_PORT,...")]
    pub peers: Option<String>,

    /// Raft group id; discovered from the peers when omitted
    #[arg(long = "groupid", value_name = "RAFT_GROUP_ID")]
    pub group_id: Option<String>,

    /// Service whose peers and group id are read from the site file
    #[arg(long = "serviceid", value_name = "SERVICE_ID")]
    pub service_id: Option<String>,
}

impl GroupOptions {
    pub const USAGE: &'static str = "[-peers <P0_HOST:P0_PORT,P1_HOST:P1_PORT,P2_HOST:P2_PORT>] \
         [-groupid <RAFT_GROUP_ID>] [-serviceid <SERVICE_ID>]";

    pub fn validate(&self) -> Result<(), AdminError> {
        if self.peers.is_none() && self.service_id.is_none() {
            return Err(AdminError::invalid_argument(
                "should provide at least one of [serviceid] and [peers]",
            ));
        }
        Ok(())
    }

    pub fn request(&self) -> GroupRequest {
        GroupRequest {
            peers: self.peers.clone(),
            group_id: self.group_id.clone(),
            service_id: self.service_id.clone(),
        }
    }
}

/// What a running command has access to.
pub struct Context<'a> {
    pub conf: &'a Configuration,
    pub connector: &'a dyn ClusterConnector,
    /// Operator output stream.
    pub out: &'a mut dyn Write,
}

impl<'a> Context<'a> {
    pub fn new(
        conf: &'a Configuration,
        connector: &'a dyn ClusterConnector,
        out: &'a mut dyn Write,
    ) -> Self {
        Self {
            conf,
            connector,
            out,
        }
    }

    pub async fn resolve(&self, options: &GroupOptions) -> Result<ResolvedGroup, AdminError> {
        GroupResolver::new(self.conf, self.connector)
            .resolve(&options.request())
            .await
    }

    /// A client for the resolved group, reaching members and extra contacts.
    pub fn connect(&self, resolved: &ResolvedGroup) -> Result<Box<dyn ClusterClient>, AdminError> {
        let group = Group::new(resolved.group.id, resolved.contact_peers());
        Ok(self.connector.connect(&group)?)
    }

    /// Submit `peers` as the new configuration of the resolved group.
    pub async fn apply_configuration(
        &mut self,
        resolved: &ResolvedGroup,
        peers: &[Peer],
        context: &str,
    ) -> Result<i32, AdminError> {
        let client = self.connect(resolved)?;
        let reply = client.set_configuration(peers).await?;
        process_reply(&reply, context, &mut *self.out)?;
        writeln!(
            self.out,
            "Peers of group {} are now {}",
            resolved.group.id,
            join(peers)
        )?;
        Ok(EXIT_OK)
    }
}

/// Surface a failed reply to the operator and abort.
pub fn process_reply<W: Write + ?Sized>(
    reply: &ClientReply,
    context: &str,
    out: &mut W,
) -> Result<(), AdminError> {
    if reply.success {
        return Ok(());
    }
    let message = reply.error_message();
    writeln!(out, "{}. Error: {}", context, message)?;
    Err(AdminError::ClusterRejected {
        context: context.to_string(),
        message,
    })
}

/// Parse repeated and/or comma separated address values of `option`.
pub(crate) fn address_values(
    values: &[String],
    option: &'static str,
) -> Result<Vec<PeerAddress>, AdminError> {
    let mut addresses = Vec::new();
    for value in values {
        for part in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            addresses.push(part.parse::<PeerAddress>()?);
        }
    }
    if addresses.is_empty() {
        return Err(AdminError::MissingInput { option });
    }
    Ok(addresses)
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Display the information of a specific raft group
    #[command(name = "info")]
    Info(InfoCommand),
    /// Transfer the group leader to the specified server
    #[command(name = "elect")]
    Elect(ElectCommand),
    /// Add peers to a raft group
    #[command(name = "quorumAdd")]
    QuorumAdd(QuorumAddCommand),
    /// Remove peers from a raft group
    #[command(name = "quorumRemove")]
    QuorumRemove(QuorumRemoveCommand),
    /// Set priorities of peers of a raft group
    #[command(name = "setPriority")]
    SetPriority(SetPriorityCommand),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Info(_) => InfoCommand::NAME,
            Command::Elect(_) => ElectCommand::NAME,
            Command::QuorumAdd(_) => QuorumAddCommand::NAME,
            Command::QuorumRemove(_) => QuorumRemoveCommand::NAME,
            Command::SetPriority(_) => SetPriorityCommand::NAME,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Command::Info(_) => InfoCommand::DESCRIPTION,
            Command::Elect(_) => ElectCommand::DESCRIPTION,
            Command::QuorumAdd(_) => QuorumAddCommand::DESCRIPTION,
            Command::QuorumRemove(_) => QuorumRemoveCommand::DESCRIPTION,
            Command::SetPriority(_) => SetPriorityCommand::DESCRIPTION,
        }
    }

    pub fn usage(&self) -> String {
        match self {
            Command::Info(_) => InfoCommand::usage(),
            Command::Elect(_) => ElectCommand::usage(),
            Command::QuorumAdd(_) => QuorumAddCommand::usage(),
            Command::QuorumRemove(_) => QuorumRemoveCommand::usage(),
            Command::SetPriority(_) => SetPriorityCommand::usage(),
        }
    }

    /// Usage line of every registered command, in registry order.
    pub fn usages() -> Vec<String> {
        vec![
            InfoCommand::usage(),
            ElectCommand::usage(),
            QuorumAddCommand::usage(),
            QuorumRemoveCommand::usage(),
            SetPriorityCommand::usage(),
        ]
    }

    /// Argument checks that need no network access.
    pub fn validate(&self) -> Result<(), AdminError> {
        match self {
            Command::Info(c) => c.validate(),
            Command::Elect(c) => c.validate(),
            Command::QuorumAdd(c) => c.validate(),
            Command::QuorumRemove(c) => c.validate(),
            Command::SetPriority(c) => c.validate(),
        }
    }

    pub async fn run(&self, ctx: &mut Context<'_>) -> Result<i32, AdminError> {
        match self {
            Command::Info(c) => c.run(ctx).await,
            Command::Elect(c) => c.run(ctx).await,
            Command::QuorumAdd(c) => c.run(ctx).await,
            Command::QuorumRemove(c) => c.run(ctx).await,
            Command::SetPriority(c) => c.run(ctx).await,
        }
    }
}
