//! Command line front end.
//!
//! Parses arguments, runs one command and turns every outcome into an
//! exit code plus operator-visible text.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info};

use crate::commands::{Command, Context};
use crate::config::Configuration;
use crate::errors::{EXIT_ERROR, EXIT_OK};
use crate::logging::LogFormat;
use crate::rpc::ClusterConnector;

#[derive(Parser, Debug)]
#[command(
    name = "quorumsh",
    version,
    about = "Administrative shell for Raft consensus groups",
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Site properties file to load instead of searching the config directories
    #[arg(long, global = true, value_name = "PATH")]
    pub conf: Option<PathBuf>,

    /// Log output format
    #[arg(long = "log-format", global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Rewrite legacy single-dash long options (`-peers`) to `--peers`.
///
/// Short flags (`-h`), negative numbers and `--`-prefixed arguments pass
/// through untouched.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| match arg.to_str() {
            Some(s) if is_legacy_long_option(s) => OsString::from(format!("-{}", s)),
            _ => arg,
        })
        .collect()
}

fn is_legacy_long_option(arg: &str) -> bool {
    let Some(rest) = arg.strip_prefix('-') else {
        return false;
    };
    let name = rest.split('=').next().unwrap_or(rest);
    name.len() > 1
        && !rest.starts_with('-')
        && name.starts_with(|c: char| c.is_ascii_alphabetic())
}

/// Parse the normalized arguments.
pub fn parse<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    Cli::try_parse_from(normalize_args(args))
}

/// Print the usage of every command.
pub fn print_usage(out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(out, "Usage: quorumsh [--conf <PATH>] [--log-format <text|json>] <command> [options]")?;
    writeln!(out)?;
    writeln!(out, "Available commands:")?;
    for usage in Command::usages() {
        writeln!(out, "  {}", usage)?;
    }
    Ok(())
}

/// Runs commands against one configuration and cluster connector.
pub struct Shell<'a> {
    conf: &'a Configuration,
    connector: &'a dyn ClusterConnector,
}

impl<'a> Shell<'a> {
    pub fn new(conf: &'a Configuration, connector: &'a dyn ClusterConnector) -> Self {
        Self { conf, connector }
    }

    /// Validate and run `command`, reporting failures to `out`.
    pub async fn execute(&self, command: &Command, out: &mut dyn Write) -> i32 {
        if let Err(e) = command.validate() {
            // Output errors here leave nothing else to report to.
            let _ = writeln!(out, "{}", e);
            let _ = writeln!(out, "Usage: {}", command.usage());
            let _ = writeln!(out, "{}", command.description());
            return e.exit_code();
        }

        info!("Running {}", command.name());
        let mut ctx = Context::new(self.conf, self.connector, &mut *out);
        match command.run(&mut ctx).await {
            Ok(code) => code,
            Err(e) => {
                error!(kind = e.kind(), "{} failed: {}", command.name(), e);
                let _ = writeln!(out, "{}", e);
                e.exit_code()
            }
        }
    }

    /// Parse `args` and run the command they name.
    pub async fn run<I, T>(&self, args: I, out: &mut dyn Write) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let cli = match parse(args) {
            Ok(cli) => cli,
            Err(e) => return report_parse_error(&e, out),
        };
        match &cli.command {
            Some(command) => self.execute(command, out).await,
            None => {
                let _ = print_usage(out);
                EXIT_ERROR
            }
        }
    }
}

/// `--help` and `--version` are successes; anything else is a usage error.
pub fn report_parse_error(err: &clap::Error, out: &mut dyn Write) -> i32 {
    let _ = write!(out, "{}", err.render());
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_OK,
        ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand | ErrorKind::MissingSubcommand => {
            let _ = writeln!(out);
            let _ = print_usage(out);
            EXIT_ERROR
        }
        _ => EXIT_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{group_id, peer, three_node_cluster};
    use crate::config::keys::ELECT_SETTLE_DELAY_MS;
    use crate::errors::EXIT_MISSING_INPUT;
    use crate::rpc::memory::MemoryCluster;

    const PEERS: &str = "h1:9870,h2:9870,h3:9870";

    async fn shell(cluster: &MemoryCluster, args: &[&str]) -> (i32, String) {
        let mut conf = Configuration::new();
        conf.set(&ELECT_SETTLE_DELAY_MS, 0).unwrap();
        let mut out = Vec::new();
        let mut argv = vec!["quorumsh"];
        argv.extend_from_slice(args);
        let code = Shell::new(&conf, cluster).run(argv, &mut out).await;
        (code, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_normalize_legacy_options() {
        let args = normalize_args(["quorumsh", "info", "-peers", "h1:1", "-h", "--conf", "x", "-5"]);
        let args: Vec<&str> = args.iter().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(
            args,
            vec!["quorumsh", "info", "--peers", "h1:1", "-h", "--conf", "x", "-5"]
        );
    }

    #[test]
    fn test_parse_command_options() {
        let cli = parse(["quorumsh", "quorumAdd", "-addPeer", "h4:9870", "-addPeer", "h5:9870", "-peers", PEERS])
            .unwrap();
        match cli.command {
            Some(Command::QuorumAdd(cmd)) => {
                assert_eq!(cmd.add_peer, vec!["h4:9870", "h5:9870"]);
                assert_eq!(cmd.group.peers.as_deref(), Some(PEERS));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_info_end_to_end() {
        let cluster = three_node_cluster();
        let (code, out) = shell(&cluster, &["info", "-peers", PEERS]).await;
        assert_eq!(code, EXIT_OK);
        assert!(out.starts_with(&format!("group id: {}\n", group_id())));
        assert!(out.contains("leader info: h1_9870(h1:9870)"));
    }

    #[tokio::test]
    async fn test_quorum_remove_end_to_end() {
        let cluster = three_node_cluster();
        let (code, _) = shell(&cluster, &["quorumRemove", "-peers", PEERS, "-removePeer", "h2:9870"]).await;
        assert_eq!(code, EXIT_OK);
        let (_, submitted) = &cluster.submitted()[0];
        assert_eq!(submitted, &vec![peer("h1"), peer("h3")]);
    }

    #[tokio::test]
    async fn test_elect_end_to_end() {
        let cluster = three_node_cluster();
        let (code, out) = shell(&cluster, &["elect", "-address", "h3:9870", "-peers", PEERS]).await;
        assert_eq!(code, EXIT_OK, "{out}");
        assert_eq!(cluster.leader(group_id()), Some(peer("h3").id));
    }

    #[tokio::test]
    async fn test_empty_add_peer_exits_with_missing_input() {
        let cluster = three_node_cluster();
        let (code, out) = shell(&cluster, &["quorumAdd", "-peers", PEERS, "-addPeer"]).await;
        assert_eq!(code, EXIT_MISSING_INPUT);
        assert!(out.contains("option -addPeer requires at least one value"));
        assert_eq!(cluster.connects(), 0);
    }

    #[tokio::test]
    async fn test_missing_peers_and_service_prints_usage() {
        let cluster = three_node_cluster();
        let (code, out) = shell(&cluster, &["info"]).await;
        assert_eq!(code, EXIT_ERROR);
        assert!(out.contains("should provide at least one of [serviceid] and [peers]"));
        assert!(out.contains("Usage: info"));
        assert!(out.contains("Display the information of a specific raft group"));
        assert_eq!(cluster.connects(), 0);
    }

    #[tokio::test]
    async fn test_elect_without_address_is_validation_error() {
        let cluster = three_node_cluster();
        let (code, out) = shell(&cluster, &["elect", "-peers", PEERS]).await;
        assert_eq!(code, EXIT_ERROR);
        assert!(out.contains("option -address is required"));
    }

    #[tokio::test]
    async fn test_unknown_command_and_no_command() {
        let cluster = MemoryCluster::new();
        let (code, _) = shell(&cluster, &["bogus"]).await;
        assert_eq!(code, EXIT_ERROR);

        let (code, out) = shell(&cluster, &[]).await;
        assert_eq!(code, EXIT_ERROR);
        assert!(out.contains("quorumAdd -addPeer"));
        assert!(out.contains("setPriority -addressPriority"));
    }

    #[tokio::test]
    async fn test_help_exits_ok() {
        let cluster = MemoryCluster::new();
        let (code, out) = shell(&cluster, &["--help"]).await;
        assert_eq!(code, EXIT_OK);
        assert!(out.contains("quorumsh"));
    }

    #[tokio::test]
    async fn test_cluster_rejection_exits_with_error() {
        let cluster = three_node_cluster();
        cluster.reject_configuration("SetConfigurationException: busy");
        let (code, out) = shell(&cluster, &["setPriority", "-peers", PEERS, "-addressPriority", "h1:9870,3"]).await;
        assert_eq!(code, EXIT_ERROR);
        assert!(out.contains("failed to set peer priorities. Error: SetConfigurationException: busy"));
        assert_eq!(cluster.open_clients(), 0);
    }

    #[tokio::test]
    async fn test_ambiguous_group_reported() {
        let cluster = MemoryCluster::new();
        let other = crate::peer::GroupId::from_uuid(uuid::Uuid::from_u128(77));
        cluster
            .add_group(crate::peer::Group::new(group_id(), vec![peer("h1"), peer("h2")]), None)
            .add_group(crate::peer::Group::new(other, vec![peer("h1"), peer("h3")]), None);
        let (code, out) = shell(&cluster, &["info", "-peers", PEERS]).await;
        assert_eq!(code, EXIT_ERROR);
        assert!(out.contains("there are more than one group"));
        assert!(out.contains(&other.to_string()));
    }
}
