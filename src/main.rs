//! quorumsh: administrative shell for Raft consensus groups.
//!
//! Exit codes: `0` success, `-1` any error, `-2` a required list option
//! was given no values.

use std::io::Write;

use anyhow::Context as _;
use quorumsh::config::Configuration;
use quorumsh::errors::EXIT_ERROR;
use quorumsh::logging::{self, LogSettings};
use quorumsh::rpc::http::HttpConnector;
use quorumsh::shell::{self, Cli, Shell};
use tracing::debug;

/// Load configuration, install logging and build the HTTP connector.
fn setup(cli: &Cli) -> anyhow::Result<(Configuration, HttpConnector)> {
    let conf = Configuration::load(cli.conf.as_deref()).context("loading site properties")?;
    let settings = LogSettings::from_config(&conf, cli.log_format)?;
    logging::init(&settings);
    if let Some(path) = conf.site_file() {
        debug!("Using site properties from {}", path.display());
    }
    let connector = HttpConnector::from_config(&conf)?;
    Ok((conf, connector))
}

async fn run() -> i32 {
    let mut out = std::io::stdout();
    let cli = match shell::parse(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) => return shell::report_parse_error(&e, &mut out),
    };
    let (conf, connector) = match setup(&cli) {
        Ok(parts) => parts,
        Err(e) => {
            let _ = writeln!(out, "{:#}", e);
            return EXIT_ERROR;
        }
    };
    let Some(command) = &cli.command else {
        let _ = shell::print_usage(&mut out);
        return EXIT_ERROR;
    };
    let rc = Shell::new(&conf, &connector).execute(command, &mut out).await;
    let _ = out.flush();
    rc
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let rc = run().await;
    std::process::exit(rc);
}
