//! quorumsh: administrative shell for Raft consensus groups.
//!
//! Resolves a group from operator-supplied peers (or per-service
//! defaults in the site properties file) and submits membership,
//! priority and leadership changes to it through a pluggable cluster
//! RPC endpoint.

pub mod commands;
pub mod config;
pub mod errors;
pub mod logging;
pub mod peer;
pub mod resolver;
pub mod retry;
pub mod rpc;
pub mod shell;
