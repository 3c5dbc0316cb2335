//! Error types for the admin shell.
//!
//! Two closed enums: [`ConfigError`] for property resolution and site
//! file loading, and [`AdminError`] for everything a shell command can
//! fail with.  [`AdminError::exit_code`] maps each variant onto the
//! process exit codes scripts branch on.

use std::fmt::Display;

use thiserror::Error;

use crate::peer::GroupId;

/// Exit code for a successful command.
pub const EXIT_OK: i32 = 0;

/// Exit code for bad arguments, unknown commands, runtime and cluster errors.
pub const EXIT_ERROR: i32 = -1;

/// Exit code for a required multi-valued option given no values.
pub const EXIT_MISSING_INPUT: i32 = -2;

/// Render a slice as `[a, b, c]`.
pub(crate) fn join<T: Display>(items: &[T]) -> String {
    let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
    format!("[{}]", parts.join(", "))
}

/// Property lookup and substitution failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No layer supplies a value for the key.
    #[error("undefined configuration key \"{key}\"")]
    UndefinedKey { key: String },

    /// A `${key}` reference points back into the active resolution chain.
    #[error("circular dependency while resolving \"{key}\" (via {})", join(.chain))]
    CircularDependency { key: String, chain: Vec<String> },

    /// A `${key}` reference names neither a declared nor a known key.
    #[error("invalid configuration key \"{key}\" referenced in a property value")]
    InvalidKey { key: String },

    /// The resolved value could not be parsed as the requested type.
    #[error("value \"{value}\" of key \"{key}\" is not a valid {expected}")]
    TypeMismatch {
        key: String,
        value: String,
        expected: &'static str,
    },

    /// Empty values are rejected; `unset` removes a key instead.
    #[error("the key \"{key}\" cannot have an empty string as a value, unset it instead")]
    EmptyValue { key: String },

    /// The site file exists but could not be read.
    #[error("failed to read site file {path}: {source}")]
    SiteIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A YAML site file is not a flat mapping of scalars.
    #[error("failed to parse site file {path}: {source}")]
    SiteYaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A properties site file contains an unparseable line.
    #[error("malformed line {line} in site file {path}")]
    SiteSyntax { path: String, line: usize },
}

/// Every failure a shell command can surface to the operator.
#[derive(Debug, Error)]
pub enum AdminError {
    /// A peer address is not of the form `host:port`.
    #[error("invalid peer address \"{address}\": {reason}")]
    InvalidAddress {
        address: String,
        reason: &'static str,
    },

    /// Several groups are visible at the given peers and none was chosen.
    #[error(
        "there are more than one group, you should specify one with -groupid: {}",
        join(.group_ids)
    )]
    AmbiguousGroup { group_ids: Vec<GroupId> },

    /// Every candidate peer failed or returned nothing.
    #[error("no reachable peer answered {operation} (tried {})", join(.peers))]
    NoReachablePeer {
        operation: &'static str,
        peers: Vec<String>,
    },

    /// The requested peer is not a confirmed member of the group.
    #[error("<{address}> is not part of the quorum {}", join(.quorum))]
    PeerNotInQuorum {
        address: String,
        quorum: Vec<String>,
    },

    /// The cluster answered the request with a failure reply.
    #[error("{context}")]
    ClusterRejected { context: String, message: String },

    /// A required multi-valued option was given without any value.
    #[error("option -{option} requires at least one value")]
    MissingInput { option: &'static str },

    /// Arguments failed validation.
    #[error("{message}")]
    InvalidArgument { message: String },

    /// Property resolution failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Writing to the operator stream failed.
    #[error("failed to write command output: {0}")]
    Output(#[from] std::io::Error),

    /// Anything else, typically an RPC transport error.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AdminError {
    /// Shorthand for [`AdminError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        AdminError::InvalidArgument {
            message: message.into(),
        }
    }

    /// Stable name of the error kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AdminError::InvalidAddress { .. } => "InvalidAddress",
            AdminError::AmbiguousGroup { .. } => "AmbiguousGroup",
            AdminError::NoReachablePeer { .. } => "NoReachablePeer",
            AdminError::PeerNotInQuorum { .. } => "PeerNotInQuorum",
            AdminError::ClusterRejected { .. } => "ClusterRejected",
            AdminError::MissingInput { .. } => "MissingInput",
            AdminError::InvalidArgument { .. } => "InvalidArgument",
            AdminError::Config(_) => "Config",
            AdminError::Output(_) => "Output",
            AdminError::Internal(_) => "Internal",
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            AdminError::MissingInput { .. } => EXIT_MISSING_INPUT,
            _ => EXIT_ERROR,
        }
    }
}
