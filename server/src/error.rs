//! Error types for the relaychat server.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the server.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream error: {0}")]
    Stream(#[from] relaychat_protocol::StreamError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Authentication failed for {0:?}")]
    AuthenticationFailed(String),

    #[error("Outbound queue closed")]
    OutboundClosed,

    #[error("Client stopped reading, outbound queue full")]
    SlowConsumer,
}

/// Startup configuration errors. Always fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failures reported by the persistence collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("user not found: {0}")]
    UnknownUser(String),

    #[error("no credential stored for user id {0}")]
    MissingCredential(u32),

    #[error("channel not found: {0}")]
    UnknownChannel(u32),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
