//! Error types for relay protocol operations

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;
use zooid_core::ConfigError;

use crate::auth::AuthStatus;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Relay message could not be decoded into a frame the harness handles
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Invalid relay message: {0}")]
    Decode(String),

    #[error("Unsupported relay message: {0}")]
    Unsupported(String),
}

/// Signer could not produce a signature
#[derive(Error, Debug)]
pub enum SignerError {
    #[error("Failed to sign event: {0}")]
    SigningFailed(String),
}

/// Errors surfaced by the Test Client and the raw connection
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to connect to relay: {relay} - {source}")]
    ConnectFailed {
        relay: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("Connecting to {relay} timed out after {}ms", .after.as_millis())]
    ConnectTimeout { relay: String, after: Duration },

    #[error("Connection to relay closed")]
    ConnectionClosed,

    #[error("Client has been closed")]
    ClientClosed,

    #[error("Client fell behind the connection by {0} events")]
    Lagged(u64),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while waiting on the connection event stream
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObserveError {
    #[error("Timed out after {}ms waiting for {waiting_for}", .after.as_millis())]
    Timeout { waiting_for: String, after: Duration },

    #[error("Connection closed while waiting for {waiting_for}")]
    ConnectionClosed { waiting_for: String },

    #[error("Authentication ended in {actual} while waiting for {expected}")]
    AuthEnded {
        expected: AuthStatus,
        actual: AuthStatus,
    },

    #[error("Expected {waiting_for} to be rejected with \"{expected_prefix}\", got accepted={accepted} \"{reason}\"")]
    UnexpectedVerdict {
        waiting_for: String,
        expected_prefix: String,
        accepted: bool,
        reason: String,
    },

    #[error("Observer fell behind the connection by {0} events")]
    Lagged(u64),
}

/// Relay information document could not be fetched
#[derive(Error, Debug)]
pub enum RelayInfoError {
    #[error("Invalid relay URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("NIP-11 request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("NIP-11 response failed with {0}")]
    Status(u16),
}

pub type Result<T> = std::result::Result<T, ClientError>;
