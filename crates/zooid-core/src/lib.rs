//! Zooid conformance harness core
//!
//! Identity loading, run configuration and the timing primitives scenarios are built
//! from. Nothing in this crate touches the network.

pub mod config;
pub mod error;
pub mod identity;
pub mod poll;
pub mod retry;

pub use config::{validate_relay_url, ActorConfig, HarnessConfig, ResolveRequest, Timeouts};
pub use error::{
    ConfigError, ConvergenceTimeout, HarnessError, IdentityError, Result, SchemaIssue,
};
pub use identity::{derive_public_key, Identity, IdentityStore};
pub use poll::{poll_until, PollSettings};
pub use retry::{retry_with_backoff, Backoff, RetryPolicy};
