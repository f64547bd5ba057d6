//! Relay protocol plumbing for the Zooid conformance harness
//!
//! A `TestClient` per actor for ordinary publish/fetch traffic with automatic
//! authentication, and a raw `Connection` plus `AuthObserver` for scenarios that
//! drive the NIP-42 handshake by hand.

pub mod auth;
pub mod client;
pub mod connection;
pub mod error;
pub mod frame;
pub mod observer;
pub mod relay_info;
pub mod signer;

pub use auth::{AuthInput, AuthMode, AuthPolicy, AuthSession, AuthStatus};
pub use client::{PublishResult, PublishStatus, TestClient};
pub use connection::{Connection, ConnectionEvent, ConnectionStatus};
pub use error::{ClientError, FrameError, ObserveError, RelayInfoError, Result, SignerError};
pub use frame::{has_reason_prefix, reason, ClientFrame, RelayEvent, RelayFrame};
pub use observer::{AuthObserver, Correlation, Verdict};
pub use relay_info::{fetch_relay_info, relay_info_url, RelayInformation};
pub use signer::{auth_event_builder, SharedSigner, Signer, AUTH_EVENT_KIND};
