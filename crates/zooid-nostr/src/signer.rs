//! Event signing seam
//!
//! The harness never implements signing itself. Clients and auth policies hold a
//! `Signer` and ask it to turn unsigned builders into signed events.

use std::sync::Arc;

use async_trait::async_trait;
use nostr_sdk::{Event, EventBuilder, Keys, Kind, PublicKey, Tag};

use crate::error::SignerError;

/// NIP-42 client authentication event kind
pub const AUTH_EVENT_KIND: u16 = 22242;

#[async_trait]
pub trait Signer: Send + Sync {
    fn public_key(&self) -> PublicKey;

    async fn sign(&self, builder: EventBuilder) -> Result<Event, SignerError>;
}

#[async_trait]
impl Signer for Keys {
    fn public_key(&self) -> PublicKey {
        Keys::public_key(self)
    }

    async fn sign(&self, builder: EventBuilder) -> Result<Event, SignerError> {
        builder
            .to_event(self)
            .map_err(|e| SignerError::SigningFailed(e.to_string()))
    }
}

pub type SharedSigner = Arc<dyn Signer>;

/// Unsigned NIP-42 response to a relay challenge
pub fn auth_event_builder(relay_url: &str, challenge: &str) -> Result<EventBuilder, SignerError> {
    let tags = [
        Tag::parse(&["relay", relay_url]),
        Tag::parse(&["challenge", challenge]),
    ]
    .into_iter()
    .collect::<Result<Vec<_>, _>>()
    .map_err(|e| SignerError::SigningFailed(e.to_string()))?;

    Ok(EventBuilder::new(Kind::from(AUTH_EVENT_KIND), "", tags))
}
