//! Run configuration
//!
//! The Config Resolver turns an identity store plus the operator's selection into one
//! immutable `HarnessConfig` that is passed explicitly into every scenario.

use std::fmt;
use std::time::Duration;

use nostr_sdk::{Keys, SecretKey};
use serde_json::{Map, Value};
use url::Url;

use crate::error::ConfigError;
use crate::identity::{derive_public_key, Identity, IdentityStore};

// ----------------------------------------------------------------------------
// Actor Configuration
// ----------------------------------------------------------------------------

/// Everything one actor needs to talk to the relay
#[derive(Clone, PartialEq)]
pub struct ActorConfig {
    pub relay_url: String,
    pub identity_name: String,
    pub secret_key: String,
    pub pubkey: String,
    pub metadata: Map<String, Value>,
}

impl fmt::Debug for ActorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorConfig")
            .field("relay_url", &self.relay_url)
            .field("identity_name", &self.identity_name)
            .field("secret_key", &"<redacted>")
            .field("pubkey", &self.pubkey)
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl ActorConfig {
    pub fn from_identity(relay_url: impl Into<String>, identity: &Identity) -> Self {
        Self {
            relay_url: relay_url.into(),
            identity_name: identity.name.clone(),
            secret_key: identity.secret_key.clone(),
            pubkey: identity.public_key.clone(),
            metadata: identity.metadata.clone(),
        }
    }

    /// A throwaway actor with a freshly generated key that the relay has never seen
    pub fn ephemeral(
        relay_url: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        let secret_key = hex::encode(rand::random::<[u8; 32]>());
        let pubkey = derive_public_key(&secret_key).map_err(|e| ConfigError::InvalidKey {
            identity: name.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            relay_url: relay_url.into(),
            identity_name: name,
            secret_key,
            pubkey,
            metadata: Map::new(),
        })
    }

    /// Signing keys for this actor
    pub fn keys(&self) -> Result<Keys, ConfigError> {
        let secret_key =
            SecretKey::from_hex(&self.secret_key).map_err(|e| ConfigError::InvalidKey {
                identity: self.identity_name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Keys::new(secret_key))
    }

    /// Metadata as the JSON text published in a kind 0 event
    pub fn metadata_json(&self) -> String {
        Value::Object(self.metadata.clone()).to_string()
    }
}

// ----------------------------------------------------------------------------
// Timeouts
// ----------------------------------------------------------------------------

/// Deadlines and intervals used across a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Longest a subscription stays open waiting for end-of-stored-events
    pub fetch: Duration,
    /// Longest a publish waits for the relay's acknowledgement
    pub publish: Duration,
    pub connect: Duration,
    /// Default deadline for convergence polls
    pub convergence: Duration,
    pub poll_interval: Duration,
    pub claim_attempts: u32,
    pub claim_backoff: Duration,
    /// Grace period after a probe for the handshake to finish
    pub auth_settle: Duration,
    /// Deadline for low-level handshake observations
    pub observer: Duration,
    pub scenario: Duration,
    pub relay_info: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            fetch: Duration::from_millis(8000),
            publish: Duration::from_millis(10000),
            connect: Duration::from_millis(10000),
            convergence: Duration::from_millis(3000),
            poll_interval: Duration::from_millis(150),
            claim_attempts: 3,
            claim_backoff: Duration::from_millis(150),
            auth_settle: Duration::from_millis(150),
            observer: Duration::from_millis(4000),
            scenario: Duration::from_millis(20000),
            relay_info: Duration::from_millis(8000),
        }
    }
}

// ----------------------------------------------------------------------------
// Harness Configuration
// ----------------------------------------------------------------------------

/// Operator selection fed to the resolver
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub relay_url: Option<String>,
    pub identity: Option<String>,
    pub identity2: Option<String>,
}

/// Fully resolved configuration for one run
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub relay_url: String,
    pub admin: ActorConfig,
    pub member: Option<ActorConfig>,
    pub timeouts: Timeouts,
}

impl HarnessConfig {
    /// Resolve the admin actor, the optional member actor and the relay address
    pub fn resolve(store: &IdentityStore, request: &ResolveRequest) -> Result<Self, ConfigError> {
        let relay_url = match request.relay_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => validate_relay_url(url)?,
            _ => return Err(ConfigError::MissingRelay),
        };

        let admin = store.resolve(request.identity.as_deref())?;
        let member = request
            .identity2
            .as_deref()
            .map(|name| store.resolve(Some(name)))
            .transpose()?;

        Ok(Self {
            admin: ActorConfig::from_identity(relay_url.clone(), admin),
            member: member.map(|identity| ActorConfig::from_identity(relay_url.clone(), identity)),
            relay_url,
            timeouts: Timeouts::default(),
        })
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// Check a relay address is an absolute websocket URL
pub fn validate_relay_url(raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidRelayUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "ws" | "wss" => Ok(raw.to_string()),
        other => Err(ConfigError::InvalidRelayUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {other}, expected ws or wss"),
        }),
    }
}
