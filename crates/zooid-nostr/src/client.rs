//! Protocol Test Client
//!
//! One client per actor. It owns the actor's signer and a lazily opened connection
//! with an auth policy attached, and exposes publish, fetch and lookup-by-id.
//! Requests are correlated with responses by event id or subscription id, and every
//! wait is bounded: publishes resolve to `Timeout`, fetches return what they
//! collected.

use std::sync::Arc;

use nostr_sdk::{Event, EventBuilder, EventId, Filter, Keys, PublicKey};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};
use uuid::Uuid;
use zooid_core::{ActorConfig, Timeouts};

use crate::auth::{AuthMode, AuthPolicy, AuthStatus};
use crate::connection::{Connection, ConnectionEvent, ConnectionStatus};
use crate::error::{ClientError, Result};
use crate::frame::{has_reason_prefix, reason, ClientFrame, RelayEvent, RelayFrame};
use crate::signer::{SharedSigner, Signer};

// ----------------------------------------------------------------------------
// Publish Results
// ----------------------------------------------------------------------------

/// Outcome of publishing to the actor's relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PublishStatus {
    Success,
    Failure,
    Timeout,
}

/// Per-relay acknowledgement of a publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishResult {
    pub relay: String,
    pub status: PublishStatus,
    /// Relay's reason string; empty when none was given
    pub detail: String,
}

impl PublishResult {
    pub fn is_success(&self) -> bool {
        self.status == PublishStatus::Success
    }

    pub fn is_failure(&self) -> bool {
        self.status == PublishStatus::Failure
    }

    /// Whether this is a rejection whose reason starts with `prefix`
    pub fn is_rejected_with(&self, prefix: &str) -> bool {
        self.is_failure() && has_reason_prefix(&self.detail, prefix)
    }

    /// Case-insensitive substring match on the detail
    pub fn detail_mentions(&self, needle: &str) -> bool {
        self.detail
            .to_lowercase()
            .contains(&needle.to_lowercase())
    }
}

// ----------------------------------------------------------------------------
// Test Client
// ----------------------------------------------------------------------------

enum ConnectionSlot {
    Idle,
    Open(Arc<Connection>),
    Closed,
}

/// Per-actor relay client
pub struct TestClient {
    relay_url: String,
    actor_name: String,
    keys: Keys,
    policy: AuthPolicy,
    timeouts: Timeouts,
    slot: Mutex<ConnectionSlot>,
}

impl TestClient {
    /// Client that authenticates as soon as the relay challenges it
    pub fn new(actor: &ActorConfig, timeouts: Timeouts) -> Result<Self> {
        Self::with_mode(actor, timeouts, AuthMode::Eager)
    }

    pub fn with_mode(actor: &ActorConfig, timeouts: Timeouts, mode: AuthMode) -> Result<Self> {
        let keys = actor.keys()?;
        let signer: SharedSigner = Arc::new(keys.clone());
        Ok(Self {
            relay_url: actor.relay_url.clone(),
            actor_name: actor.identity_name.clone(),
            keys,
            policy: AuthPolicy { signer, mode },
            timeouts,
            slot: Mutex::new(ConnectionSlot::Idle),
        })
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    pub fn actor_name(&self) -> &str {
        &self.actor_name
    }

    pub fn public_key(&self) -> PublicKey {
        self.keys.public_key()
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Sign an event as this actor
    pub async fn sign(&self, builder: EventBuilder) -> Result<Event> {
        Ok(self.policy.signer.sign(builder).await?)
    }

    /// Auth status of the current connection, `Init` when none is open
    pub async fn auth_status(&self) -> AuthStatus {
        match &*self.slot.lock().await {
            ConnectionSlot::Open(connection) => connection.auth_status(),
            _ => AuthStatus::Init,
        }
    }

    /// Open the connection if needed; a connection the relay dropped is replaced
    async fn connection(&self) -> Result<Arc<Connection>> {
        let mut slot = self.slot.lock().await;
        match &*slot {
            ConnectionSlot::Closed => return Err(ClientError::ClientClosed),
            ConnectionSlot::Open(connection) if !connection.is_closed() => {
                return Ok(connection.clone())
            }
            _ => {}
        }

        let connection = Arc::new(
            Connection::open(
                &self.relay_url,
                Some(self.policy.clone()),
                self.timeouts.connect,
            )
            .await?,
        );
        *slot = ConnectionSlot::Open(connection.clone());
        Ok(connection)
    }

    /// Subscribe to the connection and make sure it is still open
    async fn listen(&self) -> Result<(Arc<Connection>, broadcast::Receiver<ConnectionEvent>)> {
        let connection = self.connection().await?;
        let events = connection.subscribe();
        if connection.is_closed() {
            return Err(ClientError::ConnectionClosed);
        }
        Ok((connection, events))
    }

    /// Publish a signed event and wait for the relay's OK
    pub async fn publish_event(&self, event: &Event) -> Result<PublishResult> {
        let deadline = Instant::now() + self.timeouts.publish;
        let event_id = event.id.to_hex();
        let (connection, mut events) = self.listen().await?;

        connection.send(ClientFrame::Event(event.clone()))?;
        let mut replayed = false;

        loop {
            let Some(frame) = next_frame(&mut events, deadline).await? else {
                debug!("Publish of {} to {} timed out", event_id, self.relay_url);
                return Ok(PublishResult {
                    relay: self.relay_url.clone(),
                    status: PublishStatus::Timeout,
                    detail: String::new(),
                });
            };

            let RelayFrame::Ok {
                event_id: acked,
                accepted,
                message,
            } = frame
            else {
                continue;
            };
            if acked != event_id {
                continue;
            }

            if !accepted
                && !replayed
                && has_reason_prefix(&message, reason::AUTH_REQUIRED)
                && self.await_auth(&connection, deadline).await? == AuthStatus::Ok
            {
                debug!("Replaying {} after authenticating", event_id);
                replayed = true;
                connection.send(ClientFrame::Event(event.clone()))?;
                continue;
            }

            let status = if accepted {
                PublishStatus::Success
            } else {
                PublishStatus::Failure
            };
            debug!(
                "Publish of {} to {}: {:?} {}",
                event_id, self.relay_url, status, message
            );
            return Ok(PublishResult {
                relay: self.relay_url.clone(),
                status,
                detail: message,
            });
        }
    }

    /// Run a subscription to completion and return every event it delivered
    ///
    /// Stops at end-of-stored-events, a refusal, or the fetch deadline, whichever
    /// comes first. Events are returned in arrival order without deduplication or
    /// signature checks.
    pub async fn fetch_events(&self, filters: Vec<Filter>) -> Result<Vec<RelayEvent>> {
        let deadline = Instant::now() + self.timeouts.fetch;
        let subscription_id = format!("zooid-{}", Uuid::new_v4().simple());
        let (connection, mut events) = self.listen().await?;

        let request = ClientFrame::Req {
            subscription_id: subscription_id.clone(),
            filters,
        };
        connection.send(request.clone())?;

        let mut collected = Vec::new();
        let mut replayed = false;

        loop {
            let Some(frame) = next_frame(&mut events, deadline).await? else {
                debug!(
                    "Subscription {} timed out with {} events",
                    subscription_id,
                    collected.len()
                );
                let _ = connection.send(ClientFrame::Close { subscription_id });
                return Ok(collected);
            };

            if let Some(refusal) = frame.subscription_refusal(&subscription_id) {
                if !replayed
                    && has_reason_prefix(refusal, reason::AUTH_REQUIRED)
                    && self.await_auth(&connection, deadline).await? == AuthStatus::Ok
                {
                    debug!("Replaying subscription {} after authenticating", subscription_id);
                    replayed = true;
                    connection.send(request.clone())?;
                    continue;
                }
                debug!("Subscription {} closed: {}", subscription_id, refusal);
                return Ok(collected);
            }

            match frame {
                RelayFrame::Event {
                    subscription_id: id,
                    event,
                } if id == subscription_id => collected.push(event),
                RelayFrame::Eose {
                    subscription_id: id,
                } if id == subscription_id => {
                    let _ = connection.send(ClientFrame::Close { subscription_id });
                    return Ok(collected);
                }
                _ => {}
            }
        }
    }

    /// Look up a single event by id; `None` when the relay does not return it
    pub async fn fetch_event(&self, id: &EventId) -> Result<Option<RelayEvent>> {
        let wanted = id.to_hex();
        let events = self.fetch_events(vec![Filter::new().id(*id)]).await?;
        Ok(events.into_iter().find(|event| event.id == wanted))
    }

    /// Close the connection; idempotent and safe before the first operation
    pub async fn close(&self) {
        let previous = {
            let mut slot = self.slot.lock().await;
            std::mem::replace(&mut *slot, ConnectionSlot::Closed)
        };
        if let ConnectionSlot::Open(connection) = previous {
            debug!("Closing client for {}", self.actor_name);
            connection.close().await;
        }
    }

    /// Wait (bounded by `deadline`) for the handshake to finish
    async fn await_auth(&self, connection: &Connection, deadline: Instant) -> Result<AuthStatus> {
        connection.authenticate()?;
        let mut auth = connection.auth_watch();
        let result = match timeout_at(deadline, auth.wait_for(|status| status.is_terminal())).await {
            Ok(Ok(status)) => Ok(*status),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                warn!("Authentication with {} did not settle", self.relay_url);
                Ok(connection.auth_status())
            }
        };
        result
    }
}

/// Next inbound frame before `deadline`; `None` on timeout
async fn next_frame(
    events: &mut broadcast::Receiver<ConnectionEvent>,
    deadline: Instant,
) -> Result<Option<RelayFrame>> {
    loop {
        match timeout_at(deadline, events.recv()).await {
            Err(_) => return Ok(None),
            Ok(Ok(ConnectionEvent::Frame(frame))) => return Ok(Some(frame)),
            Ok(Ok(ConnectionEvent::Status(ConnectionStatus::Closed))) => {
                return Err(ClientError::ConnectionClosed)
            }
            Ok(Ok(_)) => {}
            Ok(Err(RecvError::Lagged(skipped))) => {
                warn!("Dropped {} connection events", skipped);
                return Err(ClientError::Lagged(skipped));
            }
            Ok(Err(RecvError::Closed)) => return Err(ClientError::ConnectionClosed),
        }
    }
}
