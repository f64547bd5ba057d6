//! Auth State Observer
//!
//! Low-level view of one connection for scenarios that exercise the handshake
//! itself. Status changes, auth transitions and frames arrive on one ordered
//! stream, so "wait for Ok, then send, then check the verdict for that exact event
//! id" needs no cross-stream coordination. Every wait is bounded by the observer's
//! deadline.

use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::auth::AuthStatus;
use crate::connection::{Connection, ConnectionEvent, ConnectionStatus};
use crate::error::ObserveError;
use crate::frame::{has_reason_prefix, RelayFrame};

/// What a relay verdict is correlated with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    /// OK frame echoing this event id
    Event(String),
    /// CLOSED frame for this subscription id
    Subscription(String),
}

impl Correlation {
    fn describe(&self) -> String {
        match self {
            Correlation::Event(id) => format!("OK for event {id}"),
            Correlation::Subscription(id) => format!("refusal of subscription {id}"),
        }
    }

    fn verdict(&self, frame: &RelayFrame) -> Option<Verdict> {
        match (self, frame) {
            (
                Correlation::Event(id),
                RelayFrame::Ok {
                    event_id,
                    accepted,
                    message,
                },
            ) if event_id == id => Some(Verdict {
                accepted: *accepted,
                reason: message.clone(),
            }),
            (Correlation::Subscription(id), frame) => {
                frame.subscription_refusal(id).map(|reason| Verdict {
                    accepted: false,
                    reason: reason.to_string(),
                })
            }
            _ => None,
        }
    }
}

/// Relay's answer to one correlated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub accepted: bool,
    pub reason: String,
}

/// Deadline-bounded reader over a connection's event stream
pub struct AuthObserver {
    events: broadcast::Receiver<ConnectionEvent>,
    window: Duration,
    deadline: Instant,
    status: AuthStatus,
    transitions: Vec<AuthStatus>,
    closed: bool,
}

impl AuthObserver {
    /// Observe `connection` for at most `window`
    pub fn new(connection: &Connection, window: Duration) -> Self {
        let (events, status) = match connection.take_history() {
            Some(events) => (events, AuthStatus::Init),
            None => (connection.subscribe(), connection.auth_status()),
        };
        Self {
            events,
            window,
            deadline: Instant::now() + window,
            status,
            transitions: Vec::new(),
            closed: false,
        }
    }

    /// Latest auth status seen on the stream
    pub fn auth_status(&self) -> AuthStatus {
        self.status
    }

    /// Auth transitions observed so far, in order
    pub fn transitions(&self) -> &[AuthStatus] {
        &self.transitions
    }

    /// Next event before the observer's deadline
    pub async fn next_event(&mut self) -> Result<ConnectionEvent, ObserveError> {
        self.next_event_until(self.deadline, "next connection event")
            .await
    }

    async fn next_event_until(
        &mut self,
        deadline: Instant,
        waiting_for: &str,
    ) -> Result<ConnectionEvent, ObserveError> {
        if self.closed {
            return Err(ObserveError::ConnectionClosed {
                waiting_for: waiting_for.to_string(),
            });
        }

        let received = match timeout_at(deadline, self.events.recv()).await {
            Ok(received) => received,
            Err(_) => {
                return Err(ObserveError::Timeout {
                    waiting_for: waiting_for.to_string(),
                    after: self.window,
                })
            }
        };

        match received {
            Ok(event) => {
                match &event {
                    ConnectionEvent::Auth(status) => {
                        self.status = *status;
                        self.transitions.push(*status);
                    }
                    ConnectionEvent::Status(ConnectionStatus::Closed) => self.closed = true,
                    _ => {}
                }
                Ok(event)
            }
            Err(RecvError::Lagged(skipped)) => Err(ObserveError::Lagged(skipped)),
            Err(RecvError::Closed) => {
                self.closed = true;
                Err(ObserveError::ConnectionClosed {
                    waiting_for: waiting_for.to_string(),
                })
            }
        }
    }

    /// Wait until the handshake reaches `target`
    ///
    /// Fails if the handshake ends in a different terminal status or the connection
    /// closes first.
    pub async fn wait_for_auth(&mut self, target: AuthStatus) -> Result<(), ObserveError> {
        if self.status == target {
            return Ok(());
        }
        let waiting_for = format!("auth status {target}");
        loop {
            match self.next_event_until(self.deadline, &waiting_for).await? {
                ConnectionEvent::Auth(status) if status == target => {
                    debug!("Observed auth status {}", status);
                    return Ok(());
                }
                ConnectionEvent::Auth(status) if status.is_terminal() => {
                    return Err(ObserveError::AuthEnded {
                        expected: target,
                        actual: status,
                    })
                }
                ConnectionEvent::Status(ConnectionStatus::Closed) => {
                    return Err(ObserveError::ConnectionClosed { waiting_for })
                }
                _ => {}
            }
        }
    }

    /// Wait for the first frame matching `predicate`
    pub async fn wait_for_frame<F>(
        &mut self,
        description: &str,
        predicate: F,
    ) -> Result<RelayFrame, ObserveError>
    where
        F: FnMut(&RelayFrame) -> bool,
    {
        self.wait_for_frame_until(self.deadline, description, predicate)
            .await
    }

    /// Like `wait_for_frame` but gives up after `within` or the observer deadline,
    /// whichever is sooner
    pub async fn wait_for_frame_within<F>(
        &mut self,
        within: Duration,
        description: &str,
        predicate: F,
    ) -> Result<RelayFrame, ObserveError>
    where
        F: FnMut(&RelayFrame) -> bool,
    {
        let deadline = self.deadline.min(Instant::now() + within);
        self.wait_for_frame_until(deadline, description, predicate)
            .await
    }

    async fn wait_for_frame_until<F>(
        &mut self,
        deadline: Instant,
        description: &str,
        mut predicate: F,
    ) -> Result<RelayFrame, ObserveError>
    where
        F: FnMut(&RelayFrame) -> bool,
    {
        loop {
            match self.next_event_until(deadline, description).await? {
                ConnectionEvent::Frame(frame) if predicate(&frame) => return Ok(frame),
                ConnectionEvent::Status(ConnectionStatus::Closed) => {
                    return Err(ObserveError::ConnectionClosed {
                        waiting_for: description.to_string(),
                    })
                }
                _ => {}
            }
        }
    }

    /// Wait for the relay's verdict on a correlated request
    pub async fn wait_for_verdict(
        &mut self,
        correlation: &Correlation,
    ) -> Result<Verdict, ObserveError> {
        let description = correlation.describe();
        let frame = self
            .wait_for_frame(&description, |frame| correlation.verdict(frame).is_some())
            .await?;
        correlation
            .verdict(&frame)
            .ok_or(ObserveError::ConnectionClosed {
                waiting_for: description,
            })
    }

    /// Require the correlated request to be rejected with a reason starting with
    /// `prefix`, returning the full reason
    pub async fn expect_rejection_prefix(
        &mut self,
        correlation: &Correlation,
        prefix: &str,
    ) -> Result<String, ObserveError> {
        let verdict = self.wait_for_verdict(correlation).await?;
        if verdict.accepted || !has_reason_prefix(&verdict.reason, prefix) {
            return Err(ObserveError::UnexpectedVerdict {
                waiting_for: correlation.describe(),
                expected_prefix: prefix.to_string(),
                accepted: verdict.accepted,
                reason: verdict.reason,
            });
        }
        Ok(verdict.reason)
    }
}
