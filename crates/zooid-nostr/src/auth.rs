//! NIP-42 authentication session
//!
//! Pure state machine for one connection's challenge/response handshake. The
//! connection task feeds it inputs and publishes every status change on the
//! connection event stream.

use std::fmt;

use serde::Serialize;

use crate::frame::reason;
use crate::signer::SharedSigner;

// ----------------------------------------------------------------------------
// Auth Status
// ----------------------------------------------------------------------------

/// Life cycle of an authentication attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthStatus {
    /// No challenge seen yet
    Init,
    /// Relay sent a challenge that has not been answered
    ChallengeReceived,
    /// Challenge response signed and sent, awaiting the relay's verdict
    SigningChallenge,
    /// Relay accepted the response
    Ok,
    /// Relay refused the response for lack of privilege
    Forbidden,
    /// Relay refused the signature, or the signer failed
    DeniedSignature,
}

impl AuthStatus {
    /// Ok, Forbidden and DeniedSignature end an authentication attempt
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AuthStatus::Ok | AuthStatus::Forbidden | AuthStatus::DeniedSignature
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(self, AuthStatus::Forbidden | AuthStatus::DeniedSignature)
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthStatus::Init => "init",
            AuthStatus::ChallengeReceived => "challenge-received",
            AuthStatus::SigningChallenge => "signing-challenge",
            AuthStatus::Ok => "ok",
            AuthStatus::Forbidden => "forbidden",
            AuthStatus::DeniedSignature => "denied-signature",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Session State Machine
// ----------------------------------------------------------------------------

/// Inputs that drive an `AuthSession`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthInput {
    /// Relay sent an AUTH challenge
    Challenge(String),
    /// Policy elected to answer the current challenge
    BeginSigning,
    /// Signed response went out with this event id
    ResponseSent { event_id: String },
    /// Signer could not produce a response
    SignerFailed,
    /// Relay acknowledged some event
    Acknowledged {
        event_id: String,
        accepted: bool,
        message: String,
    },
}

/// Per-connection authentication state
#[derive(Debug, Clone)]
pub struct AuthSession {
    status: AuthStatus,
    challenge: Option<String>,
    response_id: Option<String>,
    rejection: Option<String>,
}

impl Default for AuthSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthSession {
    pub fn new() -> Self {
        Self {
            status: AuthStatus::Init,
            challenge: None,
            response_id: None,
            rejection: None,
        }
    }

    pub fn status(&self) -> AuthStatus {
        self.status
    }

    /// Most recent challenge, answered or not
    pub fn challenge(&self) -> Option<&str> {
        self.challenge.as_deref()
    }

    /// Relay's reason for refusing the response, once refused
    pub fn rejection(&self) -> Option<&str> {
        self.rejection.as_deref()
    }

    /// Whether a challenge is waiting to be answered
    pub fn can_respond(&self) -> bool {
        self.status == AuthStatus::ChallengeReceived && self.challenge.is_some()
    }

    /// Apply an input, returning the new status when it changed
    pub fn apply(&mut self, input: AuthInput) -> Option<AuthStatus> {
        let next = match (self.status, input) {
            (status, AuthInput::Challenge(challenge)) => {
                self.challenge = Some(challenge);
                match status {
                    AuthStatus::Init => AuthStatus::ChallengeReceived,
                    other => other,
                }
            }
            (AuthStatus::ChallengeReceived, AuthInput::BeginSigning) => {
                AuthStatus::SigningChallenge
            }
            (AuthStatus::SigningChallenge, AuthInput::ResponseSent { event_id }) => {
                self.response_id = Some(event_id);
                AuthStatus::SigningChallenge
            }
            (AuthStatus::SigningChallenge, AuthInput::SignerFailed) => AuthStatus::DeniedSignature,
            (
                AuthStatus::SigningChallenge,
                AuthInput::Acknowledged {
                    event_id,
                    accepted,
                    message,
                },
            ) if self.response_id.as_deref() == Some(event_id.as_str()) => {
                if accepted {
                    AuthStatus::Ok
                } else {
                    let status = classify_rejection(&message);
                    self.rejection = Some(message);
                    status
                }
            }
            (status, _) => status,
        };

        if next == self.status {
            return None;
        }
        self.status = next;
        Some(next)
    }
}

/// Map a refused challenge response to Forbidden or DeniedSignature
pub fn classify_rejection(message: &str) -> AuthStatus {
    if message.starts_with(reason::INVALID) || message.to_ascii_lowercase().contains("signature") {
        AuthStatus::DeniedSignature
    } else {
        AuthStatus::Forbidden
    }
}

// ----------------------------------------------------------------------------
// Auth Policy
// ----------------------------------------------------------------------------

/// When a connection answers challenges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Answer every challenge as soon as it arrives
    Eager,
    /// Hold the challenge until the relay demands authentication
    OnDemand,
}

/// Signer plus answering mode attached to a connection
#[derive(Clone)]
pub struct AuthPolicy {
    pub signer: SharedSigner,
    pub mode: AuthMode,
}

impl fmt::Debug for AuthPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthPolicy")
            .field("pubkey", &self.signer.public_key().to_hex())
            .field("mode", &self.mode)
            .finish()
    }
}

impl AuthPolicy {
    pub fn eager(signer: SharedSigner) -> Self {
        Self {
            signer,
            mode: AuthMode::Eager,
        }
    }

    pub fn on_demand(signer: SharedSigner) -> Self {
        Self {
            signer,
            mode: AuthMode::OnDemand,
        }
    }

    pub fn answers_immediately(&self) -> bool {
        self.mode == AuthMode::Eager
    }
}
