//! Errors raised by the shared scenario steps

use thiserror::Error;
use zooid_core::{ConvergenceTimeout, HarnessError};
use zooid_nostr::{ClientError, PublishStatus};

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Invite claim not found (invites: {invites}).")]
    ClaimNotFound { invites: usize },

    /// The relay refused the claim as invalid or already used
    #[error("Join failed after retries due to invalid invite code: {detail}")]
    StaleClaim { detail: String },

    #[error("Join failed ({status:?}): {detail}")]
    JoinRejected {
        status: PublishStatus,
        detail: String,
    },

    #[error("{action} failed ({status:?}): {detail}")]
    PublishRejected {
        action: &'static str,
        status: PublishStatus,
        detail: String,
    },

    #[error("Invalid tag {tag:?}: {reason}")]
    InvalidTag { tag: Vec<String>, reason: String },

    #[error("{0}")]
    Assertion(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Harness(#[from] HarnessError),

    #[error(transparent)]
    Convergence(#[from] ConvergenceTimeout),
}

impl ScenarioError {
    /// Whether a fresh claim might succeed where this attempt failed
    pub fn is_retryable_claim(&self) -> bool {
        matches!(
            self,
            ScenarioError::ClaimNotFound { .. } | ScenarioError::StaleClaim { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ScenarioError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_only_claim_problems_are_retryable() {
        assert!(ScenarioError::ClaimNotFound { invites: 0 }.is_retryable_claim());
        assert!(ScenarioError::StaleClaim {
            detail: "invalid invite code".to_string()
        }
        .is_retryable_claim());
        assert!(!ScenarioError::JoinRejected {
            status: PublishStatus::Failure,
            detail: "restricted: banned".to_string()
        }
        .is_retryable_claim());
        assert!(!ScenarioError::Convergence(ConvergenceTimeout {
            description: "member listed".to_string(),
            deadline: Duration::from_millis(3000),
            attempts: 20,
        })
        .is_retryable_claim());
    }

    #[test]
    fn test_claim_not_found_reports_invite_count() {
        assert_eq!(
            ScenarioError::ClaimNotFound { invites: 2 }.to_string(),
            "Invite claim not found (invites: 2)."
        );
    }
}
