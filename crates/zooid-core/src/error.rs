//! Error types for the Zooid conformance harness
//!
//! Construction-time failures (`IdentityError`, `ConfigError`) abort a whole run.
//! Per-scenario failures (`ProtocolTimeout`, `ConvergenceTimeout`) only fail the
//! scenario that raised them. Relay rejections are not errors at all; they are
//! ordinary publish results that scenarios inspect.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// ----------------------------------------------------------------------------
// Validation Errors
// ----------------------------------------------------------------------------

/// A single schema violation found while validating an identity file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    /// Dotted location of the offending value, e.g. `relay_admin.public_key`
    pub path: String,
    pub message: String,
}

impl SchemaIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = if self.path.is_empty() {
            "(root)"
        } else {
            self.path.as_str()
        };
        write!(f, "- {}: {}", location, self.message)
    }
}

/// Identity file could not be loaded
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Failed to read identity file at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Identity file contains invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Identity file schema mismatch:\n{}", format_issues(.issues))]
    Schema { issues: Vec<SchemaIssue> },
}

impl IdentityError {
    /// All schema issues carried by this error (empty for read/parse failures)
    pub fn issues(&self) -> &[SchemaIssue] {
        match self {
            IdentityError::Schema { issues } => issues,
            _ => &[],
        }
    }
}

fn format_issues(issues: &[SchemaIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

/// Actor or relay selection could not be resolved
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(
        "Identity \"{requested}\" not found in identity file. Available identities: {}",
        .available.join(", ")
    )]
    IdentityNotFound {
        requested: String,
        available: Vec<String>,
    },

    #[error(
        "No identity specified. Use --identity <name>. Available identities: {}",
        .available.join(", ")
    )]
    AmbiguousIdentity { available: Vec<String> },

    #[error("Relay URL missing. Provide --relay <url> or set ZOOID_TEST_RELAY.")]
    MissingRelay,

    #[error("Invalid relay URL {url}: {reason}")]
    InvalidRelayUrl { url: String, reason: String },

    #[error("Invalid key material for identity {identity}: {reason}")]
    InvalidKey { identity: String, reason: String },

    #[error("Invalid actor config: {field} is required")]
    MissingField { field: &'static str },
}

// ----------------------------------------------------------------------------
// Timeout Errors
// ----------------------------------------------------------------------------

/// The relay never converged on an expected state within the poll deadline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Relay did not converge: {description} (deadline {}ms, {attempts} attempts)",
    .deadline.as_millis()
)]
pub struct ConvergenceTimeout {
    pub description: String,
    pub deadline: Duration,
    pub attempts: u32,
}

// ----------------------------------------------------------------------------
// Harness Error Taxonomy
// ----------------------------------------------------------------------------

/// Umbrella error covering the harness failure classes
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Validation(#[from] IdentityError),

    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("{operation} timed out after {}ms", .after.as_millis())]
    ProtocolTimeout { operation: String, after: Duration },

    #[error(transparent)]
    Convergence(#[from] ConvergenceTimeout),
}

impl HarnessError {
    /// Whether this error must abort the entire run rather than a single scenario
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::Validation(_) | HarnessError::Configuration(_)
        )
    }
}

/// Result type for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;
