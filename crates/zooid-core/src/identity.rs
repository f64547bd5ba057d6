//! Identity store
//!
//! Loads the named identities a conformance run may act as. Every entry is checked
//! for well-formed hex keys and for `public_key` being the x-only secp256k1 key
//! derived from `secret_key`. Validation is exhaustive: every problem in every entry
//! is collected so a broken file can be fixed in one pass.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use nostr_sdk::{Keys, SecretKey};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ConfigError, IdentityError, SchemaIssue};

/// Length of a hex-encoded 32-byte key
pub const KEY_HEX_LEN: usize = 64;

// ----------------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------------

/// A named actor identity loaded from the identity file
#[derive(Clone, PartialEq)]
pub struct Identity {
    pub name: String,
    /// Lowercase hex secret key
    pub secret_key: String,
    /// Lowercase hex x-only public key
    pub public_key: String,
    /// Profile metadata published as kind 0 content
    pub metadata: Map<String, Value>,
    /// Unrecognized fields, passed through untouched
    pub extra: Map<String, Value>,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("name", &self.name)
            .field("secret_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .field("metadata", &self.metadata)
            .field("extra", &self.extra)
            .finish()
    }
}

/// Derive the hex x-only public key for a hex secret key
pub fn derive_public_key(secret_key: &str) -> Result<String, nostr_sdk::key::Error> {
    let secret_key = SecretKey::from_hex(secret_key)?;
    Ok(Keys::new(secret_key).public_key().to_hex())
}

/// Whether `value` is exactly 64 hex characters (either case)
pub fn is_key_hex(value: &str) -> bool {
    value.len() == KEY_HEX_LEN && hex::decode(value).is_ok()
}

// ----------------------------------------------------------------------------
// Identity Store
// ----------------------------------------------------------------------------

/// Read-only mapping of identity name to identity
#[derive(Debug, Clone, Default)]
pub struct IdentityStore {
    identities: BTreeMap<String, Identity>,
}

impl IdentityStore {
    /// Load and validate an identity file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, IdentityError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| IdentityError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_json_str(&raw)?;
        debug!(
            "Loaded {} identities from {}",
            store.identities.len(),
            path.display()
        );
        Ok(store)
    }

    /// Parse and validate identity file contents
    pub fn from_json_str(raw: &str) -> Result<Self, IdentityError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }

    /// Validate an already parsed identity document
    pub fn from_value(value: Value) -> Result<Self, IdentityError> {
        let Value::Object(entries) = value else {
            return Err(IdentityError::Schema {
                issues: vec![SchemaIssue::new("", "identity file must be an object")],
            });
        };

        let mut issues = Vec::new();
        let mut identities = BTreeMap::new();

        for (name, entry) in entries {
            if let Some(identity) = validate_entry(&name, entry, &mut issues) {
                identities.insert(name, identity);
            }
        }

        if !issues.is_empty() {
            return Err(IdentityError::Schema { issues });
        }

        Ok(Self { identities })
    }

    /// Look up an identity by its exact name
    pub fn get(&self, name: &str) -> Option<&Identity> {
        self.identities.get(name)
    }

    /// All identity names, sorted
    pub fn names(&self) -> Vec<String> {
        self.identities.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Select an identity
    ///
    /// A requested name must exist. Without a request, a store holding exactly one
    /// identity resolves to it; anything else is ambiguous.
    pub fn resolve(&self, requested: Option<&str>) -> Result<&Identity, ConfigError> {
        match requested {
            Some(name) => self
                .identities
                .get(name)
                .ok_or_else(|| ConfigError::IdentityNotFound {
                    requested: name.to_string(),
                    available: self.names(),
                }),
            None if self.identities.len() == 1 => Ok(self
                .identities
                .values()
                .next()
                .ok_or(ConfigError::AmbiguousIdentity { available: vec![] })?),
            None => Err(ConfigError::AmbiguousIdentity {
                available: self.names(),
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// Entry Validation
// ----------------------------------------------------------------------------

fn validate_entry(name: &str, entry: Value, issues: &mut Vec<SchemaIssue>) -> Option<Identity> {
    let Value::Object(mut fields) = entry else {
        issues.push(SchemaIssue::new(name, "identity must be an object"));
        return None;
    };

    let before = issues.len();
    let secret_key = take_key(name, "secret_key", &mut fields, issues);
    let public_key = take_key(name, "public_key", &mut fields, issues);

    let metadata = match fields.remove("metadata") {
        Some(Value::Object(metadata)) => Some(metadata),
        Some(_) => {
            issues.push(SchemaIssue::new(
                format!("{name}.metadata"),
                "metadata must be an object",
            ));
            None
        }
        None => {
            issues.push(SchemaIssue::new(
                format!("{name}.metadata"),
                "metadata is required",
            ));
            None
        }
    };

    if let (Some(secret_key), Some(public_key)) = (&secret_key, &public_key) {
        match derive_public_key(secret_key) {
            Ok(derived) if derived == *public_key => {}
            Ok(_) => issues.push(SchemaIssue::new(
                format!("{name}.public_key"),
                "public_key does not match secret_key",
            )),
            Err(e) => issues.push(SchemaIssue::new(
                format!("{name}.secret_key"),
                format!("secret_key is not a valid secp256k1 secret key: {e}"),
            )),
        }
    }

    if issues.len() != before {
        return None;
    }

    Some(Identity {
        name: name.to_string(),
        secret_key: secret_key?,
        public_key: public_key?,
        metadata: metadata?,
        extra: fields,
    })
}

fn take_key(
    name: &str,
    field: &str,
    fields: &mut Map<String, Value>,
    issues: &mut Vec<SchemaIssue>,
) -> Option<String> {
    match fields.remove(field) {
        Some(Value::String(value)) if is_key_hex(&value) => Some(value.to_ascii_lowercase()),
        Some(_) => {
            issues.push(SchemaIssue::new(
                format!("{name}.{field}"),
                format!("{field} must be {KEY_HEX_LEN} hex characters"),
            ));
            None
        }
        None => {
            issues.push(SchemaIssue::new(
                format!("{name}.{field}"),
                format!("{field} is required"),
            ));
            None
        }
    }
}
