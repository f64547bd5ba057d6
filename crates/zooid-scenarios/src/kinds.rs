//! Event kinds the scenarios publish and query

use nostr_sdk::Kind;

pub const METADATA: u16 = 0;
pub const TEXT_NOTE: u16 = 1;
/// NIP-09 deletion request
pub const DELETION: u16 = 5;

// NIP-43 relay membership
pub const RELAY_ADD_MEMBER: u16 = 8000;
pub const RELAY_REMOVE_MEMBER: u16 = 8001;
pub const RELAY_MEMBERS: u16 = 13534;
pub const RELAY_JOIN: u16 = 28934;
pub const RELAY_INVITE: u16 = 28935;
pub const RELAY_LEAVE: u16 = 28936;

/// Ephemeral throwaway kind used to force the auth handshake
pub const AUTH_PROBE: u16 = 20000;

/// Addressable kind used for coordinate deletions
pub const ADDRESSABLE_LIST: u16 = 30001;

pub fn kind(value: u16) -> Kind {
    Kind::from(value)
}
