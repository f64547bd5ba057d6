//! Relay wire frames
//!
//! Encoding and decoding is done by nostr-sdk's `ClientMessage` and `RelayMessage`.
//! The harness narrows them to the frames it correlates on, with ids as hex strings
//! so consumers can match on them directly. Events delivered by the relay are kept
//! as plain data and never signature-checked: the harness tests the relay, not event
//! cryptography.

use nostr_sdk::{ClientMessage, Event, Filter, JsonUtil, RelayMessage, SubscriptionId};
use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Machine-readable reason prefixes relays put in OK and CLOSED messages
pub mod reason {
    pub const AUTH_REQUIRED: &str = "auth-required:";
    pub const RESTRICTED: &str = "restricted:";
    pub const INVALID: &str = "invalid:";
    pub const BLOCKED: &str = "blocked";
}

/// Whether a relay message starts with the given machine-readable prefix
pub fn has_reason_prefix(message: &str, prefix: &str) -> bool {
    message.starts_with(prefix)
}

// ----------------------------------------------------------------------------
// Received Events
// ----------------------------------------------------------------------------

/// An event as returned by the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u64,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub sig: String,
}

impl RelayEvent {
    /// Values of every tag with the given name (second tag element)
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.first().map(String::as_str) == Some(name))
            .filter_map(|tag| tag.get(1).map(String::as_str))
    }

    pub fn first_tag_value<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.tag_values(name).next()
    }

    pub fn has_tag_value(&self, name: &str, value: &str) -> bool {
        self.tag_values(name).any(|v| v == value)
    }
}

impl From<&Event> for RelayEvent {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id.to_hex(),
            pubkey: event.pubkey.to_hex(),
            created_at: event.created_at.as_u64(),
            kind: event.kind.as_u64(),
            tags: event
                .tags
                .iter()
                .map(|tag| tag.as_vec().iter().map(ToString::to_string).collect())
                .collect(),
            content: event.content.clone(),
            sig: event.sig.to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Relay To Client
// ----------------------------------------------------------------------------

/// Frames a relay sends to a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    Event {
        subscription_id: String,
        event: RelayEvent,
    },
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    Eose {
        subscription_id: String,
    },
    Closed {
        subscription_id: String,
        message: String,
    },
    Notice {
        message: String,
    },
    Auth {
        challenge: String,
    },
}

impl RelayFrame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let message =
            RelayMessage::from_json(text).map_err(|e| FrameError::Decode(e.to_string()))?;
        Self::try_from(message)
    }

    /// Frame type as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            RelayFrame::Event { .. } => "EVENT",
            RelayFrame::Ok { .. } => "OK",
            RelayFrame::Eose { .. } => "EOSE",
            RelayFrame::Closed { .. } => "CLOSED",
            RelayFrame::Notice { .. } => "NOTICE",
            RelayFrame::Auth { .. } => "AUTH",
        }
    }

    /// Reason carried by a CLOSED frame for `subscription_id`
    pub fn subscription_refusal(&self, subscription_id: &str) -> Option<&str> {
        match self {
            RelayFrame::Closed {
                subscription_id: id,
                message,
            } if id == subscription_id => Some(message.as_str()),
            _ => None,
        }
    }

    /// Subscription id the frame is correlated with, if any
    pub fn subscription_id(&self) -> Option<&str> {
        match self {
            RelayFrame::Event {
                subscription_id, ..
            }
            | RelayFrame::Eose { subscription_id }
            | RelayFrame::Closed {
                subscription_id, ..
            } => Some(subscription_id.as_str()),
            _ => None,
        }
    }
}

impl TryFrom<RelayMessage> for RelayFrame {
    type Error = FrameError;

    fn try_from(message: RelayMessage) -> Result<Self, Self::Error> {
        match message {
            RelayMessage::Event {
                subscription_id,
                event,
            } => Ok(RelayFrame::Event {
                subscription_id: subscription_id.to_string(),
                event: RelayEvent::from(&*event),
            }),
            RelayMessage::Ok {
                event_id,
                status,
                message,
            } => Ok(RelayFrame::Ok {
                event_id: event_id.to_hex(),
                accepted: status,
                message,
            }),
            RelayMessage::EndOfStoredEvents(subscription_id) => Ok(RelayFrame::Eose {
                subscription_id: subscription_id.to_string(),
            }),
            RelayMessage::Closed {
                subscription_id,
                message,
            } => Ok(RelayFrame::Closed {
                subscription_id: subscription_id.to_string(),
                message,
            }),
            RelayMessage::Notice { message } => Ok(RelayFrame::Notice { message }),
            RelayMessage::Auth { challenge } => Ok(RelayFrame::Auth { challenge }),
            other => Err(FrameError::Unsupported(other.as_json())),
        }
    }
}

// ----------------------------------------------------------------------------
// Client To Relay
// ----------------------------------------------------------------------------

/// Frames a client sends to a relay
#[derive(Debug, Clone)]
pub enum ClientFrame {
    Event(Event),
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },
    Close {
        subscription_id: String,
    },
    Auth(Event),
}

impl ClientFrame {
    pub fn to_message(&self) -> ClientMessage {
        match self {
            ClientFrame::Event(event) => ClientMessage::event(event.clone()),
            ClientFrame::Req {
                subscription_id,
                filters,
            } => ClientMessage::req(SubscriptionId::new(subscription_id), filters.clone()),
            ClientFrame::Close { subscription_id } => {
                ClientMessage::close(SubscriptionId::new(subscription_id))
            }
            ClientFrame::Auth(event) => ClientMessage::auth(event.clone()),
        }
    }

    pub fn to_json(&self) -> String {
        self.to_message().as_json()
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientFrame::Event(_) => "EVENT",
            ClientFrame::Req { .. } => "REQ",
            ClientFrame::Close { .. } => "CLOSE",
            ClientFrame::Auth(_) => "AUTH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_sdk::{EventBuilder, Keys, Kind, Tag};
    use serde_json::{json, Value};

    fn signed(kind: Kind, tags: Vec<Tag>) -> Event {
        EventBuilder::new(kind, "", tags)
            .to_event(&Keys::generate())
            .unwrap()
    }

    #[test]
    fn test_parse_ok_frames() {
        let id = "ab".repeat(32);
        let text = json!(["OK", id, false, "auth-required: sign in first"]).to_string();
        assert_eq!(
            RelayFrame::parse(&text).unwrap(),
            RelayFrame::Ok {
                event_id: id,
                accepted: false,
                message: "auth-required: sign in first".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_event_frame_keeps_tags() {
        let invite = signed(
            Kind::from(28935u16),
            vec![Tag::parse(&["claim", "xyz"]).unwrap()],
        );
        let text = json!(["EVENT", "sub-1", invite]).to_string();

        let RelayFrame::Event {
            subscription_id,
            event,
        } = RelayFrame::parse(&text).unwrap()
        else {
            panic!("expected EVENT");
        };
        assert_eq!(subscription_id, "sub-1");
        assert_eq!(event, RelayEvent::from(&invite));
        assert_eq!(event.kind, 28935);
        assert_eq!(event.id, invite.id.to_hex());
        assert_eq!(event.first_tag_value("claim"), Some("xyz"));
        assert!(event.has_tag_value("claim", "xyz"));
        assert!(!event.has_tag_value("p", "xyz"));
    }

    #[test]
    fn test_parse_control_frames() {
        assert_eq!(
            RelayFrame::parse(r#"["AUTH","challenge-1"]"#).unwrap(),
            RelayFrame::Auth {
                challenge: "challenge-1".to_string()
            }
        );
        let closed = RelayFrame::parse(r#"["CLOSED","sub","restricted: members only"]"#).unwrap();
        assert_eq!(closed.subscription_id(), Some("sub"));
        assert_eq!(closed.name(), "CLOSED");
        assert_eq!(closed.subscription_refusal("sub"), Some("restricted: members only"));
        assert_eq!(closed.subscription_refusal("other"), None);
        assert_eq!(
            RelayFrame::parse(r#"["EOSE","sub"]"#).unwrap().subscription_id(),
            Some("sub")
        );
        assert_eq!(
            RelayFrame::parse(r#"["NOTICE","hello"]"#).unwrap(),
            RelayFrame::Notice {
                message: "hello".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_malformed_frames() {
        assert!(matches!(
            RelayFrame::parse(r#"{"type":"OK"}"#),
            Err(FrameError::Decode(_))
        ));
        assert!(matches!(
            RelayFrame::parse(r#"["OK","not-an-id",true,""]"#),
            Err(FrameError::Decode(_))
        ));
        assert!(RelayFrame::parse("not json").is_err());
    }

    #[test]
    fn test_client_frames_encode_as_arrays() {
        let event = signed(Kind::TextNote, Vec::new());

        let encoded: Value =
            serde_json::from_str(&ClientFrame::Event(event.clone()).to_json()).unwrap();
        assert_eq!(encoded[0], "EVENT");
        assert_eq!(encoded[1]["id"], event.id.to_hex());

        let req = ClientFrame::Req {
            subscription_id: "zooid-1".to_string(),
            filters: vec![Filter::new().kind(Kind::TextNote).limit(1), Filter::new().id(event.id)],
        };
        let encoded: Value = serde_json::from_str(&req.to_json()).unwrap();
        assert_eq!(encoded[0], "REQ");
        assert_eq!(encoded[1], "zooid-1");
        assert_eq!(encoded.as_array().unwrap().len(), 4);
        assert_eq!(encoded[2]["kinds"], json!([1]));
        assert_eq!(encoded[3]["ids"], json!([event.id.to_hex()]));

        let close = ClientFrame::Close {
            subscription_id: "zooid-1".to_string(),
        };
        assert_eq!(close.to_json(), r#"["CLOSE","zooid-1"]"#);
    }

    #[test]
    fn test_reason_prefix_is_anchored() {
        assert!(has_reason_prefix("auth-required: please", reason::AUTH_REQUIRED));
        assert!(!has_reason_prefix("error: auth-required: please", reason::AUTH_REQUIRED));
    }
}
