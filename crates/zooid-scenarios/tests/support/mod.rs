//! In-process relay with NIP-42 auth, NIP-43 membership and NIP-09 deletion
//!
//! Signatures are not verified. Authorization follows the authenticated pubkey: the
//! admin and joined members may read, anyone authenticated may publish their own
//! events, and deletions naming another author's event are blocked. Membership,
//! member-change and invite events are signed with the relay's own key.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use nostr_sdk::{EventBuilder, Keys, Kind, Tag};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use zooid_core::{ActorConfig, HarnessConfig, Timeouts};

pub const CLAIM: &str = "claim-1";

/// Knobs for misbehaving relays
#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    /// Reject this many joins as carrying a stale invite code before accepting
    pub stale_claims: usize,
    /// Accept deletion requests without deleting anything
    pub ignore_deletions: bool,
    /// Hide deleted events from one query, then serve them again
    pub resurrect_deletions: bool,
    /// Reject mixed-author deletions as blocked but still delete the author's own targets
    pub partial_mixed_deletions: bool,
    /// Address invites to a key other than the admin's
    pub misaddressed_invites: bool,
}

struct RelayState {
    keys: Keys,
    admin: String,
    members: BTreeSet<String>,
    events: Vec<Value>,
    /// Deleted events that come back once their hidden queries are used up
    resurrecting: Vec<(Value, usize)>,
    options: RelayOptions,
}

impl RelayState {
    fn can_read(&self, pubkey: &str) -> bool {
        pubkey == self.admin || self.members.contains(pubkey)
    }

    fn relay_event(&self, kind: u16, tags: &[&[&str]]) -> Value {
        let tags: Vec<Tag> = tags.iter().map(|tag| Tag::parse(*tag).unwrap()).collect();
        let event = EventBuilder::new(Kind::from(kind), "", tags)
            .to_event(&self.keys)
            .unwrap();
        serde_json::to_value(&event).unwrap()
    }

    fn members_list(&self) -> Value {
        let tags: Vec<[&str; 2]> = self
            .members
            .iter()
            .map(|member| ["member", member.as_str()])
            .collect();
        let tags: Vec<&[&str]> = tags.iter().map(|tag| tag.as_slice()).collect();
        self.relay_event(13534, &tags)
    }

    fn invite(&self) -> Value {
        let recipient = if self.options.misaddressed_invites {
            Keys::generate().public_key().to_hex()
        } else {
            self.admin.clone()
        };
        self.relay_event(28935, &[&["p", recipient.as_str()], &["claim", CLAIM]])
    }

    /// OK reply for an EVENT from an authenticated `author`
    fn publish(&mut self, event: Value) -> (bool, String) {
        let author = event["pubkey"].as_str().unwrap_or_default().to_string();
        match event["kind"].as_u64().unwrap_or_default() {
            20000 => (true, String::new()),
            28934 => self.join(&author, &event),
            28936 => {
                if self.members.remove(&author) {
                    let removed = self.relay_event(8001, &[&["p", author.as_str()]]);
                    self.events.push(removed);
                }
                (true, String::new())
            }
            5 => self.delete(&author, &event),
            _ => {
                self.events.push(event);
                (true, String::new())
            }
        }
    }

    fn join(&mut self, author: &str, event: &Value) -> (bool, String) {
        let claim = first_tag(event, "claim");
        if claim.as_deref() != Some(CLAIM) || self.options.stale_claims > 0 {
            self.options.stale_claims = self.options.stale_claims.saturating_sub(1);
            return (false, "restricted: invalid invite code".to_string());
        }
        if !self.members.insert(author.to_string()) {
            return (false, "duplicate: already a member".to_string());
        }
        let added = self.relay_event(8000, &[&["p", author]]);
        self.events.push(added);
        (true, String::new())
    }

    fn delete(&mut self, author: &str, request: &Value) -> (bool, String) {
        let ids: Vec<String> = tag_values(request, "e");
        let foreign = self.events.iter().any(|event| {
            ids.iter().any(|id| event["id"] == json!(id)) && event["pubkey"] != json!(author)
        });
        if foreign && !self.options.partial_mixed_deletions {
            return (false, BLOCKED.to_string());
        }
        if self.options.ignore_deletions {
            return (true, String::new());
        }

        let addresses = tag_values(request, "a");
        let (deleted, kept): (Vec<Value>, Vec<Value>) =
            self.events.drain(..).partition(|event| {
                let by_id = ids.iter().any(|id| event["id"] == json!(id));
                let by_address = first_tag(event, "d")
                    .map(|d| {
                        let coordinate = format!(
                            "{}:{}:{}",
                            event["kind"],
                            event["pubkey"].as_str().unwrap_or_default(),
                            d
                        );
                        addresses.contains(&coordinate)
                    })
                    .unwrap_or(false);
                (by_id || by_address) && event["pubkey"] == json!(author)
            });
        self.events = kept;
        if self.options.resurrect_deletions {
            self.resurrecting
                .extend(deleted.into_iter().map(|event| (event, 1)));
        }

        if foreign {
            (false, BLOCKED.to_string())
        } else {
            (true, String::new())
        }
    }

    fn query(&mut self, filters: &[Value]) -> Vec<Value> {
        for (event, hidden) in std::mem::take(&mut self.resurrecting) {
            if hidden == 0 {
                self.events.push(event);
            } else {
                self.resurrecting.push((event, hidden - 1));
            }
        }

        let mut candidates = self.events.clone();
        candidates.push(self.members_list());
        candidates.push(self.invite());
        candidates
            .into_iter()
            .filter(|event| filters.iter().any(|filter| matches(filter, event)))
            .collect()
    }
}

const BLOCKED: &str = "blocked: cannot delete events of other authors";

fn tag_values(event: &Value, name: &str) -> Vec<String> {
    event["tags"]
        .as_array()
        .map(|tags| {
            tags.iter()
                .filter(|tag| tag[0] == name)
                .filter_map(|tag| tag[1].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn first_tag(event: &Value, name: &str) -> Option<String> {
    tag_values(event, name).into_iter().next()
}

fn matches(filter: &Value, event: &Value) -> bool {
    let field = |name: &str, value: &Value| {
        filter[name]
            .as_array()
            .map(|allowed| allowed.contains(value))
            .unwrap_or(true)
    };
    let p_tag = filter["#p"]
        .as_array()
        .map(|wanted| {
            tag_values(event, "p")
                .iter()
                .any(|p| wanted.contains(&json!(p)))
        })
        .unwrap_or(true);
    field("ids", &event["id"])
        && field("kinds", &event["kind"])
        && field("authors", &event["pubkey"])
        && p_tag
}

/// Handle to a running relay
pub struct FakeRelay {
    pub addr: SocketAddr,
    state: Arc<Mutex<RelayState>>,
}

impl FakeRelay {
    pub async fn start(admin_pubkey: &str, options: RelayOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(RelayState {
            keys: Keys::generate(),
            admin: admin_pubkey.to_string(),
            members: BTreeSet::new(),
            events: Vec::new(),
            resurrecting: Vec::new(),
            options,
        }));

        let shared = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, shared.clone()));
            }
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn is_member(&self, pubkey: &str) -> bool {
        self.state.lock().unwrap().members.contains(pubkey)
    }
}

/// Timeouts short enough for tests against a local relay
pub fn fast_timeouts() -> Timeouts {
    Timeouts {
        fetch: Duration::from_millis(1000),
        publish: Duration::from_millis(1000),
        connect: Duration::from_secs(2),
        convergence: Duration::from_millis(600),
        poll_interval: Duration::from_millis(50),
        claim_backoff: Duration::from_millis(20),
        auth_settle: Duration::from_millis(20),
        observer: Duration::from_secs(2),
        relay_info: Duration::from_secs(2),
        ..Timeouts::default()
    }
}

/// Admin and member actors plus a relay that knows the admin
pub async fn relay_with_actors(options: RelayOptions) -> (FakeRelay, Arc<HarnessConfig>) {
    let placeholder = "ws://127.0.0.1:1".to_string();
    let mut admin = ActorConfig::ephemeral(placeholder.clone(), "relay_admin").unwrap();
    admin.metadata.insert("name".to_string(), json!("alice"));
    let mut member = ActorConfig::ephemeral(placeholder, "member_1").unwrap();

    let relay = FakeRelay::start(&admin.pubkey, options).await;
    admin.relay_url = relay.url();
    member.relay_url = relay.url();

    let config = HarnessConfig {
        relay_url: relay.url(),
        admin,
        member: Some(member),
        timeouts: fast_timeouts(),
    };
    (relay, Arc::new(config))
}

async fn serve(stream: TcpStream, state: Arc<Mutex<RelayState>>) {
    if !is_websocket(&stream).await {
        serve_relay_info(stream).await;
        return;
    }
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    let _ = ws
        .send(Message::Text(json!(["AUTH", "challenge-1"]).to_string()))
        .await;
    let mut authed: Option<String> = None;

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&text) else {
            continue;
        };

        let replies = {
            let mut state = state.lock().unwrap();
            handle(&mut state, &mut authed, &items)
        };
        for reply in replies {
            if ws.send(Message::Text(reply.to_string())).await.is_err() {
                return;
            }
        }
    }
}

fn handle(state: &mut RelayState, authed: &mut Option<String>, items: &[Value]) -> Vec<Value> {
    match items.first().and_then(Value::as_str) {
        Some("AUTH") => {
            let event = &items[1];
            *authed = event["pubkey"].as_str().map(str::to_string);
            vec![json!(["OK", event["id"], true, ""])]
        }
        Some("EVENT") => {
            let event = items[1].clone();
            let id = event["id"].clone();
            let Some(pubkey) = authed.as_deref() else {
                return vec![json!(["OK", id, false, "auth-required: authenticate first"])];
            };
            if event["pubkey"] != json!(pubkey) {
                return vec![json!(["OK", id, false, "restricted: author is not the authenticated pubkey"])];
            }
            let (accepted, message) = state.publish(event);
            vec![json!(["OK", id, accepted, message])]
        }
        Some("REQ") => {
            let sub = items[1].clone();
            let Some(pubkey) = authed.as_deref() else {
                return vec![json!(["CLOSED", sub, "auth-required: authenticate first"])];
            };
            if !state.can_read(pubkey) {
                return vec![json!(["CLOSED", sub, "restricted: members only"])];
            }
            let mut replies: Vec<Value> = state
                .query(&items[2..])
                .into_iter()
                .map(|event| json!(["EVENT", sub, event]))
                .collect();
            replies.push(json!(["EOSE", sub]));
            replies
        }
        _ => Vec::new(),
    }
}

async fn is_websocket(stream: &TcpStream) -> bool {
    let mut buf = [0u8; 4096];
    for _ in 0..100 {
        let n = stream.peek(&mut buf).await.unwrap_or(0);
        let head = String::from_utf8_lossy(&buf[..n]).to_lowercase();
        if head.contains("\r\n\r\n") {
            return head.contains("upgrade: websocket");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

async fn serve_relay_info(mut stream: TcpStream) {
    let mut buf = [0u8; 4096];
    let _ = stream.read(&mut buf).await;
    let body = json!({
        "name": "fake relay",
        "supported_nips": [1, "9", "11", 42, 43, "x"]
    })
    .to_string();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/nostr+json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
