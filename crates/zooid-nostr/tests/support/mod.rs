//! Scripted in-process relay for exercising connections and clients

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// How the relay answers a NIP-42 response
#[derive(Debug, Clone, PartialEq)]
pub enum AuthVerdict {
    Accept,
    Reject(String),
}

/// Scripted relay behaviour
#[derive(Debug, Clone)]
pub struct RelayBehavior {
    /// Send this challenge as soon as a client connects
    pub challenge: Option<String>,
    /// Refuse EVENT and REQ until the client authenticates
    pub require_auth: bool,
    pub auth_verdict: AuthVerdict,
    /// Never send EOSE
    pub withhold_eose: bool,
    /// Never acknowledge EVENT
    pub ignore_events: bool,
    /// Drop the socket when a REQ arrives
    pub close_on_req: bool,
}

impl Default for RelayBehavior {
    fn default() -> Self {
        Self {
            challenge: None,
            require_auth: false,
            auth_verdict: AuthVerdict::Accept,
            withhold_eose: false,
            ignore_events: false,
            close_on_req: false,
        }
    }
}

impl RelayBehavior {
    pub fn challenging() -> Self {
        Self {
            challenge: Some("challenge-1".to_string()),
            require_auth: true,
            ..Self::default()
        }
    }
}

/// Handle to a running mock relay
pub struct MockRelay {
    pub addr: SocketAddr,
    pub events: Arc<Mutex<Vec<Value>>>,
}

impl MockRelay {
    pub async fn start(behavior: RelayBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));

        let store = events.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, behavior.clone(), store.clone()));
            }
        });

        Self { addr, events }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Preload an event as if another client had published it
    pub fn store(&self, event: Value) {
        self.events.lock().unwrap().push(event);
    }
}

async fn serve(stream: TcpStream, behavior: RelayBehavior, store: Arc<Mutex<Vec<Value>>>) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    let mut authed = false;

    if let Some(challenge) = &behavior.challenge {
        let _ = ws
            .send(Message::Text(json!(["AUTH", challenge]).to_string()))
            .await;
    }

    while let Some(Ok(message)) = ws.next().await {
        let Message::Text(text) = message else {
            continue;
        };
        let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&text) else {
            continue;
        };

        let mut replies = Vec::new();
        match items.first().and_then(Value::as_str) {
            Some("EVENT") => {
                let event = items[1].clone();
                let id = event["id"].clone();
                if behavior.ignore_events {
                    continue;
                }
                if behavior.require_auth && !authed {
                    replies.push(json!(["OK", id, false, "auth-required: authenticate first"]));
                } else {
                    store.lock().unwrap().push(event);
                    replies.push(json!(["OK", id, true, ""]));
                }
            }
            Some("REQ") => {
                if behavior.close_on_req {
                    let _ = ws.close(None).await;
                    return;
                }
                let sub = items[1].clone();
                if behavior.require_auth && !authed {
                    replies.push(json!(["CLOSED", sub, "auth-required: authenticate first"]));
                } else {
                    let filters = &items[2..];
                    for event in store.lock().unwrap().iter() {
                        if filters.iter().any(|filter| matches(filter, event)) {
                            replies.push(json!(["EVENT", sub, event]));
                        }
                    }
                    if !behavior.withhold_eose {
                        replies.push(json!(["EOSE", sub]));
                    }
                }
            }
            Some("AUTH") => {
                let event = &items[1];
                let id = event["id"].clone();
                let challenge_matches = event["tags"]
                    .as_array()
                    .map(|tags| {
                        tags.iter().any(|tag| {
                            tag[0] == "challenge"
                                && Some(tag[1].as_str().unwrap_or_default())
                                    == behavior.challenge.as_deref()
                        })
                    })
                    .unwrap_or(false);
                match (&behavior.auth_verdict, challenge_matches) {
                    (AuthVerdict::Accept, true) => {
                        authed = true;
                        replies.push(json!(["OK", id, true, ""]));
                    }
                    (AuthVerdict::Accept, false) => {
                        replies.push(json!(["OK", id, false, "invalid: challenge mismatch"]));
                    }
                    (AuthVerdict::Reject(reason), _) => {
                        replies.push(json!(["OK", id, false, reason]));
                    }
                }
            }
            _ => {}
        }

        for reply in replies {
            if ws.send(Message::Text(reply.to_string())).await.is_err() {
                return;
            }
        }
    }
}

/// Minimal filter matching on ids, kinds and authors
fn matches(filter: &Value, event: &Value) -> bool {
    let contains = |field: &str, value: &Value| {
        filter[field]
            .as_array()
            .map(|allowed| allowed.contains(value))
            .unwrap_or(true)
    };
    contains("ids", &event["id"]) && contains("kinds", &event["kind"]) && contains("authors", &event["pubkey"])
}
