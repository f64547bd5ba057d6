//! Relay connection
//!
//! A connection is a websocket owned by one background task. Callers talk to the
//! task through a command channel and observe it through a single ordered stream of
//! `ConnectionEvent`s carrying status changes, auth transitions and inbound frames.
//! Current auth and socket status are also kept in watch channels so late
//! subscribers can check where the connection stands.

use std::sync::Mutex as StdMutex;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::auth::{AuthInput, AuthPolicy, AuthSession, AuthStatus};
use crate::error::{ClientError, Result};
use crate::frame::{ClientFrame, RelayFrame};
use crate::signer::auth_event_builder;

const EVENT_BUFFER: usize = 1024;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ----------------------------------------------------------------------------
// Connection Events
// ----------------------------------------------------------------------------

/// Socket life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Open,
    Closed,
}

/// Everything observable about a connection, in the order it happened
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Status(ConnectionStatus),
    Auth(AuthStatus),
    Frame(RelayFrame),
}

enum Command {
    Send(ClientFrame),
    Authenticate,
    Close,
}

// ----------------------------------------------------------------------------
// Connection Handle
// ----------------------------------------------------------------------------

/// Handle to a live relay connection
pub struct Connection {
    relay_url: String,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<ConnectionEvent>,
    first_subscriber: StdMutex<Option<broadcast::Receiver<ConnectionEvent>>>,
    auth: watch::Receiver<AuthStatus>,
    status: watch::Receiver<ConnectionStatus>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Connect to `relay_url`, attaching an optional auth policy
    ///
    /// Without a policy the connection records challenges but never answers them.
    pub async fn open(
        relay_url: &str,
        policy: Option<AuthPolicy>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let (ws, _) = timeout(connect_timeout, connect_async(relay_url))
            .await
            .map_err(|_| ClientError::ConnectTimeout {
                relay: relay_url.to_string(),
                after: connect_timeout,
            })?
            .map_err(|source| ClientError::ConnectFailed {
                relay: relay_url.to_string(),
                source,
            })?;
        info!("Connected to relay {}", relay_url);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, first_subscriber) = broadcast::channel(EVENT_BUFFER);
        let (auth_tx, auth_rx) = watch::channel(AuthStatus::Init);
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Open);

        let _ = events_tx.send(ConnectionEvent::Status(ConnectionStatus::Open));

        let task = ConnectionTask {
            relay_url: relay_url.to_string(),
            ws,
            commands: commands_rx,
            events: events_tx.clone(),
            auth: auth_tx,
            status: status_tx,
            session: AuthSession::new(),
            policy,
        };
        let handle = tokio::spawn(task.run());

        Ok(Self {
            relay_url: relay_url.to_string(),
            commands: commands_tx,
            events: events_tx,
            first_subscriber: StdMutex::new(Some(first_subscriber)),
            auth: auth_rx,
            status: status_rx,
            task: Mutex::new(Some(handle)),
        })
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    /// Subscribe to the connection event stream
    ///
    /// The first subscriber receives every event since the connection opened; later
    /// subscribers only see events from the moment they subscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.take_history()
            .unwrap_or_else(|| self.events.subscribe())
    }

    /// The receiver holding every event since the connection opened, if no one has
    /// claimed it yet
    pub fn take_history(&self) -> Option<broadcast::Receiver<ConnectionEvent>> {
        match self.first_subscriber.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Queue a frame for the relay
    pub fn send(&self, frame: ClientFrame) -> Result<()> {
        self.commands
            .send(Command::Send(frame))
            .map_err(|_| ClientError::ConnectionClosed)
    }

    /// Answer the pending challenge now, whatever the policy mode
    pub fn authenticate(&self) -> Result<()> {
        self.commands
            .send(Command::Authenticate)
            .map_err(|_| ClientError::ConnectionClosed)
    }

    pub fn auth_status(&self) -> AuthStatus {
        *self.auth.borrow()
    }

    pub fn auth_watch(&self) -> watch::Receiver<AuthStatus> {
        self.auth.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.status() == ConnectionStatus::Closed
    }

    /// Close the socket and wait for the connection task to finish
    ///
    /// Safe to call repeatedly and concurrently with in-flight operations, which
    /// observe `Status(Closed)` and resolve.
    pub async fn close(&self) {
        let _ = self.commands.send(Command::Close);
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Connection task for {} ended abnormally: {}", self.relay_url, e);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Connection Task
// ----------------------------------------------------------------------------

enum Step {
    Command(Option<Command>),
    Inbound(Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>),
}

struct ConnectionTask {
    relay_url: String,
    ws: WsStream,
    commands: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<ConnectionEvent>,
    auth: watch::Sender<AuthStatus>,
    status: watch::Sender<ConnectionStatus>,
    session: AuthSession,
    policy: Option<AuthPolicy>,
}

impl ConnectionTask {
    async fn run(mut self) {
        loop {
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                message = self.ws.next() => Step::Inbound(message),
            };

            let keep_running = match step {
                Step::Command(Some(Command::Send(frame))) => self.send_frame(frame).await,
                Step::Command(Some(Command::Authenticate)) => {
                    self.respond_to_challenge().await;
                    true
                }
                Step::Command(Some(Command::Close)) | Step::Command(None) => {
                    debug!("Closing connection to {}", self.relay_url);
                    let _ = self.ws.close(None).await;
                    false
                }
                Step::Inbound(Some(Ok(Message::Text(text)))) => {
                    self.handle_text(&text).await;
                    true
                }
                Step::Inbound(Some(Ok(Message::Close(frame)))) => {
                    debug!("Relay {} closed the connection: {:?}", self.relay_url, frame);
                    false
                }
                Step::Inbound(Some(Ok(_))) => true,
                Step::Inbound(Some(Err(e))) => {
                    warn!("Connection to {} failed: {}", self.relay_url, e);
                    false
                }
                Step::Inbound(None) => false,
            };

            if !keep_running {
                break;
            }
        }

        let _ = self.status.send(ConnectionStatus::Closed);
        let _ = self
            .events
            .send(ConnectionEvent::Status(ConnectionStatus::Closed));
        info!("Connection to {} closed", self.relay_url);
    }

    async fn send_frame(&mut self, frame: ClientFrame) -> bool {
        let text = frame.to_json();
        debug!("-> {} {}", self.relay_url, text);
        match self.ws.send(Message::Text(text)).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send {} to {}: {}", frame.name(), self.relay_url, e);
                false
            }
        }
    }

    async fn handle_text(&mut self, text: &str) {
        debug!("<- {} {}", self.relay_url, text);
        let frame = match RelayFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Ignoring message from {}: {}", self.relay_url, e);
                return;
            }
        };

        let _ = self.events.send(ConnectionEvent::Frame(frame.clone()));

        match frame {
            RelayFrame::Auth { challenge } => {
                self.apply(AuthInput::Challenge(challenge));
                let eager = self
                    .policy
                    .as_ref()
                    .map(AuthPolicy::answers_immediately)
                    .unwrap_or(false);
                if eager {
                    self.respond_to_challenge().await;
                }
            }
            RelayFrame::Ok {
                event_id,
                accepted,
                message,
            } => {
                self.apply(AuthInput::Acknowledged {
                    event_id,
                    accepted,
                    message,
                });
            }
            RelayFrame::Notice { message } => {
                debug!("Notice from {}: {}", self.relay_url, message);
            }
            _ => {}
        }
    }

    async fn respond_to_challenge(&mut self) {
        let Some(policy) = self.policy.clone() else {
            return;
        };
        if !self.session.can_respond() {
            return;
        }
        let Some(challenge) = self.session.challenge().map(str::to_string) else {
            return;
        };

        self.apply(AuthInput::BeginSigning);

        let signed = match auth_event_builder(&self.relay_url, &challenge) {
            Ok(builder) => policy.signer.sign(builder).await,
            Err(e) => Err(e),
        };

        match signed {
            Ok(event) => {
                self.apply(AuthInput::ResponseSent {
                    event_id: event.id.to_hex(),
                });
                self.send_frame(ClientFrame::Auth(event)).await;
            }
            Err(e) => {
                warn!("Could not sign auth challenge for {}: {}", self.relay_url, e);
                self.apply(AuthInput::SignerFailed);
            }
        }
    }

    fn apply(&mut self, input: AuthInput) {
        if let Some(status) = self.session.apply(input) {
            debug!("Auth status for {} is now {}", self.relay_url, status);
            let _ = self.auth.send(status);
            let _ = self.events.send(ConnectionEvent::Auth(status));
        }
    }
}
