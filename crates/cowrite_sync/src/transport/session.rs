//! Real-time document session.
//!
//! One logical connection per active document session: a state machine over
//! a [`SocketConnector`], the outbound send surface, and the inbound read
//! loop. Reconnect policy deliberately lives in the orchestrator, not here;
//! the session only reports what happened to its connection.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::message::{CursorPosition, Envelope, Payload};
use super::socket::{BoxFuture, SocketConnector, SocketEvent};
use crate::engine::CrdtEngine;
use crate::error::{Result, SyncError};
use crate::service::UpdateTransmitter;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

struct SessionShared {
    state: SessionState,
    document_id: String,
    user_id: String,
    outbound: Option<tokio::sync::mpsc::UnboundedSender<String>>,
}

/// A single-document real-time session.
///
/// At most one connection is active per session instance; `connect` tears
/// down any prior one first. Send operations are only valid while
/// `Connected` and fail with [`SyncError::NotConnected`] otherwise.
pub struct RealtimeSession {
    engine: Arc<dyn CrdtEngine>,
    connector: Arc<dyn SocketConnector>,
    shared: Arc<RwLock<SessionShared>>,
    messages: broadcast::Sender<Envelope>,
    ping_interval: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RealtimeSession {
    pub fn new(
        engine: Arc<dyn CrdtEngine>,
        connector: Arc<dyn SocketConnector>,
        ping_interval: Duration,
    ) -> Self {
        let (messages, _) = broadcast::channel(256);
        Self {
            engine,
            connector,
            shared: Arc::new(RwLock::new(SessionShared {
                state: SessionState::Disconnected,
                document_id: String::new(),
                user_id: String::new(),
                outbound: None,
            })),
            messages,
            ping_interval,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        self.shared.read().unwrap().state
    }

    /// Subscribe to every successfully parsed inbound message.
    ///
    /// Messages are broadcast here whether or not the session itself had a
    /// handler for their type, so observers see the full inbound stream.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<Envelope> {
        self.messages.subscribe()
    }

    /// Connect to a document session, tearing down any prior one.
    ///
    /// On success the session is `Connected` and a `UserJoin` announcement
    /// has been queued to the server. On failure the session is left in the
    /// `Error` state.
    pub async fn connect(
        &self,
        document_id: &str,
        user_id: &str,
        auth_token: Option<&str>,
        server_url: &str,
    ) -> Result<()> {
        self.disconnect();

        {
            let mut shared = self.shared.write().unwrap();
            shared.state = SessionState::Connecting;
            shared.document_id = document_id.to_string();
            shared.user_id = user_id.to_string();
        }
        log::info!(
            "[Session] Connecting to {} as {}/{}",
            server_url,
            document_id,
            user_id
        );

        let handle = match self.connector.connect(server_url, auth_token).await {
            Ok(handle) => handle,
            Err(e) => {
                self.shared.write().unwrap().state = SessionState::Error;
                return Err(e);
            }
        };

        {
            let mut shared = self.shared.write().unwrap();
            shared.outbound = Some(handle.outbound);
            shared.state = SessionState::Connected;
        }

        let reader = tokio::spawn(read_loop(
            handle.inbound,
            Arc::clone(&self.shared),
            Arc::clone(&self.engine),
            self.messages.clone(),
        ));
        let keepalive = tokio::spawn(ping_loop(Arc::clone(&self.shared), self.ping_interval));
        {
            let mut tasks = self.tasks.lock().unwrap();
            tasks.push(reader);
            tasks.push(keepalive);
        }

        // Announce ourselves; a failure here is a connection problem the
        // read loop will surface, not a connect error
        if let Err(e) = self.send_envelope(Payload::UserJoin, None) {
            log::warn!("[Session] Failed to send UserJoin: {}", e);
        }
        Ok(())
    }

    /// Disconnect, announcing `UserLeave` best-effort.
    ///
    /// Always ends in the `Disconnected` state, whether or not the
    /// announcement could be delivered.
    pub fn disconnect(&self) {
        let _ = self.send_envelope(Payload::UserLeave, None);

        {
            let mut shared = self.shared.write().unwrap();
            // Dropping the sender closes the underlying socket
            shared.outbound = None;
            shared.state = SessionState::Disconnected;
        }

        let mut tasks = self.tasks.lock().unwrap();
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    /// Send a CRDT update for the session document.
    pub fn send_update(&self, update: &[u8]) -> Result<()> {
        self.send_envelope(
            Payload::DocumentUpdate {
                update: update.to_vec(),
            },
            None,
        )
    }

    /// Send a sync handshake message.
    pub fn send_sync(&self, update: Option<Vec<u8>>, state_vector: Option<Vec<u8>>) -> Result<()> {
        self.send_envelope(
            Payload::Sync {
                update,
                state_vector,
            },
            None,
        )
    }

    /// Send a presence map.
    pub fn send_awareness(&self, presence: serde_json::Map<String, serde_json::Value>) -> Result<()> {
        self.send_envelope(Payload::Awareness(presence), None)
    }

    /// Send a cursor position.
    pub fn send_cursor(&self, cursor: CursorPosition) -> Result<()> {
        self.send_envelope(Payload::Cursor(cursor), None)
    }

    /// Send a keepalive ping.
    pub fn send_ping(&self) -> Result<()> {
        self.send_envelope(Payload::Ping, None)
    }

    fn send_envelope(&self, payload: Payload, document_id: Option<&str>) -> Result<()> {
        let (document_id, user_id, tx) = {
            let shared = self.shared.read().unwrap();
            if shared.state != SessionState::Connected {
                return Err(SyncError::NotConnected);
            }
            let Some(tx) = shared.outbound.clone() else {
                return Err(SyncError::NotConnected);
            };
            (
                document_id.unwrap_or(&shared.document_id).to_string(),
                shared.user_id.clone(),
                tx,
            )
        };

        let frame = Envelope::new(payload, document_id, user_id).to_json()?;
        tx.send(frame)
            .map_err(|_| SyncError::Transport("socket channel closed".to_string()))
    }
}

impl UpdateTransmitter for RealtimeSession {
    fn transmit(&self, document_id: &str, update: &[u8]) -> BoxFuture<'_, Result<()>> {
        let document_id = document_id.to_string();
        let update = update.to_vec();
        Box::pin(async move {
            self.send_envelope(Payload::DocumentUpdate { update }, Some(&document_id))
        })
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        let mut tasks = self.tasks.lock().unwrap();
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

/// Inbound pump: parse frames, broadcast, apply CRDT payloads.
///
/// Malformed frames are dropped silently so one misbehaving peer cannot
/// take down the session.
async fn read_loop(
    mut inbound: tokio::sync::mpsc::UnboundedReceiver<SocketEvent>,
    shared: Arc<RwLock<SessionShared>>,
    engine: Arc<dyn CrdtEngine>,
    messages: broadcast::Sender<Envelope>,
) {
    while let Some(event) = inbound.recv().await {
        match event {
            SocketEvent::Frame(text) => {
                let envelope = match Envelope::parse(&text) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        log::debug!("[Session] Dropping malformed frame: {}", e);
                        continue;
                    }
                };

                // Observers get every parsed message, handled or not
                let _ = messages.send(envelope.clone());

                match &envelope.payload {
                    Payload::DocumentUpdate { update } => {
                        if let Err(e) = engine.apply_update(&envelope.document_id, update) {
                            log::warn!(
                                "[Session] Failed to apply update for {}: {}",
                                envelope.document_id,
                                e
                            );
                        }
                    }
                    Payload::Sync {
                        update: Some(update),
                        ..
                    } => {
                        if let Err(e) = engine.apply_update(&envelope.document_id, update) {
                            log::warn!(
                                "[Session] Failed to apply sync update for {}: {}",
                                envelope.document_id,
                                e
                            );
                        }
                    }
                    _ => {}
                }
            }
            SocketEvent::Closed => {
                log::info!("[Session] Connection closed by peer");
                let mut shared = shared.write().unwrap();
                shared.outbound = None;
                shared.state = SessionState::Disconnected;
                return;
            }
            SocketEvent::Error(e) => {
                log::error!("[Session] Connection error: {}", e);
                let mut shared = shared.write().unwrap();
                shared.outbound = None;
                shared.state = SessionState::Error;
                return;
            }
        }
    }
}

/// Keepalive pump: one `Ping` per interval while connected.
async fn ping_loop(shared: Arc<RwLock<SessionShared>>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;

        let frame = {
            let shared = shared.read().unwrap();
            if shared.state != SessionState::Connected {
                return;
            }
            let Some(tx) = shared.outbound.clone() else {
                return;
            };
            let envelope = Envelope::new(
                Payload::Ping,
                shared.document_id.clone(),
                shared.user_id.clone(),
            );
            (envelope, tx)
        };

        let (envelope, tx) = frame;
        match envelope.to_json() {
            Ok(json) => {
                if tx.send(json).is_err() {
                    return;
                }
            }
            Err(e) => {
                log::warn!("[Session] Failed to encode ping: {}", e);
                return;
            }
        }
    }
}
