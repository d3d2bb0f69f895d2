//! Mock socket connector for testing.
//!
//! Lets tests observe every frame a session sends and inject inbound
//! events, without any real networking.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::socket::{BoxFuture, SocketConnector, SocketEvent, SocketHandle};
use crate::error::{Result, SyncError};

/// The far end of a mocked connection.
pub struct MockPeer {
    /// Frames the session sent.
    pub sent: mpsc::UnboundedReceiver<String>,

    /// Inject inbound events (frames, close, errors) into the session.
    pub push: mpsc::UnboundedSender<SocketEvent>,
}

#[derive(Default)]
struct MockState {
    fail_next: bool,
    peer: Option<MockPeer>,
    connect_count: usize,
}

/// Socket connector that hands out in-memory channel pairs.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `connect` call fail.
    pub fn fail_next_connect(&self) {
        self.state.lock().unwrap().fail_next = true;
    }

    /// Take the peer end of the most recent connection.
    pub fn take_peer(&self) -> Option<MockPeer> {
        self.state.lock().unwrap().peer.take()
    }

    /// Number of successful connections so far.
    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connect_count
    }
}

impl SocketConnector for MockConnector {
    fn connect(&self, url: &str, _auth_token: Option<&str>) -> BoxFuture<'_, Result<SocketHandle>> {
        let url = url.to_string();
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.fail_next {
                state.fail_next = false;
                return Err(SyncError::Transport(format!(
                    "mock refused connection to {}",
                    url
                )));
            }

            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let (in_tx, in_rx) = mpsc::unbounded_channel();

            state.peer = Some(MockPeer {
                sent: out_rx,
                push: in_tx,
            });
            state.connect_count += 1;

            Ok(SocketHandle {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}
