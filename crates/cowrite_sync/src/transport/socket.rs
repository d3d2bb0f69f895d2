//! Socket abstraction.
//!
//! The session only needs a way to open a bidirectional text-frame pipe;
//! everything else (TLS, handshakes, platform WebSocket APIs) lives behind
//! [`SocketConnector`]. Connected sockets are bridged over unbounded
//! channels so the session never holds the underlying stream directly.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::error::Result;

/// A boxed future for object-safe async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An event observed on an open socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    /// An inbound text frame.
    Frame(String),

    /// The peer closed the connection.
    Closed,

    /// The connection failed.
    Error(String),
}

/// A connected socket, bridged over channels.
///
/// Dropping `outbound` closes the connection; the far side signals close
/// or failure through `inbound` before the channel ends.
pub struct SocketHandle {
    /// Text frames to send to the peer.
    pub outbound: mpsc::UnboundedSender<String>,

    /// Events arriving from the peer.
    pub inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

/// Opens sockets. Implemented by the tokio-tungstenite connector on native
/// builds and by platform bridges (or mocks) elsewhere.
pub trait SocketConnector: Send + Sync {
    /// Open a connection to `url`, optionally authenticating with a bearer
    /// token. Resolves once the connection is established or rejected.
    fn connect(&self, url: &str, auth_token: Option<&str>) -> BoxFuture<'_, Result<SocketHandle>>;
}
