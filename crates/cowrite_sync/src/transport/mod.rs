//! Real-time transport.
//!
//! Wire message envelope, the socket connector seam, and the per-document
//! session state machine. The orchestrator owns retry and reconnect policy;
//! this module only moves messages.

pub mod message;
pub mod mock;
pub mod session;
pub mod socket;

#[cfg(all(feature = "native-transport", not(target_arch = "wasm32")))]
pub mod tokio_ws;

pub use message::{CursorPosition, Envelope, Payload};
pub use mock::{MockConnector, MockPeer};
pub use session::{RealtimeSession, SessionState};
pub use socket::{BoxFuture, SocketConnector, SocketEvent, SocketHandle};

#[cfg(all(feature = "native-transport", not(target_arch = "wasm32")))]
pub use tokio_ws::TokioConnector;
