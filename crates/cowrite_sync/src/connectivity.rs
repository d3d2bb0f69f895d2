//! Connectivity monitor.
//!
//! Observes network reachability transitions reported by the platform layer
//! and exposes the current state plus a debounced change stream. The engine
//! never talks to the OS directly; whatever platform integration exists
//! (Tauri plugin, browser event, netlink listener) feeds [`ConnectivityMonitor::report`].

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Physical link classification, as far as the platform can tell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    None,
    Wifi,
    Cellular,
    Ethernet,
    Other,
}

/// Snapshot of network reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityState {
    pub is_online: bool,
    pub link_type: LinkType,
}

impl ConnectivityState {
    /// Offline with no link. This is the initial state, so a platform that
    /// never reports anything leaves the engine in offline-safe behavior.
    pub fn offline() -> Self {
        Self {
            is_online: false,
            link_type: LinkType::None,
        }
    }

    pub fn online(link_type: LinkType) -> Self {
        Self {
            is_online: true,
            link_type,
        }
    }
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self::offline()
    }
}

/// Debounced reachability monitor.
///
/// Repeated identical reports from the OS do not re-emit; subscribers see
/// exactly one change notification per actual transition.
pub struct ConnectivityMonitor {
    tx: watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
    /// Create a monitor starting in the offline state.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectivityState::offline());
        Self { tx }
    }

    /// Current reachability snapshot.
    pub fn current(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current().is_online
    }

    /// Subscribe to state changes. The receiver observes the value at
    /// subscription time plus every subsequent transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectivityState> {
        self.tx.subscribe()
    }

    /// Feed a reachability callback from the platform.
    ///
    /// Returns true if this was an actual transition (and was emitted).
    pub fn report(&self, state: ConnectivityState) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            log::info!(
                "[Connectivity] {} ({:?})",
                if state.is_online { "online" } else { "offline" },
                state.link_type
            );
        }
        changed
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}
