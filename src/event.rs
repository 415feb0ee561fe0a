// MIT License - Copyright (c) 2026 Peter Wright

use crate::state::EntityKind;

/// Events emitted by a panel connection.
///
/// Subscribe via `AtsPanel::subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<PanelEvent>`.
#[derive(Debug, Clone)]
pub enum PanelEvent {
    /// Session established and logged in
    Connected,
    /// Connection lost or closed
    Disconnected,
    /// Inventory discovery finished
    DiscoveryComplete,
    /// An entity's status bytes changed
    StateChanged {
        kind: EntityKind,
        id: u16,
        name: String,
        old: Option<Vec<u8>>,
        new: Vec<u8>,
    },
    /// The change-of-state monitor loop started
    MonitorStarted,
}

pub type EventSender = tokio::sync::broadcast::Sender<PanelEvent>;
pub type EventReceiver = tokio::sync::broadcast::Receiver<PanelEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}
