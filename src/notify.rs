//! Change Notification Fan-out.
//!
//! After any successful board mutation the service publishes a refresh
//! signal scoped to the board, carrying the acting user's identity so
//! subscribers can suppress the echo back to the originator (who already
//! holds the optimistic local update).
//!
//! The [`Notifier`] trait is the transport seam: the optimistic controller
//! and the HTTP handlers only ever see `publish`, so the in-process
//! broadcast channel backing the WebSocket layer can be swapped for a
//! managed pub/sub service without touching either. Delivery is
//! at-most-once and best-effort: a dropped signal only means a peer stays
//! stale until its next fetch, and the store remains the source of truth.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A signal published to every client subscribed to a board's scope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BoardSignal {
    /// The board changed; peers should refetch. `user_id` is the acting
    /// user, used by receivers to skip refetching their own mutation.
    Refresh { board_id: i64, user_id: i64 },
}

impl BoardSignal {
    pub fn board_id(&self) -> i64 {
        match self {
            Self::Refresh { board_id, .. } => *board_id,
        }
    }

    pub fn user_id(&self) -> i64 {
        match self {
            Self::Refresh { user_id, .. } => *user_id,
        }
    }
}

/// Publish side of the notification channel. Fire-and-forget: failures are
/// never surfaced to the mutation that triggered the publish.
pub trait Notifier: Send + Sync {
    fn publish(&self, signal: BoardSignal);
}

/// In-process fan-out over a tokio broadcast channel. The WebSocket layer
/// subscribes here and forwards matching signals to connected clients.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<BoardSignal>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardSignal> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, signal: BoardSignal) {
        // Err means no receivers are currently subscribed; that is fine.
        if let Err(e) = self.tx.send(signal) {
            tracing::debug!("no subscribers for board signal: {}", e);
        }
    }
}
