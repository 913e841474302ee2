//! Shutdown coordination between the signal listener and the server.
//!
//! A trigger stops the accept loop (which then closes the listener and, in
//! gateway mode, removes the socket file) and tells idle gateway connections
//! to hang up. Uploads already streaming run to completion within the grace
//! period.

use tokio::sync::broadcast;

/// One-shot stop signal for an ingest server.
///
/// The accept loop and every open connection subscribe; triggering once
/// reaches all of them. Receivers created after the trigger never see it, so
/// subscribe before serving.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Signal every subscriber. Safe to call more than once.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of receivers still subscribed.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
