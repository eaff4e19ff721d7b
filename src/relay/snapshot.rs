//! Per-session knowledge of what the peer's clipboard holds.
//!
//! Inbound owns `last_received` and publishes it through a watch channel;
//! outbound owns `last_sent` and reads `last_received` only to decide whether
//! a local change is news to the peer. Neither side writes the other's value.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone, Default)]
struct Received {
    /// Bumped on every received payload.
    generation: u64,
    text: Option<Arc<str>>,
}

/// Create the inbound (writer) and outbound (reader) halves for one session.
pub fn channel() -> (ReceivedSlot, PeerView) {
    let (tx, rx) = watch::channel(Received::default());
    (
        ReceivedSlot { tx },
        PeerView {
            received: rx,
            last_sent: None,
            sent_at: 0,
        },
    )
}

/// Inbound side: records the last text that arrived from the peer.
pub struct ReceivedSlot {
    tx: watch::Sender<Received>,
}

impl ReceivedSlot {
    pub fn record(&self, text: &str) {
        self.tx.send_modify(|received| {
            received.generation += 1;
            received.text = Some(Arc::from(text));
        });
    }
}

/// Outbound side: the last text we sent plus a view of the last one received.
pub struct PeerView {
    received: watch::Receiver<Received>,
    last_sent: Option<Arc<str>>,
    /// Receive generation observed when `last_sent` went out.
    sent_at: u64,
}

impl PeerView {
    /// Whether the peer already holds `text`.
    ///
    /// Whichever of `last_received` and `last_sent` happened later is what the
    /// peer's clipboard contains. A notification fired by our own write of a
    /// received value matches `last_received`; a repeated local value matches
    /// `last_sent`. So after receiving A and then sending B, copying A again
    /// locally is sent even though it still equals `last_received`, because
    /// the peer now holds B.
    pub fn holds(&self, text: &str) -> bool {
        let received = self.received.borrow();
        if received.generation > self.sent_at {
            received.text.as_deref() == Some(text)
        } else {
            self.last_sent.as_deref() == Some(text)
        }
    }

    pub fn mark_sent(&mut self, text: &str) {
        self.sent_at = self.received.borrow().generation;
        self.last_sent = Some(Arc::from(text));
    }
}
