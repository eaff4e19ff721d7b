//! In-process clipboard used by tests.
//!
//! Like a real OS clipboard, every write (local or relayed) produces a change
//! notification to all active watches.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use futures::stream::{self, StreamExt};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::{Clipboard, ClipboardChanges};
use crate::error::ClipboardError;

pub struct MemoryClipboard {
    text: Mutex<Option<String>>,
    changes: broadcast::Sender<String>,
    writes: AtomicUsize,
}

impl MemoryClipboard {
    pub fn new() -> Arc<Self> {
        let (changes, _) = broadcast::channel(64);
        Arc::new(Self {
            text: Mutex::new(None),
            changes,
            writes: AtomicUsize::new(0),
        })
    }

    /// Simulate the user copying `text` on this side.
    pub fn copy(&self, text: &str) {
        *self.text.lock().unwrap() = Some(text.to_string());
        let _ = self.changes.send(text.to_string());
    }

    /// Simulate a spurious change notification without a content change.
    pub fn notify(&self, text: &str) {
        let _ = self.changes.send(text.to_string());
    }

    pub fn text(&self) -> Option<String> {
        self.text.lock().unwrap().clone()
    }

    /// Number of `write_text` calls made by the relay.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of watches currently subscribed.
    pub fn watchers(&self) -> usize {
        self.changes.receiver_count()
    }
}

impl Clipboard for MemoryClipboard {
    fn read_text(&self) -> Result<Option<String>, ClipboardError> {
        Ok(self.text())
    }

    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.copy(text);
        Ok(())
    }

    fn watch(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<ClipboardChanges, ClipboardError> {
        let rx = self.changes.subscribe();
        Ok(stream::unfold((rx, cancel), |(mut rx, cancel)| async move {
            loop {
                let next = tokio::select! {
                    () = cancel.cancelled() => return None,
                    next = rx.recv() => next,
                };
                match next {
                    Ok(text) => return Some((text, (rx, cancel))),
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed())
    }
}
