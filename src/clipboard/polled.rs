//! Clipboard backend that detects changes by polling.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use tokio::{sync::mpsc, task::spawn_blocking, time::sleep};
use tokio_util::sync::CancellationToken;

use super::{changes_from, Clipboard, ClipboardChanges};
use crate::error::ClipboardError;

/// arboard-backed clipboard, watched by reading it every `interval`.
pub struct PolledClipboard {
    inner: Mutex<arboard::Clipboard>,
    interval: Duration,
}

impl PolledClipboard {
    pub fn new(interval: Duration) -> Result<Self, ClipboardError> {
        let inner = arboard::Clipboard::new().map_err(|e| ClipboardError::Init {
            backend: "poll",
            reason: e.to_string(),
        })?;
        Ok(Self {
            inner: Mutex::new(inner),
            interval,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, arboard::Clipboard>, ClipboardError> {
        self.inner
            .lock()
            .map_err(|_| ClipboardError::Read("clipboard handle poisoned".to_string()))
    }
}

impl Clipboard for PolledClipboard {
    fn read_text(&self) -> Result<Option<String>, ClipboardError> {
        match self.lock()?.get_text() {
            Ok(text) => Ok(Some(text)),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(ClipboardError::Read(e.to_string())),
        }
    }

    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        self.lock()?
            .set_text(text.to_owned())
            .map_err(|e| ClipboardError::Write(e.to_string()))
    }

    fn watch(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<ClipboardChanges, ClipboardError> {
        let interval = self.interval;
        Ok(poll_changes(self, interval, cancel))
    }
}

/// Emit the current text once, then every time it differs from the last poll.
fn poll_changes(
    clipboard: Arc<dyn Clipboard>,
    interval: Duration,
    cancel: CancellationToken,
) -> ClipboardChanges {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(poll_loop(clipboard, interval, tx, cancel));
    changes_from(rx)
}

async fn poll_loop(
    clipboard: Arc<dyn Clipboard>,
    interval: Duration,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    let mut last: Option<String> = None;
    loop {
        let reader = Arc::clone(&clipboard);
        let polled = tokio::select! {
            () = cancel.cancelled() => break,
            polled = spawn_blocking(move || reader.read_text()) => polled,
        };

        match polled {
            Ok(Ok(Some(text))) if last.as_ref() != Some(&text) => {
                last = Some(text.clone());
                if tx.send(text).await.is_err() {
                    break;
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::debug!("Clipboard poll failed: {e}"),
            Err(e) => {
                tracing::error!("Clipboard poll task panicked: {e}");
                break;
            }
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = sleep(interval) => {}
        }
    }
    tracing::debug!("Clipboard polling stopped");
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tokio::time::timeout;

    use super::*;
    use crate::clipboard::memory::MemoryClipboard;

    const INTERVAL: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn test_emits_current_text_then_only_changes() {
        let clipboard = MemoryClipboard::new();
        clipboard.copy("first");
        let cancel = CancellationToken::new();
        let mut changes = poll_changes(clipboard.clone(), INTERVAL, cancel.clone());

        assert_eq!(changes.next().await.as_deref(), Some("first"));
        assert!(timeout(INTERVAL * 5, changes.next()).await.is_err());

        clipboard.copy("second");
        assert_eq!(changes.next().await.as_deref(), Some("second"));
        assert!(timeout(INTERVAL * 5, changes.next()).await.is_err());

        cancel.cancel();
        assert_eq!(changes.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_clipboard_emits_nothing_until_copied() {
        let clipboard = MemoryClipboard::new();
        let cancel = CancellationToken::new();
        let mut changes = poll_changes(clipboard.clone(), INTERVAL, cancel.clone());

        assert!(timeout(INTERVAL * 3, changes.next()).await.is_err());
        clipboard.copy("late");
        assert_eq!(changes.next().await.as_deref(), Some("late"));

        cancel.cancel();
        assert_eq!(changes.next().await, None);
    }
}
