//! Clipboard backend driven by OS change notifications.

use std::sync::{Arc, Mutex};

use clipboard_rs::{
    Clipboard as _, ClipboardContext, ClipboardHandler, ClipboardWatcher as _,
    ClipboardWatcherContext, ContentFormat,
};
use tokio::{sync::mpsc, task::spawn_blocking};
use tokio_util::sync::CancellationToken;

use super::{changes_from, Clipboard, ClipboardChanges};
use crate::error::ClipboardError;

/// clipboard-rs backed clipboard with a native change watcher.
pub struct WatchedClipboard {
    ctx: Arc<Mutex<ClipboardContext>>,
}

impl WatchedClipboard {
    pub fn new() -> Result<Self, ClipboardError> {
        let ctx = ClipboardContext::new().map_err(|e| ClipboardError::Init {
            backend: "watch",
            reason: e.to_string(),
        })?;
        Ok(Self {
            ctx: Arc::new(Mutex::new(ctx)),
        })
    }
}

fn read_text(ctx: &Mutex<ClipboardContext>) -> Result<Option<String>, ClipboardError> {
    let ctx = ctx
        .lock()
        .map_err(|_| ClipboardError::Read("clipboard context poisoned".to_string()))?;
    if !ctx.has(ContentFormat::Text) {
        return Ok(None);
    }
    ctx.get_text()
        .map(Some)
        .map_err(|e| ClipboardError::Read(e.to_string()))
}

impl Clipboard for WatchedClipboard {
    fn read_text(&self) -> Result<Option<String>, ClipboardError> {
        read_text(&self.ctx)
    }

    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let ctx = self
            .ctx
            .lock()
            .map_err(|_| ClipboardError::Write("clipboard context poisoned".to_string()))?;
        ctx.set_text(text.to_owned())
            .map_err(|e| ClipboardError::Write(e.to_string()))
    }

    fn watch(
        self: Arc<Self>,
        cancel: CancellationToken,
    ) -> Result<ClipboardChanges, ClipboardError> {
        let (tx, rx) = mpsc::channel(16);

        let mut watcher_ctx = ClipboardWatcherContext::new()
            .map_err(|e| ClipboardError::Watch(e.to_string()))?;
        let forwarder = ChangeForwarder {
            ctx: self.ctx.clone(),
            tx,
        };
        let shutdown = watcher_ctx.add_handler(forwarder).get_shutdown_channel();

        spawn_blocking(move || {
            tracing::debug!("Clipboard watcher started");
            watcher_ctx.start_watch();
            tracing::debug!("Clipboard watcher stopped");
        });
        tokio::spawn(async move {
            cancel.cancelled().await;
            shutdown.stop();
        });

        Ok(changes_from(rx))
    }
}

/// Reads the new text on every OS notification and hands it to the relay.
struct ChangeForwarder {
    ctx: Arc<Mutex<ClipboardContext>>,
    tx: mpsc::Sender<String>,
}

impl ClipboardHandler for ChangeForwarder {
    fn on_clipboard_change(&mut self) {
        match read_text(&self.ctx) {
            // Runs on the watcher's blocking thread, so blocking here is fine.
            Ok(Some(text)) => {
                if self.tx.blocking_send(text).is_err() {
                    tracing::debug!("Clipboard change dropped, relay is gone");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to read clipboard after change: {e}"),
        }
    }
}
