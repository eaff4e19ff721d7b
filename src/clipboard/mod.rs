//! Access to the local clipboard.
//!
//! The relay only ever sees the [`Clipboard`] trait. The concrete backend is
//! chosen once at startup from configuration:
//! - `poll`: [`PolledClipboard`], reads the clipboard on a fixed interval
//! - `watch`: [`WatchedClipboard`], reacts to OS change notifications
//!
//! A backend is created before the first session and lives until the process
//! exits. Create exactly one per process.

#[cfg(test)]
pub mod memory;
mod polled;
mod watched;

use std::{sync::Arc, time::Duration};

use clap::ValueEnum;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use polled::PolledClipboard;
pub use watched::WatchedClipboard;

use crate::error::ClipboardError;

/// Live sequence of clipboard text values. Ends when the watch is cancelled.
pub type ClipboardChanges = BoxStream<'static, String>;

/// Text clipboard capability shared by both relay directions.
///
/// Methods may block; callers on the async runtime go through
/// `spawn_blocking`.
pub trait Clipboard: Send + Sync {
    /// Current clipboard text, or `None` if the clipboard holds no text.
    fn read_text(&self) -> Result<Option<String>, ClipboardError>;

    fn write_text(&self, text: &str) -> Result<(), ClipboardError>;

    /// Start producing change notifications until `cancel` fires.
    ///
    /// Each call starts an independent watch; a stream is not restartable.
    fn watch(self: Arc<Self>, cancel: CancellationToken)
        -> Result<ClipboardChanges, ClipboardError>;
}

/// Clipboard backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Poll the clipboard periodically.
    Poll,
    /// Subscribe to OS clipboard change notifications.
    Watch,
}

impl Backend {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Watch => "watch",
        }
    }
}

/// Open the configured backend.
pub fn open(
    backend: Backend,
    poll_interval: Duration,
) -> Result<Arc<dyn Clipboard>, ClipboardError> {
    let clipboard: Arc<dyn Clipboard> = match backend {
        Backend::Poll => Arc::new(PolledClipboard::new(poll_interval)?),
        Backend::Watch => Arc::new(WatchedClipboard::new()?),
    };
    tracing::info!("Clipboard backend: {}", backend.name());
    Ok(clipboard)
}

/// Adapt a channel receiver into a [`ClipboardChanges`] stream.
fn changes_from(rx: mpsc::Receiver<String>) -> ClipboardChanges {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|text| (text, rx)) }).boxed()
}
