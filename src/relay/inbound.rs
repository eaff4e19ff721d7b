//! Transport → clipboard direction.

use std::{
    result::Result as StdResult,
    sync::{atomic::Ordering, Arc},
};

use tokio::{io::AsyncRead, task::spawn_blocking};
use tokio_util::sync::CancellationToken;

use super::{snapshot::ReceivedSlot, SessionStats};
use crate::{
    clipboard::Clipboard,
    error::{ClipboardError, Result},
    wire::{self, Decoded},
};

/// How the inbound direction finished without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundEnd {
    /// End-of-stream on a frame boundary.
    PeerClosed,
    Cancelled,
}

/// Apply frames from the peer to the local clipboard until the stream ends.
pub async fn run<R>(
    mut reader: R,
    clipboard: Arc<dyn Clipboard>,
    received: ReceivedSlot,
    stats: &SessionStats,
    cancel: CancellationToken,
) -> Result<InboundEnd>
where
    R: AsyncRead + Unpin,
{
    loop {
        let decoded = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(InboundEnd::Cancelled),
            decoded = wire::read_frame(&mut reader) => decoded?,
        };

        let payload = match decoded {
            Decoded::EndOfStream => return Ok(InboundEnd::PeerClosed),
            Decoded::Skip => {
                tracing::trace!("Heartbeat received");
                continue;
            }
            Decoded::Payload(payload) => payload,
        };
        stats.frames_received.fetch_add(1, Ordering::Relaxed);

        let Ok(text) = String::from_utf8(payload) else {
            tracing::warn!("Dropping frame that is not valid UTF-8");
            continue;
        };
        tracing::debug!(len = text.len(), "Received clipboard text");

        // Record first: our own write will fire a change notification that
        // must already be recognised as an echo.
        received.record(&text);

        if apply(clipboard.clone(), text).await {
            stats.clipboard_writes.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Write `text` unless the clipboard already holds it. Returns whether it wrote.
async fn apply(clipboard: Arc<dyn Clipboard>, text: String) -> bool {
    let result = spawn_blocking(move || -> StdResult<bool, ClipboardError> {
        if clipboard.read_text()?.as_deref() == Some(text.as_str()) {
            return Ok(false);
        }
        clipboard.write_text(&text).map(|()| true)
    })
    .await;

    match result {
        Ok(Ok(wrote)) => wrote,
        Ok(Err(e)) => {
            tracing::warn!("{e}");
            false
        }
        Err(e) => {
            tracing::error!("Clipboard task panicked: {e}");
            false
        }
    }
}
