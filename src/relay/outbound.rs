//! Clipboard → transport direction.

use std::{future, sync::atomic::Ordering, time::Duration};

use futures::StreamExt;
use tokio::{io::AsyncWrite, time::sleep};
use tokio_util::sync::CancellationToken;

use super::{snapshot::PeerView, SessionStats};
use crate::{
    clipboard::ClipboardChanges,
    error::{ClipboardError, Result},
    wire::{self, MAX_PAYLOAD_SIZE},
};

/// Relay local clipboard changes to the peer until cancelled or a write fails.
pub async fn run<W>(
    mut writer: W,
    mut changes: ClipboardChanges,
    mut peer: PeerView,
    heartbeat: Option<Duration>,
    stats: &SessionStats,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            next = changes.next() => next,
            () = idle(heartbeat) => {
                tokio::select! {
                    () = cancel.cancelled() => return Ok(()),
                    result = wire::write_heartbeat(&mut writer) => result?,
                }
                tracing::trace!("Heartbeat sent");
                continue;
            }
        };

        let Some(text) = next else {
            if cancel.is_cancelled() {
                return Ok(());
            }
            return Err(ClipboardError::Watch("change stream ended".to_string()).into());
        };

        if text.is_empty() {
            continue;
        }
        if peer.holds(&text) {
            stats.skipped_echoes.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(len = text.len(), "Peer already holds clipboard text");
            continue;
        }
        if text.len() > MAX_PAYLOAD_SIZE {
            tracing::warn!(
                len = text.len(),
                "Clipboard text exceeds {MAX_PAYLOAD_SIZE} bytes, not relayed"
            );
            continue;
        }

        tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            result = wire::write_frame(&mut writer, text.as_bytes()) => result?,
        }
        peer.mark_sent(&text);
        stats.frames_sent.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(len = text.len(), "Sent clipboard text");
    }
}

async fn idle(heartbeat: Option<Duration>) {
    match heartbeat {
        Some(period) => sleep(period).await,
        None => future::pending().await,
    }
}
