//! Duplex relay engine.
//!
//! A [`Session`] drives one connected transport: the inbound task applies
//! frames from the peer to the local clipboard, the outbound task frames local
//! clipboard changes for the peer. Both run under one cancellation token so
//! that whichever finishes first tears the other down.

mod inbound;
mod outbound;
pub mod snapshot;

use std::{
    fmt, io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    task::JoinError,
};
use tokio_util::sync::CancellationToken;

use self::inbound::InboundEnd;
use crate::{clipboard::Clipboard, error::Error};

/// Counters kept for the lifetime of one session.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub frames_sent: AtomicU64,
    pub frames_received: AtomicU64,
    pub skipped_echoes: AtomicU64,
    pub clipboard_writes: AtomicU64,
}

impl SessionStats {
    fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RelaySettings {
    /// Idle time after which outbound emits a zero-length frame.
    pub heartbeat: Option<Duration>,
}

/// How a session finished.
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer closed the stream on a frame boundary.
    PeerClosed,
    /// Process shutdown cancelled the session.
    Cancelled,
    Failed(Error),
}

impl SessionEnd {
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed the connection"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// One connected peer: exactly one inbound and one outbound task.
pub struct Session {
    id: u64,
    clipboard: Arc<dyn Clipboard>,
    settings: RelaySettings,
    cancel: CancellationToken,
    stats: Arc<SessionStats>,
}

impl Session {
    /// The session is cancelled together with `shutdown`, never the reverse.
    pub fn new(
        id: u64,
        clipboard: Arc<dyn Clipboard>,
        settings: RelaySettings,
        shutdown: &CancellationToken,
    ) -> Self {
        Self {
            id,
            clipboard,
            settings,
            cancel: shutdown.child_token(),
            stats: Arc::new(SessionStats::default()),
        }
    }

    #[cfg(test)]
    pub fn stats(&self) -> Arc<SessionStats> {
        Arc::clone(&self.stats)
    }

    /// Relay until the peer disconnects, either direction fails, or shutdown.
    pub async fn run<R, W>(self, reader: R, writer: W) -> SessionEnd
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        tracing::info!(session = self.id, "Session started");

        let changes = match Arc::clone(&self.clipboard).watch(self.cancel.clone()) {
            Ok(changes) => changes,
            Err(e) => {
                self.cancel.cancel();
                return self.finish(SessionEnd::Failed(e.into()));
            }
        };
        let (received, peer) = snapshot::channel();

        let inbound = {
            let guard = self.cancel.clone().drop_guard();
            let cancel = self.cancel.clone();
            let clipboard = Arc::clone(&self.clipboard);
            let stats = Arc::clone(&self.stats);
            tokio::spawn(async move {
                let _guard = guard;
                inbound::run(reader, clipboard, received, &stats, cancel).await
            })
        };

        let outbound = {
            let guard = self.cancel.clone().drop_guard();
            let cancel = self.cancel.clone();
            let heartbeat = self.settings.heartbeat;
            let stats = Arc::clone(&self.stats);
            tokio::spawn(async move {
                let _guard = guard;
                outbound::run(writer, changes, peer, heartbeat, &stats, cancel).await
            })
        };

        let (inbound, outbound) = tokio::join!(inbound, outbound);

        let end = match inbound {
            Ok(Ok(InboundEnd::PeerClosed)) => SessionEnd::PeerClosed,
            Ok(Err(e)) => SessionEnd::Failed(e),
            Err(e) => SessionEnd::Failed(panicked(&e)),
            Ok(Ok(InboundEnd::Cancelled)) => match outbound {
                Ok(Ok(())) => SessionEnd::Cancelled,
                Ok(Err(e)) => SessionEnd::Failed(e),
                Err(e) => SessionEnd::Failed(panicked(&e)),
            },
        };
        self.finish(end)
    }

    fn finish(&self, end: SessionEnd) -> SessionEnd {
        let stats = &self.stats;
        let sent = SessionStats::get(&stats.frames_sent);
        let received = SessionStats::get(&stats.frames_received);
        let skipped = SessionStats::get(&stats.skipped_echoes);
        let writes = SessionStats::get(&stats.clipboard_writes);
        if end.is_failure() {
            tracing::warn!(
                session = self.id,
                frames_sent = sent,
                frames_received = received,
                skipped_echoes = skipped,
                clipboard_writes = writes,
                "Session {end}"
            );
        } else {
            tracing::info!(
                session = self.id,
                frames_sent = sent,
                frames_received = received,
                skipped_echoes = skipped,
                clipboard_writes = writes,
                "Session ended: {end}"
            );
        }
        end
    }
}

fn panicked(e: &JoinError) -> Error {
    Error::Io(io::Error::other(format!("relay task aborted: {e}")))
}
