//! Transport lifecycle around relay sessions.
//!
//! The listening role binds an endpoint and serves one peer at a time; the
//! dialing role connects out, retrying while the peer is absent. Either way at
//! most one [`Session`] exists at a time.

use std::{fmt, sync::Arc, time::Duration};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::{
    clipboard::Clipboard,
    error::{Error, Result},
    relay::{RelaySettings, Session, SessionEnd},
    transport::{self, Endpoint, Listener, Transport},
};

/// What happens after a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Serve a single session, then exit.
    Once,
    /// Keep serving until shutdown.
    Persistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoleState {
    Idle,
    Listening,
    Connecting,
    Serving,
    Failed,
    Stopped,
}

impl fmt::Display for RoleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Connecting => "connecting",
            Self::Serving => "serving",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

pub struct Supervisor {
    clipboard: Arc<dyn Clipboard>,
    shutdown: CancellationToken,
    policy: RestartPolicy,
    retry_delay: Duration,
    relay: RelaySettings,
    state: RoleState,
    sessions: u64,
}

impl Supervisor {
    pub fn new(clipboard: Arc<dyn Clipboard>, shutdown: CancellationToken) -> Self {
        Self {
            clipboard,
            shutdown,
            policy: RestartPolicy::Once,
            retry_delay: Duration::from_secs(1),
            relay: RelaySettings::default(),
            state: RoleState::Idle,
            sessions: 0,
        }
    }

    #[must_use]
    pub const fn policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[must_use]
    pub const fn relay(mut self, relay: RelaySettings) -> Self {
        self.relay = relay;
        self
    }

    /// Listening role: bind `endpoint` and serve accepted peers.
    ///
    /// The endpoint is released (socket file removed) when this returns.
    pub async fn listen(mut self, endpoint: &Endpoint) -> Result<()> {
        let mut listener = match Listener::bind(endpoint) {
            Ok(listener) => listener,
            Err(e) => return Err(self.fail(e)),
        };

        loop {
            self.enter(RoleState::Listening);
            let accepted = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => None,
                accepted = listener.accept() => Some(accepted),
            };
            let transport = match accepted {
                None => return self.stop(),
                Some(Ok(transport)) => transport,
                Some(Err(e)) => return Err(self.fail(e)),
            };

            let end = self.serve(transport).await;
            if self.shutdown.is_cancelled() {
                return self.stop();
            }
            if self.policy == RestartPolicy::Once {
                return self.finish_once(end);
            }
        }
    }

    /// Dialing role: connect to `endpoint`, reconnecting under the persistent
    /// policy.
    pub async fn dial(mut self, endpoint: &Endpoint) -> Result<()> {
        loop {
            self.enter(RoleState::Connecting);
            let connected = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => None,
                connected = transport::connect(endpoint) => Some(connected),
            };
            let Some(connected) = connected else {
                return self.stop();
            };

            match connected {
                Ok(transport) => {
                    let end = self.serve(transport).await;
                    if self.shutdown.is_cancelled() {
                        return self.stop();
                    }
                    if self.policy == RestartPolicy::Once {
                        return self.finish_once(end);
                    }
                    self.enter(RoleState::Idle);
                }
                Err(e) if self.policy == RestartPolicy::Persistent && transport::is_transient(&e) => {
                    tracing::debug!("{e}");
                    self.enter(RoleState::Idle);
                }
                Err(e) => return Err(self.fail(e)),
            }

            let rested = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => false,
                () = sleep(self.retry_delay) => true,
            };
            if !rested {
                return self.stop();
            }
        }
    }

    async fn serve(&mut self, transport: Transport) -> SessionEnd {
        self.enter(RoleState::Serving);
        self.sessions += 1;
        let session = Session::new(
            self.sessions,
            Arc::clone(&self.clipboard),
            self.relay,
            &self.shutdown,
        );
        let (reader, writer) = transport.into_split();
        session.run(reader, writer).await
    }

    fn finish_once(&mut self, end: SessionEnd) -> Result<()> {
        match end {
            SessionEnd::Failed(e) => Err(self.fail(e)),
            SessionEnd::PeerClosed | SessionEnd::Cancelled => self.stop(),
        }
    }

    fn enter(&mut self, state: RoleState) {
        if self.state != state {
            tracing::debug!("Role {} -> {state}", self.state);
            self.state = state;
        }
    }

    fn fail(&mut self, e: Error) -> Error {
        self.enter(RoleState::Failed);
        e
    }

    fn stop(&mut self) -> Result<()> {
        self.enter(RoleState::Stopped);
        tracing::info!(sessions = self.sessions, "Role stopped");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::path::Path;

    use tokio::{
        io::AsyncWriteExt,
        net::{UnixListener, UnixStream},
        time::timeout,
    };

    use super::*;
    use crate::{clipboard::memory::MemoryClipboard, wire};

    const LIMIT: Duration = Duration::from_secs(3);

    async fn eventually(mut check: impl FnMut() -> bool) {
        timeout(LIMIT, async {
            while !check() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    fn supervisor(clipboard: &Arc<MemoryClipboard>, shutdown: &CancellationToken) -> Supervisor {
        Supervisor::new(clipboard.clone(), shutdown.clone()).retry_delay(Duration::from_millis(10))
    }

    async fn wait_for_socket(path: &Path) {
        eventually(|| path.exists()).await;
    }

    #[tokio::test]
    async fn test_host_and_guest_exchange_over_unix_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.sock");
        let endpoint = Endpoint::UnixSocket(path.clone());

        let host = MemoryClipboard::new();
        let host_shutdown = CancellationToken::new();
        let host_role = {
            let endpoint = endpoint.clone();
            let role = supervisor(&host, &host_shutdown);
            tokio::spawn(async move { role.listen(&endpoint).await })
        };
        wait_for_socket(&path).await;

        let guest = MemoryClipboard::new();
        let guest_shutdown = CancellationToken::new();
        let guest_role = {
            let endpoint = endpoint.clone();
            let role = supervisor(&guest, &guest_shutdown);
            tokio::spawn(async move { role.dial(&endpoint).await })
        };
        eventually(|| host.watchers() == 1 && guest.watchers() == 1).await;

        guest.copy("hello");
        eventually(|| host.text().as_deref() == Some("hello")).await;

        host.copy("world");
        eventually(|| guest.text().as_deref() == Some("world")).await;
        assert_eq!(host.writes(), 1);
        assert_eq!(guest.writes(), 1);

        // Guest leaves; the host's single session ends cleanly and it exits.
        guest_shutdown.cancel();
        timeout(LIMIT, guest_role).await.unwrap().unwrap().unwrap();
        timeout(LIMIT, host_role).await.unwrap().unwrap().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_persistent_listener_accepts_next_peer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.sock");
        let endpoint = Endpoint::UnixSocket(path.clone());
        let host = MemoryClipboard::new();
        let shutdown = CancellationToken::new();

        let role = supervisor(&host, &shutdown).policy(RestartPolicy::Persistent);
        let handle = tokio::spawn(async move { role.listen(&endpoint).await });
        wait_for_socket(&path).await;

        for text in ["one", "two"] {
            let mut peer = UnixStream::connect(&path).await.unwrap();
            peer.write_all(&wire::encode(text.as_bytes()).unwrap())
                .await
                .unwrap();
            eventually(|| host.text().as_deref() == Some(text)).await;
            drop(peer);
        }

        shutdown.cancel();
        timeout(LIMIT, handle).await.unwrap().unwrap().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_failed_single_session_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.sock");
        let endpoint = Endpoint::UnixSocket(path.clone());
        let host = MemoryClipboard::new();
        let shutdown = CancellationToken::new();

        let role = supervisor(&host, &shutdown);
        let handle = tokio::spawn(async move { role.listen(&endpoint).await });
        wait_for_socket(&path).await;

        let mut peer = UnixStream::connect(&path).await.unwrap();
        let frame = wire::encode(b"cut short").unwrap();
        peer.write_all(&frame[..6]).await.unwrap();
        drop(peer);

        let result = timeout(LIMIT, handle).await.unwrap().unwrap();
        assert!(matches!(result, Err(Error::Frame(_))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_single_dial_without_peer_fails() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::UnixSocket(dir.path().join("absent.sock"));
        let guest = MemoryClipboard::new();

        let result = supervisor(&guest, &CancellationToken::new())
            .dial(&endpoint)
            .await;
        assert!(matches!(result, Err(Error::Transport { .. })));
    }

    #[tokio::test]
    async fn test_persistent_dial_waits_for_peer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.sock");
        let endpoint = Endpoint::UnixSocket(path.clone());
        let guest = MemoryClipboard::new();
        let shutdown = CancellationToken::new();

        let role = supervisor(&guest, &shutdown).policy(RestartPolicy::Persistent);
        let handle = tokio::spawn(async move { role.dial(&endpoint).await });

        sleep(Duration::from_millis(50)).await;
        let listener = UnixListener::bind(&path).unwrap();
        let (mut peer, _) = timeout(LIMIT, listener.accept()).await.unwrap().unwrap();
        peer.write_all(&wire::encode(b"late").unwrap()).await.unwrap();
        eventually(|| guest.text().as_deref() == Some("late")).await;

        shutdown.cancel();
        timeout(LIMIT, handle).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_while_listening_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idle.sock");
        let endpoint = Endpoint::UnixSocket(path.clone());
        let host = MemoryClipboard::new();
        let shutdown = CancellationToken::new();

        let role = supervisor(&host, &shutdown);
        let handle = tokio::spawn(async move { role.listen(&endpoint).await });
        wait_for_socket(&path).await;

        shutdown.cancel();
        timeout(LIMIT, handle).await.unwrap().unwrap().unwrap();
        assert!(!path.exists());
    }
}
