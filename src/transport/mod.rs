//! Byte-stream transports between host and guest.
//!
//! An [`Endpoint`] is chosen once at startup; [`Listener::bind`] or
//! [`connect`] turns it into a [`Transport`], which the relay only ever sees
//! as a boxed read half and a boxed write half.

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

use std::{fmt, io, path::PathBuf};

use tokio::io::{AsyncRead, AsyncWrite};

#[cfg(unix)]
pub use self::unix::{Listener, Transport};
#[cfg(windows)]
pub use self::windows::{Listener, Transport};
#[cfg(unix)]
use self::unix::connect as platform_connect;
#[cfg(windows)]
use self::windows::connect as platform_connect;
use crate::error::{Error, Result};

pub type ReadHalf = Box<dyn AsyncRead + Send + Unpin>;
pub type WriteHalf = Box<dyn AsyncWrite + Send + Unpin>;

/// Where a transport is acquired from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket path, usually a QEMU `chardev socket`.
    UnixSocket(PathBuf),
    /// Windows named pipe, e.g. `\\.\pipe\clipbridge`.
    NamedPipe(String),
    /// Guest side virtio serial port.
    CharDevice(PathBuf),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnixSocket(path) => write!(f, "socket {}", path.display()),
            Self::NamedPipe(name) => write!(f, "pipe {name}"),
            Self::CharDevice(path) => write!(f, "device {}", path.display()),
        }
    }
}

impl Listener {
    /// Start listening on `endpoint`.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        let listener = Self::bind_io(endpoint).map_err(|e| Error::transport(endpoint, e))?;
        tracing::info!("Listening on {endpoint}");
        Ok(listener)
    }

    /// Wait for the next peer.
    pub async fn accept(&mut self) -> Result<Transport> {
        self.accept_io()
            .await
            .map_err(|e| Error::transport(self.endpoint(), e))
    }
}

/// Open `endpoint` as the connecting side.
pub async fn connect(endpoint: &Endpoint) -> Result<Transport> {
    let transport = platform_connect(endpoint)
        .await
        .map_err(|e| Error::transport(endpoint, e))?;
    tracing::info!("Connected to {endpoint}");
    Ok(transport)
}

/// Whether a failed dial is worth retrying: the peer is absent or busy rather
/// than the address being unusable.
pub fn is_transient(error: &Error) -> bool {
    let Error::Transport { source, .. } = error else {
        return false;
    };
    if is_busy(source) {
        return true;
    }
    matches!(
        source.kind(),
        io::ErrorKind::NotFound
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ResourceBusy
            | io::ErrorKind::WouldBlock
    )
}

#[cfg(windows)]
fn is_busy(e: &io::Error) -> bool {
    e.raw_os_error() == Some(self::windows::ERROR_PIPE_BUSY)
}

#[cfg(not(windows))]
const fn is_busy(_: &io::Error) -> bool {
    false
}

fn unsupported(what: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("{what} is not available on this platform"),
    )
}
