//! Unix domain sockets and virtio serial ports.

use std::{
    fs, io,
    os::unix::fs::FileTypeExt,
    path::{Path, PathBuf},
};

use tokio::net::{unix::pipe, UnixListener, UnixStream};

use super::{unsupported, Endpoint, ReadHalf, WriteHalf};

pub enum Transport {
    UnixSocket(UnixStream),
    /// Both halves refer to one open file description of the port.
    CharDevice {
        rx: pipe::Receiver,
        tx: pipe::Sender,
    },
}

impl Transport {
    pub fn into_split(self) -> (ReadHalf, WriteHalf) {
        match self {
            Self::UnixSocket(stream) => {
                let (reader, writer) = stream.into_split();
                (Box::new(reader), Box::new(writer))
            }
            Self::CharDevice { rx, tx } => (Box::new(rx), Box::new(tx)),
        }
    }
}

pub async fn connect(endpoint: &Endpoint) -> io::Result<Transport> {
    match endpoint {
        Endpoint::UnixSocket(path) => Ok(Transport::UnixSocket(UnixStream::connect(path).await?)),
        Endpoint::CharDevice(path) => open_device(path),
        Endpoint::NamedPipe(_) => Err(unsupported("a named pipe")),
    }
}

/// Virtio ports refuse a second open, so the sender duplicates the receiver's
/// descriptor. `O_NONBLOCK` lives on the shared description.
#[cfg(target_os = "linux")]
fn open_device(path: &Path) -> io::Result<Transport> {
    use std::os::fd::AsFd;

    let rx = pipe::OpenOptions::new()
        .read_write(true)
        .unchecked(true)
        .open_receiver(path)?;
    let fd = rx.as_fd().try_clone_to_owned()?;
    let tx = pipe::Sender::from_file_unchecked(fs::File::from(fd))?;
    Ok(Transport::CharDevice { rx, tx })
}

#[cfg(not(target_os = "linux"))]
fn open_device(path: &Path) -> io::Result<Transport> {
    let mut options = pipe::OpenOptions::new();
    options.unchecked(true);
    let rx = options.open_receiver(path)?;
    let tx = options.open_sender(path)?;
    Ok(Transport::CharDevice { rx, tx })
}

/// Listening socket. The socket file is removed when the listener is dropped.
pub struct Listener {
    listener: UnixListener,
    path: PathBuf,
}

impl Listener {
    pub(super) fn bind_io(endpoint: &Endpoint) -> io::Result<Self> {
        let Endpoint::UnixSocket(path) = endpoint else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot listen on {endpoint}"),
            ));
        };
        remove_stale_socket(path)?;
        let listener = UnixListener::bind(path)?;
        Ok(Self {
            listener,
            path: path.clone(),
        })
    }

    pub(super) async fn accept_io(&mut self) -> io::Result<Transport> {
        let (stream, _) = self.listener.accept().await?;
        Ok(Transport::UnixSocket(stream))
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::UnixSocket(self.path.clone())
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("Removed {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {e}", self.path.display()),
        }
    }
}

/// A socket left behind by a previous run is replaced; anything else is not.
fn remove_stale_socket(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            tracing::debug!("Removing stale socket {}", path.display());
            fs::remove_file(path)
        }
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "path exists and is not a socket",
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
