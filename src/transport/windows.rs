//! Named pipes and virtio serial ports opened for overlapped I/O.

use std::{
    fs::OpenOptions,
    io, mem,
    os::windows::{fs::OpenOptionsExt, io::IntoRawHandle},
    path::Path,
    time::Duration,
};

use tokio::{
    io::{split, AsyncRead, AsyncWrite},
    net::windows::named_pipe::{ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions},
    time::sleep,
};

use super::{unsupported, Endpoint, ReadHalf, WriteHalf};

pub const ERROR_PIPE_BUSY: i32 = 231;
const FILE_FLAG_OVERLAPPED: u32 = 0x4000_0000;
const BUSY_ATTEMPTS: usize = 20;

pub enum Transport {
    PipeServer(NamedPipeServer),
    PipeClient(NamedPipeClient),
    /// The port handle is driven through the same overlapped machinery as a
    /// pipe client.
    CharDevice(NamedPipeClient),
}

impl Transport {
    pub fn into_split(self) -> (ReadHalf, WriteHalf) {
        match self {
            Self::PipeServer(pipe) => boxed(pipe),
            Self::PipeClient(pipe) | Self::CharDevice(pipe) => boxed(pipe),
        }
    }
}

fn boxed<T>(stream: T) -> (ReadHalf, WriteHalf)
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = split(stream);
    (Box::new(reader), Box::new(writer))
}

pub async fn connect(endpoint: &Endpoint) -> io::Result<Transport> {
    match endpoint {
        Endpoint::NamedPipe(name) => open_pipe(name).await.map(Transport::PipeClient),
        Endpoint::CharDevice(path) => open_device(path).map(Transport::CharDevice),
        Endpoint::UnixSocket(_) => Err(unsupported("a Unix socket")),
    }
}

/// All server instances busy is short-lived; wait for one to free up.
async fn open_pipe(name: &str) -> io::Result<NamedPipeClient> {
    let mut attempts = 0;
    loop {
        match ClientOptions::new().open(name) {
            Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY) && attempts < BUSY_ATTEMPTS => {
                attempts += 1;
                sleep(Duration::from_millis(50)).await;
            }
            result => return result,
        }
    }
}

fn open_device(path: &Path) -> io::Result<NamedPipeClient> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(FILE_FLAG_OVERLAPPED)
        .open(path)?;
    // SAFETY: the handle is freshly opened for overlapped I/O and owned by
    // nothing else once `into_raw_handle` returns.
    unsafe { NamedPipeClient::from_raw_handle(file.into_raw_handle()) }
}

/// Named pipe server. A fresh instance is created before each accepted one
/// is handed out so that the pipe name never disappears.
pub struct Listener {
    name: String,
    next: NamedPipeServer,
}

impl Listener {
    pub(super) fn bind_io(endpoint: &Endpoint) -> io::Result<Self> {
        let Endpoint::NamedPipe(name) = endpoint else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot listen on {endpoint}"),
            ));
        };
        let next = ServerOptions::new().first_pipe_instance(true).create(name)?;
        Ok(Self {
            name: name.clone(),
            next,
        })
    }

    pub(super) async fn accept_io(&mut self) -> io::Result<Transport> {
        self.next.connect().await?;
        let next = ServerOptions::new().create(&self.name)?;
        Ok(Transport::PipeServer(mem::replace(&mut self.next, next)))
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::NamedPipe(self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, process};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    fn pipe_name(tag: &str) -> String {
        format!(r"\\.\pipe\clipbridge-test-{}-{tag}", process::id())
    }

    #[tokio::test]
    async fn test_device_handle_carries_bytes_both_ways() {
        let name = pipe_name("device");
        let server = ServerOptions::new()
            .first_pipe_instance(true)
            .create(&name)
            .unwrap();

        let device = connect(&Endpoint::CharDevice(PathBuf::from(&name)))
            .await
            .unwrap();
        assert!(matches!(device, Transport::CharDevice(_)));
        server.connect().await.unwrap();

        let (mut reader, mut writer) = device.into_split();
        let (mut host_reader, mut host_writer) = split(server);

        writer.write_all(b"to host").await.unwrap();
        let mut buf = [0u8; 7];
        host_reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"to host");

        host_writer.write_all(b"to guest").await.unwrap();
        let mut buf = [0u8; 8];
        reader.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"to guest");
    }

    #[tokio::test]
    async fn test_listener_keeps_pipe_name_across_accepts() {
        let endpoint = Endpoint::NamedPipe(pipe_name("listener"));
        let mut listener = Listener::bind_io(&endpoint).unwrap();

        for _ in 0..2 {
            let client = connect(&endpoint).await.unwrap();
            let server = listener.accept_io().await.unwrap();
            assert!(matches!(client, Transport::PipeClient(_)));
            assert!(matches!(server, Transport::PipeServer(_)));
        }
    }
}
