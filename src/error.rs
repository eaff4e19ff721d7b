use std::{error::Error as StdError, fmt, io, result::Result as StdResult};

/// Failures of the length-prefixed wire format.
#[derive(Debug)]
pub enum FrameError {
    /// Real content must never be sent as a zero-length frame.
    EmptyPayload,
    TooLarge { length: usize, max: usize },
    /// The stream ended inside a frame.
    Truncated { expected: usize, received: usize },
    Io(io::Error),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPayload => write!(f, "refusing to encode an empty payload"),
            Self::TooLarge { length, max } => {
                write!(f, "frame of {length} bytes exceeds the {max} byte limit")
            }
            Self::Truncated { expected, received } => write!(
                f,
                "stream ended mid-frame after {received} of {expected} bytes"
            ),
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl StdError for FrameError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Failures of the local clipboard capability.
#[derive(Debug, Clone)]
pub enum ClipboardError {
    /// The backend could not be opened at all.
    Init { backend: &'static str, reason: String },
    Read(String),
    Write(String),
    Watch(String),
}

impl fmt::Display for ClipboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init { backend, reason } => {
                writeln!(f, "could not open the {backend} clipboard backend")?;
                writeln!(f)?;
                writeln!(f, "Reason: {reason}")?;
                writeln!(f)?;
                write!(
                    f,
                    "A graphical session (X11, Wayland, Windows desktop) must be reachable."
                )
            }
            Self::Read(msg) => write!(f, "clipboard read failed: {msg}"),
            Self::Write(msg) => write!(f, "clipboard write failed: {msg}"),
            Self::Watch(msg) => write!(f, "clipboard watch failed: {msg}"),
        }
    }
}

impl StdError for ClipboardError {}

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Frame(FrameError),
    Clipboard(ClipboardError),
    Config(String),
    /// Listening on or connecting to an endpoint failed.
    Transport { endpoint: String, source: io::Error },
}

impl Error {
    pub fn transport(endpoint: impl fmt::Display, source: io::Error) -> Self {
        Self::Transport {
            endpoint: endpoint.to_string(),
            source,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Frame(e) => write!(f, "Framing error: {e}"),
            Self::Clipboard(e) => write!(f, "Clipboard error: {e}"),
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Transport { endpoint, source } => {
                write!(f, "Transport error on {endpoint}: {source}")
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(e) | Self::Transport { source: e, .. } => Some(e),
            Self::Frame(e) => Some(e),
            Self::Clipboard(e) => Some(e),
            Self::Config(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Self::Frame(e)
    }
}

impl From<ClipboardError> for Error {
    fn from(e: ClipboardError) -> Self {
        Self::Clipboard(e)
    }
}

pub type Result<T> = StdResult<T, Error>;
