//! Runtime configuration.
//!
//! Values are layered: compiled defaults, then the JSON config file, then
//! command-line flags (applied by the caller on the returned [`Config`]).

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{
    clipboard::Backend,
    error::{Error, Result},
    relay::RelaySettings,
    transport::Endpoint,
};

#[cfg(windows)]
const DEFAULT_DEVICE: &str = r"\\.\Global\com.clipbridge.clipboard";
#[cfg(not(windows))]
const DEFAULT_DEVICE: &str = "/dev/virtio-ports/com.clipbridge.clipboard";
const DEFAULT_PIPE: &str = r"\\.\pipe\clipbridge";
const SOCKET_NAME: &str = "clipbridge.sock";

/// Which end of the VM boundary this process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Guest,
}

/// Shape of `config.json`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    socket: Option<PathBuf>,
    device: Option<PathBuf>,
    pipe: Option<String>,
    clipboard: Option<Backend>,
    poll_interval_ms: Option<u64>,
    retry_delay_ms: Option<u64>,
    heartbeat_secs: Option<u64>,
    stop_timeout_secs: Option<u64>,
    log_filter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host side Unix socket.
    pub socket: PathBuf,
    /// Guest side virtio port.
    pub device: PathBuf,
    /// Host side named pipe (Windows).
    pub pipe: String,
    /// `None` picks the role default.
    pub clipboard: Option<Backend>,
    pub poll_interval: Duration,
    pub retry_delay: Duration,
    pub heartbeat: Option<Duration>,
    pub stop_timeout: Duration,
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket: dirs::runtime_dir()
                .unwrap_or_else(env::temp_dir)
                .join(SOCKET_NAME),
            device: PathBuf::from(DEFAULT_DEVICE),
            pipe: DEFAULT_PIPE.to_string(),
            clipboard: None,
            poll_interval: Duration::from_millis(500),
            retry_delay: Duration::from_secs(1),
            heartbeat: None,
            stop_timeout: Duration::from_secs(5),
            log_filter: None,
        }
    }
}

impl Config {
    /// Defaults overlaid with the config file.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => read_file(path)?,
            None => match default_path() {
                Some(path) if path.exists() => read_file(&path)?,
                _ => FileConfig::default(),
            },
        };
        Self::default().merge(file)
    }

    fn merge(mut self, file: FileConfig) -> Result<Self> {
        if let Some(socket) = file.socket {
            self.socket = socket;
        }
        if let Some(device) = file.device {
            self.device = device;
        }
        if let Some(pipe) = file.pipe {
            self.pipe = pipe;
        }
        if let Some(ms) = file.poll_interval_ms {
            self.poll_interval = positive("poll_interval_ms", ms).map(Duration::from_millis)?;
        }
        if let Some(ms) = file.retry_delay_ms {
            self.retry_delay = positive("retry_delay_ms", ms).map(Duration::from_millis)?;
        }
        if let Some(secs) = file.heartbeat_secs {
            self.heartbeat = Some(positive("heartbeat_secs", secs).map(Duration::from_secs)?);
        }
        if let Some(secs) = file.stop_timeout_secs {
            self.stop_timeout = Duration::from_secs(secs);
        }
        self.clipboard = file.clipboard.or(self.clipboard);
        self.log_filter = file.log_filter.or(self.log_filter);
        Ok(self)
    }

    /// The host polls by default; the guest subscribes to notifications.
    pub fn backend_for(&self, role: Role) -> Backend {
        self.clipboard.unwrap_or(match role {
            Role::Host => Backend::Poll,
            Role::Guest => Backend::Watch,
        })
    }

    pub fn host_endpoint(&self) -> Endpoint {
        if cfg!(windows) {
            Endpoint::NamedPipe(self.pipe.clone())
        } else {
            Endpoint::UnixSocket(self.socket.clone())
        }
    }

    pub fn guest_endpoint(&self) -> Endpoint {
        Endpoint::CharDevice(self.device.clone())
    }

    pub const fn relay(&self) -> RelaySettings {
        RelaySettings {
            heartbeat: self.heartbeat,
        }
    }
}

/// `<config dir>/clipbridge/config.json`
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("clipbridge").join("config.json"))
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&text).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
}

fn positive(key: &str, value: u64) -> Result<u64> {
    if value == 0 {
        return Err(Error::Config(format!("{key} must be greater than zero")));
    }
    Ok(value)
}
