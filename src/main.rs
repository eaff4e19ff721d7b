mod clipboard;
mod config;
mod error;
mod relay;
mod service;
mod supervisor;
mod transport;
mod wire;

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::{
    clipboard::Backend,
    config::{Config, Role},
    error::{Error, Result},
    service::Service,
    supervisor::{RestartPolicy, Supervisor},
};

const DEFAULT_LOG_FILTER: &str = "clipbridge=info";

#[derive(Parser)]
#[command(name = "clipbridge", version)]
#[command(about = "Relay clipboard text between a virtual machine host and guest")]
struct Cli {
    #[command(flatten)]
    globals: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// JSON config file [default: <config dir>/clipbridge/config.json]
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Clipboard backend [default: poll on the host, watch in the guest]
    #[arg(long, global = true, value_enum)]
    clipboard: Option<Backend>,
    /// Write logs to FILE instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run on the VM host against the hypervisor's chardev socket
    Host {
        /// Unix socket path
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
        /// Named pipe (Windows hosts)
        #[arg(long, value_name = "NAME")]
        pipe: Option<String>,
        /// Connect to the socket instead of listening on it
        #[arg(long)]
        dial: bool,
        /// Keep serving after a session ends
        #[arg(long)]
        persistent: bool,
    },
    /// Run inside the guest against the virtio serial port
    Guest {
        /// Virtio serial port path
        #[arg(long, value_name = "PATH")]
        device: Option<PathBuf>,
        /// Reopen the port after a session ends or while it is unavailable
        #[arg(long)]
        retry: bool,
        /// Run as a service: persistent, stopped through control requests
        #[arg(long)]
        service: bool,
    },
    /// Print shell completions
    #[command(hide = true)]
    Completion { shell: Shell },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let Cli { globals, command } = cli;

    let (role, mut config) = match &command {
        Commands::Completion { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "clipbridge", &mut io::stdout());
            return Ok(());
        }
        Commands::Host { .. } => (Role::Host, Config::load(globals.config.as_deref())?),
        Commands::Guest { .. } => (Role::Guest, Config::load(globals.config.as_deref())?),
    };
    if globals.clipboard.is_some() {
        config.clipboard = globals.clipboard;
    }
    init_tracing(config.log_filter.as_deref(), globals.log_file.as_deref())?;

    let shutdown = CancellationToken::new();
    match command {
        Commands::Host {
            socket,
            pipe,
            dial,
            persistent,
        } => {
            if let Some(socket) = socket {
                config.socket = socket;
            }
            if let Some(pipe) = pipe {
                config.pipe = pipe;
            }
            let policy = if persistent {
                RestartPolicy::Persistent
            } else {
                RestartPolicy::Once
            };
            let supervisor = build_supervisor(&config, role, policy, &shutdown)?;
            service::cancel_on_stop(service::platform_controls(), shutdown);

            let endpoint = config.host_endpoint();
            if dial {
                supervisor.dial(&endpoint).await
            } else {
                supervisor.listen(&endpoint).await
            }
        }
        Commands::Guest {
            device,
            retry,
            service: hosted,
        } => {
            if let Some(device) = device {
                config.device = device;
            }
            let policy = if retry || hosted {
                RestartPolicy::Persistent
            } else {
                RestartPolicy::Once
            };
            let supervisor = build_supervisor(&config, role, policy, &shutdown)?;
            let endpoint = config.guest_endpoint();

            if hosted {
                let controls = service::platform_controls();
                let dial = async move { supervisor.dial(&endpoint).await };
                Service::new(config.stop_timeout)
                    .run(controls, shutdown, dial)
                    .await
            } else {
                service::cancel_on_stop(service::platform_controls(), shutdown);
                supervisor.dial(&endpoint).await
            }
        }
        Commands::Completion { .. } => Ok(()),
    }
}

/// The clipboard is opened here, once, before any session exists.
fn build_supervisor(
    config: &Config,
    role: Role,
    policy: RestartPolicy,
    shutdown: &CancellationToken,
) -> Result<Supervisor> {
    let clipboard = clipboard::open(config.backend_for(role), config.poll_interval)?;
    Ok(Supervisor::new(clipboard, shutdown.clone())
        .policy(policy)
        .retry_delay(config.retry_delay)
        .relay(config.relay()))
}

fn init_tracing(filter: Option<&str>, log_file: Option<&Path>) -> Result<()> {
    let directive = filter.unwrap_or(DEFAULT_LOG_FILTER);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .map_err(|e| Error::Config(format!("invalid log filter {directive:?}: {e}")))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match log_file {
        Some(path) => {
            let file = File::create(path).map_err(|e| {
                Error::Config(format!("cannot create log file {}: {e}", path.display()))
            })?;
            builder.with_writer(file).with_ansi(false).init();
        }
        None => builder.with_writer(io::stderr).init(),
    }
    Ok(())
}
