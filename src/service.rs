//! Service-hosted role and process control.
//!
//! A [`Service`] wraps a role future in the `StartPending -> Running ->
//! StopPending -> Stopped` state machine and reacts to [`ControlRequest`]s.
//! Requests come from the platform: SIGINT/SIGTERM on Unix, console control
//! events on Windows. SIGUSR1 (Ctrl+Break on Windows) interrogates the service
//! and logs the reported state.

use std::{fmt, future::Future, io, result::Result as StdResult, time::Duration};

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinError,
    time::timeout,
};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    StartPending,
    Running,
    StopPending,
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StartPending => "start pending",
            Self::Running => "running",
            Self::StopPending => "stop pending",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum ControlRequest {
    /// Report the current state.
    Interrogate(oneshot::Sender<ServiceState>),
    Stop,
    /// The machine is going down.
    Shutdown,
}

pub struct Service {
    status: watch::Sender<ServiceState>,
    stop_timeout: Duration,
}

impl Service {
    pub fn new(stop_timeout: Duration) -> Self {
        let (status, _) = watch::channel(ServiceState::StartPending);
        Self {
            status,
            stop_timeout,
        }
    }

    #[cfg(test)]
    pub fn status(&self) -> watch::Receiver<ServiceState> {
        self.status.subscribe()
    }

    fn state(&self) -> ServiceState {
        *self.status.borrow()
    }

    fn set(&self, state: ServiceState) {
        tracing::info!("Service {state}");
        self.status.send_replace(state);
    }

    /// Run `role` until it finishes or a stop request arrives.
    ///
    /// `shutdown` must be the token `role` observes. On stop it is cancelled
    /// and the role gets `stop_timeout` to wind down before it is aborted.
    pub async fn run<F>(
        &self,
        mut controls: mpsc::Receiver<ControlRequest>,
        shutdown: CancellationToken,
        role: F,
    ) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.set(ServiceState::StartPending);
        let mut role = tokio::spawn(role);
        self.set(ServiceState::Running);

        let mut controls_open = true;
        let request = loop {
            tokio::select! {
                finished = &mut role => {
                    self.set(ServiceState::Stopped);
                    return joined(finished);
                }
                request = controls.recv(), if controls_open => match request {
                    Some(ControlRequest::Interrogate(reply)) => {
                        let _ = reply.send(self.state());
                    }
                    Some(request) => break request,
                    None => controls_open = false,
                },
            }
        };

        tracing::info!("Service control: {request:?}");
        self.set(ServiceState::StopPending);
        shutdown.cancel();

        let result = if let Ok(finished) = timeout(self.stop_timeout, &mut role).await {
            joined(finished)
        } else {
            tracing::warn!("Role did not stop within {:?}, aborting", self.stop_timeout);
            role.abort();
            Ok(())
        };
        self.set(ServiceState::Stopped);
        result
    }
}

fn joined(finished: StdResult<Result<()>, JoinError>) -> Result<()> {
    finished.map_err(|e| Error::Io(io::Error::other(format!("role task aborted: {e}"))))?
}

/// Stream of control requests raised by the platform.
pub fn platform_controls() -> mpsc::Receiver<ControlRequest> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        if let Err(e) = forward_signals(&tx).await {
            tracing::error!("Failed to install signal handlers: {e}");
        }
    });
    rx
}

/// Cancel `token` on the first stop request. Used when not service-hosted.
pub fn cancel_on_stop(mut controls: mpsc::Receiver<ControlRequest>, token: CancellationToken) {
    tokio::spawn(async move {
        while let Some(request) = controls.recv().await {
            if let ControlRequest::Interrogate(reply) = request {
                let _ = reply.send(ServiceState::Running);
                continue;
            }
            tracing::info!("Stopping: {request:?}");
            token.cancel();
            break;
        }
    });
}

/// An `Interrogate` request whose answer is logged once it arrives.
fn interrogation() -> ControlRequest {
    let (reply, state) = oneshot::channel();
    tokio::spawn(async move {
        if let Ok(state) = state.await {
            tracing::info!("Service state: {state}");
        }
    });
    ControlRequest::Interrogate(reply)
}

#[cfg(unix)]
async fn forward_signals(tx: &mpsc::Sender<ControlRequest>) -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut query = signal(SignalKind::user_defined1())?;
    loop {
        let request = tokio::select! {
            _ = interrupt.recv() => ControlRequest::Stop,
            _ = terminate.recv() => ControlRequest::Shutdown,
            _ = query.recv() => interrogation(),
        };
        if tx.send(request).await.is_err() {
            return Ok(());
        }
    }
}

#[cfg(windows)]
async fn forward_signals(tx: &mpsc::Sender<ControlRequest>) -> io::Result<()> {
    use tokio::signal::windows::{ctrl_break, ctrl_c, ctrl_close, ctrl_shutdown};

    let mut interrupt = ctrl_c()?;
    let mut close = ctrl_close()?;
    let mut shutdown = ctrl_shutdown()?;
    let mut query = ctrl_break()?;
    loop {
        let request = tokio::select! {
            _ = interrupt.recv() => ControlRequest::Stop,
            _ = close.recv() => ControlRequest::Stop,
            _ = shutdown.recv() => ControlRequest::Shutdown,
            _ = query.recv() => interrogation(),
        };
        if tx.send(request).await.is_err() {
            return Ok(());
        }
    }
}
