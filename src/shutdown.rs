//! Shutdown coordination.
//!
//! [`Shutdown`] is a latched, single-fire notification carrying the process
//! lifecycle state. The acceptance loop stops when it leaves `Running`, and
//! the coordinator marks it `Terminated` once every handler has finished.
//!
//! OS signals are bridged onto it by [`SignalListener`], so everything below
//! `main` can be driven without delivering real signals.

use crate::error::ServerError;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Process lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Running,
    ShuttingDown,
    Terminated,
}

/// Cloneable handle to the shared lifecycle state.
#[derive(Debug, Clone)]
pub struct Shutdown {
    state: Arc<watch::Sender<ServerState>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ServerState::Running);
        Self {
            state: Arc::new(state),
        }
    }

    /// Request shutdown. Returns `true` only for the call that moved the
    /// state out of `Running`; later calls are no-ops.
    pub fn trigger(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ServerState::Running {
                *state = ServerState::ShuttingDown;
                true
            } else {
                false
            }
        })
    }

    /// Mark shutdown complete.
    pub fn complete(&self) {
        self.state.send_replace(ServerState::Terminated);
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Resolve once shutdown has been requested, immediately if it already was.
    pub async fn triggered(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state != ServerState::Running).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Which signal started the shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Interrupt => write!(f, "SIGINT"),
            Signal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Interrupt and termination handlers, registered eagerly so no signal is
/// lost between startup and the first `recv`.
#[cfg(unix)]
pub struct SignalListener {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    /// Install the handlers. Must be called from within the runtime.
    pub fn register() -> Result<Self, ServerError> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).map_err(ServerError::Signal)?,
            terminate: signal(SignalKind::terminate()).map_err(ServerError::Signal)?,
        })
    }

    /// Wait for the first interrupt or termination signal.
    pub async fn recv(mut self) -> Signal {
        tokio::select! {
            _ = self.interrupt.recv() => Signal::Interrupt,
            _ = self.terminate.recv() => Signal::Terminate,
        }
    }
}

#[cfg(not(unix))]
pub struct SignalListener;

#[cfg(not(unix))]
impl SignalListener {
    pub fn register() -> Result<Self, ServerError> {
        Ok(Self)
    }

    pub async fn recv(self) -> Signal {
        // Only Ctrl-C is observable here; a failed registration never fires.
        match tokio::signal::ctrl_c().await {
            Ok(()) => Signal::Interrupt,
            Err(_) => std::future::pending().await,
        }
    }
}

/// Bridge OS signals onto `shutdown`. Reacts to exactly one signal.
pub async fn forward_signals(signals: SignalListener, shutdown: Shutdown) {
    let signal = signals.recv().await;
    tracing::info!(%signal, "Received shutdown signal");
    shutdown.trigger();
}
