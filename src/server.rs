//! TCP echo server.
//!
//! Accepts connections, echoes every byte back to its sender, and shuts down
//! gracefully: once [`Shutdown`] is triggered the listener is closed and the
//! server waits for in-flight connections to finish on their own.

use crate::error::ServerError;
use crate::shutdown::Shutdown;
use crate::tracker::{ConnectionGuard, ConnectionTracker};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, trace, warn};

/// Read buffer size
const BUFFER_SIZE: usize = 1024;

/// Listen backlog
const BACKLOG: i32 = 1024;

/// Outcome of one accept attempt.
enum Accepted {
    Connection(TcpStream, SocketAddr),
    /// The listener was closed for shutdown.
    Closed,
}

/// Server instance
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    tracker: ConnectionTracker,
    shutdown: Shutdown,
}

impl Server {
    /// Bind the listening socket. Must be called from within the runtime.
    pub fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let bind_err = |source| ServerError::Bind { addr, source };

        let listener = create_listener(addr).map_err(bind_err)?;
        let listener = TcpListener::from_std(listener).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        Ok(Server {
            listener,
            local_addr,
            tracker: ConnectionTracker::new(),
            shutdown: Shutdown::new(),
        })
    }

    /// Address actually bound, with the real port when bound to port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the connection tracker for testing
    #[cfg(test)]
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Serve until shutdown is triggered, then drain.
    ///
    /// Returns only after the listener is closed and every connection handler
    /// has finished. There is no drain timeout: a silent peer keeps this
    /// pending until it disconnects.
    pub async fn run(self) {
        let Server {
            listener,
            local_addr,
            tracker,
            shutdown,
        } = self;

        info!(address = %local_addr, "Server listening");

        let acceptor = tokio::spawn(accept_loop(listener, tracker.clone(), shutdown.clone()));

        shutdown.triggered().await;
        info!(state = ?shutdown.state(), "Shutting down gracefully");

        // Every accepted connection is tracked before the loop exits.
        if let Err(e) = acceptor.await {
            error!(error = %e, "Accept loop failed");
        }

        let active = tracker.active();
        if active > 0 {
            info!(active, "Listener closed, waiting for connections to finish");
        }
        tracker.wait_idle().await;

        shutdown.complete();
        info!(state = ?shutdown.state(), "Shutdown complete");
    }
}

/// Accept connections until shutdown, spawning one handler per connection.
///
/// The listener is dropped, and therefore closed, when this returns.
async fn accept_loop(listener: TcpListener, tracker: ConnectionTracker, shutdown: Shutdown) {
    loop {
        match accept(&listener, &shutdown).await {
            Ok(Accepted::Connection(stream, peer)) => {
                debug!(%peer, "New connection");

                let guard = tracker.track();
                tokio::spawn(handle_connection(stream, peer, guard));
            }
            Ok(Accepted::Closed) => {
                debug!("Listener closed");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Accept failed, continuing");
            }
        }
    }
}

/// Wait for the next connection, or for the listener to be closed.
async fn accept(listener: &TcpListener, shutdown: &Shutdown) -> Result<Accepted, ServerError> {
    tokio::select! {
        biased;

        _ = shutdown.triggered() => Ok(Accepted::Closed),
        result = listener.accept() => match result {
            Ok((stream, peer)) => Ok(Accepted::Connection(stream, peer)),
            Err(e) => Err(ServerError::Accept(e)),
        },
    }
}

/// Echo one connection until the peer closes it or I/O fails.
///
/// The stream and the guard are dropped on return, closing the socket and
/// releasing the tracker slot.
async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, _guard: ConnectionGuard) {
    match echo(&mut stream).await {
        Ok(()) => info!(%peer, "Connection closed by peer"),
        Err(e) => info!(%peer, error = %e, "Connection error"),
    }
}

async fn echo(stream: &mut TcpStream) -> io::Result<()> {
    let mut buffer = [0u8; BUFFER_SIZE];

    loop {
        let n = stream.read(&mut buffer).await?;
        if n == 0 {
            return Ok(());
        }

        let data = &buffer[..n];
        trace!(bytes = n, "Read");
        info!(data = %String::from_utf8_lossy(data), "Received");

        stream.write_all(data).await?;
    }
}

/// Create a TCP listener with SO_REUSEADDR.
///
/// SO_REUSEPORT is left off so a second instance on the same address fails.
/// On Windows SO_REUSEADDR would allow that second bind, so it is skipped.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    #[cfg(not(windows))]
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    Ok(socket.into())
}
