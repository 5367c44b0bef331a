//! Chat server lifecycle and accept loop
//!
//! A `Server` goes through `NotStarted -> Starting -> Started -> Ending ->
//! Ended`, once. While started, a single accept loop admits connections as
//! long as a client slot is free, and every accepted connection gets its own
//! client task. Stopping cancels every client, closes the listener, and the
//! accept loop only reports `Ended` after every client task has finished.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::{oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::ClientHandle;
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handler::handle_connection;
use crate::registry::RoomRegistry;
use crate::state::ServerState;
use crate::types::{ClientName, ServerStatus};

/// The chat server
pub struct Server {
    config: ServerConfig,
    state: Arc<ServerState>,
    /// Published so that any number of `join` callers can wait for `Ended`
    status: Arc<watch::Sender<ServerStatus>>,
    /// Releases the accept loop's semaphore and accept waits; parent of
    /// every client token
    shutdown: CancellationToken,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Create a server that has not started yet
    pub fn new(config: ServerConfig) -> Self {
        let state = Arc::new(ServerState::new(config.max_clients));
        Self {
            config,
            state,
            status: Arc::new(watch::Sender::new(ServerStatus::NotStarted)),
            shutdown: CancellationToken::new(),
            accept_task: Mutex::new(None),
        }
    }

    pub fn status(&self) -> ServerStatus {
        *self.status.borrow()
    }

    /// Number of clients currently holding a slot
    pub fn active_clients(&self) -> usize {
        self.state.active_clients()
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.state.rooms
    }

    /// Bind to `addr` and start accepting clients
    ///
    /// Only valid once, from `NotStarted`. Returns the bound address, which
    /// differs from `addr` when port 0 was requested. On return the server is
    /// `Started`.
    pub async fn start(&self, addr: SocketAddr) -> Result<SocketAddr, ServerError> {
        let claimed = self.status.send_if_modified(|status| {
            if *status != ServerStatus::NotStarted {
                return false;
            }
            *status = ServerStatus::Starting;
            true
        });
        if !claimed {
            return Err(ServerError::AlreadyStarted);
        }
        info!("Starting server on {}", addr);

        let (listener, local_addr) = match bind(addr, self.config.backlog) {
            Ok(bound) => bound,
            Err(e) => {
                error!("Failed to bind {}: {}", addr, e);
                self.status.send_replace(ServerStatus::Ended);
                return Err(e.into());
            }
        };

        let (ready_tx, ready_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.state),
            Arc::clone(&self.status),
            self.shutdown.clone(),
            ready_tx,
        ));
        *self.accept_task.lock() = Some(task);

        if ready_rx.await.is_err() {
            warn!("Accept loop ended before it was ready");
        }

        info!("Server listening on {}", local_addr);
        Ok(local_addr)
    }

    /// Stop accepting clients and terminate every connected client
    ///
    /// Only valid from `Started`. Returns immediately; use `join` to wait
    /// for the shutdown to complete.
    pub fn stop(&self) -> Result<(), ServerError> {
        let mut previous = ServerStatus::Started;
        let stopping = self.status.send_if_modified(|status| {
            if *status != ServerStatus::Started {
                previous = *status;
                return false;
            }
            *status = ServerStatus::Ending;
            true
        });
        if !stopping {
            error!("Cannot stop server while {}", previous);
            return Err(ServerError::NotRunning(previous));
        }

        info!("Stopping server");
        self.state.cancel_all();
        self.shutdown.cancel();
        Ok(())
    }

    /// Wait for the accept loop, and with it every client, to finish
    ///
    /// Any number of callers may join concurrently; each returns once the
    /// server is `Ended`.
    pub async fn join(&self) -> Result<(), ServerError> {
        let mut status = self.status.subscribe();
        let current = *status.borrow_and_update();
        if current == ServerStatus::NotStarted {
            return Err(ServerError::NotRunning(current));
        }

        // One caller drives the task so a panic in the accept loop still ends the server.
        let task = self.accept_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Accept loop failed: {}", e);
                self.status.send_replace(ServerStatus::Ended);
            }
        }

        // The sender lives in `self`, so this only returns once `Ended` is published.
        let _ = status.wait_for(|status| *status == ServerStatus::Ended).await;
        Ok(())
    }
}

/// Create the listening socket with the configured pending-connection backlog
fn bind(addr: SocketAddr, backlog: u32) -> std::io::Result<(TcpListener, SocketAddr)> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(backlog)?;
    let local_addr = listener.local_addr()?;
    Ok((listener, local_addr))
}

async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    status: Arc<watch::Sender<ServerStatus>>,
    shutdown: CancellationToken,
    ready: oneshot::Sender<()>,
) {
    info!("Accept loop started");
    status.send_replace(ServerStatus::Started);
    let _ = ready.send(());

    let slots = state.slots();
    let mut clients = JoinSet::new();
    let mut next_id: u64 = 0;

    while *status.borrow() == ServerStatus::Started {
        // Reap clients that already finished
        while let Some(result) = clients.try_join_next() {
            if let Err(e) = result {
                error!("Client task failed: {}", e);
            }
        }

        debug!(
            "Server has {} active clients and room for {} more",
            state.active_clients(),
            slots.available_permits()
        );

        let permit = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            permit = Arc::clone(&slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Client slots closed: {}", e);
                    break;
                }
            },
        };

        debug!("Waiting for client");
        let accepted = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                }

                let name = ClientName::numbered(next_id);
                next_id += 1;
                info!("New client {} accepted from {}", name, peer);

                let cancel = shutdown.child_token();
                let handle = ClientHandle::new(name);
                state.register(Arc::clone(&handle), cancel.clone());
                // The slot now belongs to the client and comes back through ServerState::remove.
                permit.forget();

                clients.spawn(handle_connection(
                    handle,
                    stream,
                    Arc::clone(&state),
                    cancel,
                ));
            }
            Err(e) => {
                // Transient accept failure; the permit goes back with `permit`.
                warn!("Failed to accept connection: {}", e);
            }
        }
    }

    drop(listener);
    info!("Listener closed, waiting for clients to end");

    for client in state.registered() {
        client.request_exit();
    }
    while let Some(result) = clients.join_next().await {
        if let Err(e) = result {
            error!("Client task failed: {}", e);
        }
    }

    status.send_replace(ServerStatus::Ended);
    info!("Accept loop ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let server = Server::new(ServerConfig::default());
        assert_eq!(server.status(), ServerStatus::NotStarted);

        let addr = server.start(local()).await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.status(), ServerStatus::Started);

        server.stop().unwrap();
        assert_eq!(server.status(), ServerStatus::Ending);

        server.join().await.unwrap();
        assert_eq!(server.status(), ServerStatus::Ended);
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let server = Server::new(ServerConfig::default());
        server.start(local()).await.unwrap();

        assert!(matches!(
            server.start(local()).await,
            Err(ServerError::AlreadyStarted)
        ));

        server.stop().unwrap();
        server.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_and_join_before_start_fail() {
        let server = Server::new(ServerConfig::default());

        assert!(matches!(
            server.stop(),
            Err(ServerError::NotRunning(ServerStatus::NotStarted))
        ));
        assert!(matches!(
            server.join().await,
            Err(ServerError::NotRunning(ServerStatus::NotStarted))
        ));
    }

    #[tokio::test]
    async fn test_stop_twice_fails() {
        let server = Server::new(ServerConfig::default());
        server.start(local()).await.unwrap();
        server.stop().unwrap();

        assert!(matches!(server.stop(), Err(ServerError::NotRunning(_))));

        server.join().await.unwrap();
        // Joining again after Ended returns immediately
        server.join().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_joins_wait_for_end() {
        let server = Arc::new(Server::new(ServerConfig::default()));
        server.start(local()).await.unwrap();

        let joiners: Vec<_> = (0..3)
            .map(|_| {
                let server = Arc::clone(&server);
                tokio::spawn(async move {
                    server.join().await.unwrap();
                    server.status()
                })
            })
            .collect();
        tokio::task::yield_now().await;

        server.stop().unwrap();
        server.join().await.unwrap();
        assert_eq!(server.status(), ServerStatus::Ended);

        for joiner in joiners {
            assert_eq!(joiner.await.unwrap(), ServerStatus::Ended);
        }
    }

    #[tokio::test]
    async fn test_join_after_bind_failure() {
        let taken = std::net::TcpListener::bind(local()).unwrap();
        let busy = taken.local_addr().unwrap();

        let server = Server::new(ServerConfig::default());
        assert!(matches!(server.start(busy).await, Err(ServerError::Io(_))));
        assert_eq!(server.status(), ServerStatus::Ended);
        server.join().await.unwrap();
    }
}
