//! Connection handler
//!
//! Runs the two loops of a connected client:
//! - the read loop pulls lines off the remote stream and enqueues them
//! - the main loop dequeues control messages and acts on them
//!
//! The main loop is the only place that writes to the remote stream or
//! changes which room the client is in, so command handling is strictly
//! sequential per client.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::ClientHandle;
use crate::error::{AppError, DequeueError};
use crate::message::{
    ClientLine, ControlMessage, Reply, NOT_IN_ROOM, NO_ROOM_TO_LEAVE, SERVER_EXITING,
};
use crate::room::Room;
use crate::state::ServerState;

/// Drive a connected client until it terminates
///
/// `handle` must already be registered in `state`. `cancel` is the
/// server's per-client cancellation; when it fires, the client behaves as if
/// it had received `ControlMessage::Stop`. Returns once both loops are done.
pub async fn handle_connection<S>(
    handle: Arc<ClientHandle>,
    stream: S,
    state: Arc<ServerState>,
    cancel: CancellationToken,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let _guard = TerminationGuard {
        handle: Arc::clone(&handle),
        state: Arc::clone(&state),
    };

    let (reader, writer) = tokio::io::split(stream);

    let reader_stop = CancellationToken::new();
    let read_task = tokio::spawn(read_loop(
        Arc::clone(&handle),
        reader,
        reader_stop.clone(),
    ));

    let mut session = Session {
        handle: Arc::clone(&handle),
        state,
        writer,
        current_room: None,
    };

    session.main_loop(&cancel).await;

    // Teardown: leave the room, close the stream, and join the read loop.
    session.leave_current_room();
    if let Err(e) = session.writer.shutdown().await {
        debug!("Closing stream for {} failed: {}", handle.name(), e);
    }
    reader_stop.cancel();
    if let Err(e) = read_task.await {
        error!("Read loop for {} failed: {}", handle.name(), e);
    }

    info!("Client {} terminated", handle.name());
}

/// Releases the client's slot and signals termination, on every exit path
struct TerminationGuard {
    handle: Arc<ClientHandle>,
    state: Arc<ServerState>,
}

impl Drop for TerminationGuard {
    fn drop(&mut self) {
        self.handle.set_exiting();
        self.state.remove(&self.handle);
        self.handle.mark_terminated();
    }
}

/// Read lines from the remote stream into the client's queue
async fn read_loop<R>(handle: Arc<ClientHandle>, reader: R, stop: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while !handle.is_exiting() {
        tokio::select! {
            () = stop.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    debug!("Line from {}: {}", handle.name(), line);
                    handle.queue().enqueue(ControlMessage::RemoteLine(line));
                }
                Ok(None) => {
                    debug!("Client {} closed its stream", handle.name());
                    break;
                }
                Err(e) => {
                    if !handle.is_exiting() {
                        warn!("Read error for {}: {}", handle.name(), e);
                    }
                    break;
                }
            }
        }
    }

    if !handle.is_exiting() {
        handle.queue().enqueue(ControlMessage::RemoteClosed);
    }
    debug!("Read loop ended for {}", handle.name());
}

/// State owned by a client's main loop
struct Session<W> {
    handle: Arc<ClientHandle>,
    state: Arc<ServerState>,
    writer: W,
    /// Only ever changed by the main loop
    current_room: Option<Arc<Room>>,
}

impl<W> Session<W>
where
    W: AsyncWrite + Unpin,
{
    async fn main_loop(&mut self, cancel: &CancellationToken) {
        debug!("Main loop started for {}", self.handle.name());

        while !self.handle.is_exiting() {
            let message = match self.handle.queue().dequeue(cancel).await {
                Ok(message) => message,
                Err(DequeueError::Cancelled) => {
                    debug!("Dequeue cancelled for {}, stopping", self.handle.name());
                    ControlMessage::Stop
                }
                Err(e) => {
                    error!(
                        "Dequeue failed for {}: {}, ending connection",
                        self.handle.name(),
                        e
                    );
                    self.handle.set_exiting();
                    break;
                }
            };

            if let Err(e) = self.dispatch(message).await {
                error!(
                    "Unexpected error handling message for {}: {}, ending connection",
                    self.handle.name(),
                    e
                );
                self.handle.set_exiting();
            }
        }

        debug!("Main loop ended for {}", self.handle.name());
    }

    async fn dispatch(&mut self, message: ControlMessage) -> Result<(), AppError> {
        match message {
            ControlMessage::RoomBroadcast { text, source_room } => {
                // Drop messages from a room the client left after they were posted.
                let in_source_room = self
                    .current_room
                    .as_ref()
                    .is_some_and(|room| room.name() == source_room);
                if in_source_room {
                    self.write_line(&text).await?;
                } else {
                    debug!(
                        "Dropping stale message from {} for {}",
                        source_room,
                        self.handle.name()
                    );
                }
                Ok(())
            }
            ControlMessage::RemoteLine(line) => self.execute(ClientLine::parse(&line)).await,
            ControlMessage::RemoteClosed => self.exit(None).await,
            ControlMessage::Stop => self.exit(Some(Reply::error(SERVER_EXITING))).await,
        }
    }

    async fn execute(&mut self, line: ClientLine) -> Result<(), AppError> {
        match line {
            ClientLine::Invalid(reason) => self.write_reply(Reply::Error(reason)).await,
            ClientLine::Message(text) => self.post_message(&text).await,
            ClientLine::EnterRoom(name) => self.enter_room(&name).await,
            ClientLine::LeaveRoom => self.leave_room().await,
            ClientLine::Exit => self.exit(Some(Reply::Ok)).await,
        }
    }

    async fn post_message(&mut self, text: &str) -> Result<(), AppError> {
        if let Some(room) = &self.current_room {
            room.post(&self.handle, text);
            return Ok(());
        }
        self.write_reply(Reply::error(NOT_IN_ROOM)).await
    }

    async fn enter_room(&mut self, name: &str) -> Result<(), AppError> {
        self.leave_current_room();

        let room = self.state.rooms.get_or_create(name);
        room.enter(&self.handle);
        info!("Client {} entered room {}", self.handle.name(), name);
        self.current_room = Some(room);

        self.write_reply(Reply::Ok).await
    }

    async fn leave_room(&mut self) -> Result<(), AppError> {
        if self.current_room.is_none() {
            return self.write_reply(Reply::error(NO_ROOM_TO_LEAVE)).await;
        }

        self.leave_current_room();
        self.write_reply(Reply::Ok).await
    }

    /// Leave the room, acknowledge, then deregister; the main loop ends
    /// after this message.
    async fn exit(&mut self, reply: Option<Reply>) -> Result<(), AppError> {
        self.leave_current_room();
        self.handle.set_exiting();

        let written = match reply {
            Some(reply) => self.write_reply(reply).await,
            None => Ok(()),
        };
        self.state.remove(&self.handle);
        written
    }

    fn leave_current_room(&mut self) {
        if let Some(room) = self.current_room.take() {
            room.leave(&self.handle);
            info!("Client {} left room {}", self.handle.name(), room.name());
            self.state.rooms.remove_if_empty(room.name());
        }
    }

    async fn write_reply(&mut self, reply: Reply) -> Result<(), AppError> {
        self.write_line(&reply.to_string()).await
    }

    async fn write_line(&mut self, line: &str) -> Result<(), AppError> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}
