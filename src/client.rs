//! Connected client handle
//!
//! The part of a connected client that other tasks may touch: rooms push
//! broadcasts into its queue and the server asks it to stop. Everything here
//! only enqueues or reads atomics; socket I/O and room membership belong to
//! the client's own main loop (see `handler`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::message::ControlMessage;
use crate::queue::MessageQueue;
use crate::types::ClientName;

/// Shared handle to a connected client
#[derive(Debug)]
pub struct ClientHandle {
    /// Stable identity, unique per server
    name: ClientName,
    /// Control messages for the main loop
    queue: MessageQueue<ControlMessage>,
    /// Set once the client starts terminating
    exiting: AtomicBool,
    /// Flips to true once both loops have finished
    terminated: watch::Sender<bool>,
}

impl ClientHandle {
    /// Create a handle for a client that has not started its loops yet
    pub fn new(name: ClientName) -> Arc<Self> {
        let (terminated, _) = watch::channel(false);
        Arc::new(Self {
            name,
            queue: MessageQueue::new(),
            exiting: AtomicBool::new(false),
            terminated,
        })
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Deliver a message posted in `source_room`
    ///
    /// Safe to call from any task. The message is dropped at delivery time if
    /// the client has left that room by then.
    pub fn post_room_message(&self, text: String, source_room: &str) {
        self.queue.enqueue(ControlMessage::RoomBroadcast {
            text,
            source_room: source_room.to_string(),
        });
    }

    /// Ask the client to terminate (server-initiated)
    pub fn request_exit(&self) {
        self.queue.enqueue(ControlMessage::Stop);
    }

    /// Wait until both of the client's loops have finished
    pub async fn await_termination(&self) {
        let mut terminated = self.terminated.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = terminated.wait_for(|done| *done).await;
    }

    pub fn is_exiting(&self) -> bool {
        self.exiting.load(Ordering::SeqCst)
    }

    pub fn is_terminated(&self) -> bool {
        *self.terminated.borrow()
    }

    pub(crate) fn set_exiting(&self) {
        self.exiting.store(true, Ordering::SeqCst);
    }

    pub(crate) fn mark_terminated(&self) {
        self.terminated.send_replace(true);
    }

    pub(crate) fn queue(&self) -> &MessageQueue<ControlMessage> {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_post_room_message_enqueues_broadcast() {
        let client = ClientHandle::new(ClientName::from("client-0"));
        client.post_room_message("hi".to_string(), "room");

        let message = client.queue().dequeue(&CancellationToken::new()).await;
        assert_eq!(
            message,
            Ok(ControlMessage::RoomBroadcast {
                text: "hi".to_string(),
                source_room: "room".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_request_exit_enqueues_stop() {
        let client = ClientHandle::new(ClientName::from("client-0"));
        assert!(!client.is_exiting());

        client.request_exit();
        let message = client.queue().dequeue(&CancellationToken::new()).await;
        assert_eq!(message, Ok(ControlMessage::Stop));
    }

    #[tokio::test]
    async fn test_await_termination() {
        let client = ClientHandle::new(ClientName::from("client-0"));

        let waiter = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.await_termination().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        client.mark_terminated();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("termination should be observed")
            .unwrap();

        // Late waiters return immediately
        assert!(client.is_terminated());
        tokio::time::timeout(Duration::from_millis(100), client.await_termination())
            .await
            .unwrap();
    }
}
