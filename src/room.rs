//! Room struct definition
//!
//! A named set of connected clients. Posting to a room enqueues a broadcast
//! into every other member's queue; a room never writes to a socket itself.
//! All operations take the room's own lock, so rooms never contend with each
//! other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::client::ClientHandle;
use crate::message::{format_broadcast, ROOM_CLOSING};

#[derive(Debug, Default)]
struct Members {
    /// Current members by client name
    clients: HashMap<String, Arc<ClientHandle>>,
    /// Set once the room was found empty; never cleared
    closing: bool,
}

/// Chat room
#[derive(Debug)]
pub struct Room {
    /// Room name, unique within a registry
    name: String,
    members: Mutex<Members>,
}

impl Room {
    /// Create an empty room
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Mutex::new(Members::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a client to the room
    ///
    /// A room that is already closing still admits the client, but first
    /// sends it a notice suggesting it wait or pick another room.
    pub fn enter(&self, client: &Arc<ClientHandle>) {
        let mut members = self.members.lock();
        if members.closing {
            debug!("Client {} entering closing room {}", client.name(), self.name);
            client.post_room_message(ROOM_CLOSING.to_string(), &self.name);
        }
        members
            .clients
            .insert(client.name().to_string(), Arc::clone(client));
    }

    /// Remove a client from the room (no-op if absent)
    pub fn leave(&self, client: &ClientHandle) {
        self.members.lock().clients.remove(client.name());
    }

    /// Broadcast `text` from `sender` to every other member
    pub fn post(&self, sender: &ClientHandle, text: &str) {
        let members = self.members.lock();
        let formatted = format_broadcast(&self.name, sender.name(), text);

        for (name, receiver) in &members.clients {
            if name != sender.name() {
                receiver.post_room_message(formatted.clone(), &self.name);
            }
        }
    }

    /// Mark the room as closing if it has no members
    ///
    /// Returns true if the room was empty. Once this returns true the room
    /// stays closing for the rest of its life.
    pub fn check_empty_and_close(&self) -> bool {
        let mut members = self.members.lock();
        if !members.clients.is_empty() {
            return false;
        }
        members.closing = true;
        true
    }

    /// Get the number of members in the room
    pub fn member_count(&self) -> usize {
        self.members.lock().clients.len()
    }

    pub fn contains(&self, client: &ClientHandle) -> bool {
        self.members.lock().clients.contains_key(client.name())
    }

    pub fn is_closing(&self) -> bool {
        self.members.lock().closing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use crate::message::ControlMessage;
    use crate::types::ClientName;

    fn client(name: &str) -> Arc<ClientHandle> {
        ClientHandle::new(ClientName::from(name))
    }

    fn broadcast(text: &str, room: &str) -> ControlMessage {
        ControlMessage::RoomBroadcast {
            text: text.to_string(),
            source_room: room.to_string(),
        }
    }

    #[test]
    fn test_room_creation() {
        let room = Room::new("lobby");
        assert_eq!(room.name(), "lobby");
        assert_eq!(room.member_count(), 0);
        assert!(!room.is_closing());
    }

    #[test]
    fn test_enter_and_leave() {
        let room = Room::new("lobby");
        let alice = client("client-0");
        let bob = client("client-1");

        room.enter(&alice);
        room.enter(&bob);
        assert_eq!(room.member_count(), 2);
        assert!(room.contains(&alice));

        room.leave(&alice);
        assert!(!room.contains(&alice));
        assert_eq!(room.member_count(), 1);

        // Leaving twice is harmless
        room.leave(&alice);
        assert_eq!(room.member_count(), 1);
    }

    #[tokio::test]
    async fn test_post_skips_sender_and_non_members() {
        let room = Room::new("room");
        let alice = client("client-0");
        let bob = client("client-1");
        let carol = client("client-2");

        room.enter(&alice);
        room.enter(&bob);

        room.post(&alice, "Hello");

        let received = bob.queue().dequeue(&CancellationToken::new()).await;
        assert_eq!(received, Ok(broadcast("[room]client-0 says 'Hello'", "room")));
        assert!(alice.queue().is_empty());
        assert!(carol.queue().is_empty());
    }

    #[tokio::test]
    async fn test_posts_arrive_in_order() {
        let room = Room::new("room");
        let alice = client("client-0");
        let bob = client("client-1");
        room.enter(&alice);
        room.enter(&bob);

        for i in 0..3 {
            room.post(&alice, &format!("msg {}", i));
        }

        let none = CancellationToken::new();
        for i in 0..3 {
            let expected = format!("[room]client-0 says 'msg {}'", i);
            assert_eq!(bob.queue().dequeue(&none).await, Ok(broadcast(&expected, "room")));
        }
    }

    #[test]
    fn test_check_empty_and_close() {
        let room = Room::new("room");
        let alice = client("client-0");

        room.enter(&alice);
        assert!(!room.check_empty_and_close());
        assert!(!room.is_closing());

        room.leave(&alice);
        assert!(room.check_empty_and_close());
        assert!(room.is_closing());
    }

    #[tokio::test]
    async fn test_enter_closing_room_warns_but_admits() {
        let room = Room::new("room");
        assert!(room.check_empty_and_close());

        let alice = client("client-0");
        room.enter(&alice);

        assert!(room.contains(&alice));
        let notice = alice.queue().dequeue(&CancellationToken::new()).await;
        assert_eq!(notice, Ok(broadcast(ROOM_CLOSING, "room")));
    }
}
