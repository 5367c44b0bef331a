//! Room registry
//!
//! Concurrent map from room name to room, shared by every client. There is
//! no global lock: creation and removal are single atomic map operations.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::room::Room;

/// All live rooms, by name
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Arc<Room>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the room called `name`, creating it if it does not exist
    ///
    /// Concurrent callers asking for the same new name all get the same room.
    pub fn get_or_create(&self, name: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.get(name) {
            return Arc::clone(room.value());
        }

        let entry = self.rooms.entry(name.to_string()).or_insert_with(|| {
            debug!("Room {} created", name);
            Arc::new(Room::new(name))
        });
        Arc::clone(entry.value())
    }

    /// Remove the room called `name` if it has no members
    ///
    /// Returns false if there is no such room or it is not empty. A removed
    /// room is left closing, so late joiners holding it get a notice.
    pub fn remove_if_empty(&self, name: &str) -> bool {
        let removed = self
            .rooms
            .remove_if(name, |_, room| room.check_empty_and_close())
            .is_some();

        if removed {
            debug!("Room {} deleted (empty)", name);
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.get(name).map(|room| Arc::clone(room.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }

    /// Get the number of live rooms
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
