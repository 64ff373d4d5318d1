//! Room registry: name → room, auto-created on first join, auto-removed
//! once empty. Each room owns its own lock for membership and counters so
//! that fan-out to members never needs the registry lock. Lock order is
//! always registry → room, never the reverse.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::session::Session;

pub const MAX_ROOM_NAME: usize = 32;
pub const MAX_MEMBERS_PER_ROOM: usize = 15;

pub struct Room {
    pub name: String,
    pub created_at: Instant,
    inner: Mutex<RoomInner>,
}

struct RoomInner {
    members: Vec<Arc<Session>>,
    broadcast_count: u64,
    last_activity: Instant,
}

pub enum JoinOutcome {
    Joined { member_count: usize, others: Vec<Arc<Session>> },
    Full { capacity: usize, member_count: usize },
}

impl Room {
    fn new(name: String) -> Self {
        let now = Instant::now();
        Self {
            name,
            created_at: now,
            inner: Mutex::new(RoomInner {
                members: Vec::with_capacity(MAX_MEMBERS_PER_ROOM),
                broadcast_count: 0,
                last_activity: now,
            }),
        }
    }

    /// Adds `session` to this room if there is capacity. On success
    /// returns the new member count and a snapshot of the *other*
    /// members to notify, taken in the same critical section as the
    /// insert so the count and the notified set never disagree.
    pub fn join(&self, session: Arc<Session>) -> JoinOutcome {
        let mut inner = self.inner.lock();
        if inner.members.len() >= MAX_MEMBERS_PER_ROOM {
            return JoinOutcome::Full {
                capacity: MAX_MEMBERS_PER_ROOM,
                member_count: inner.members.len(),
            };
        }
        let others = inner.members.clone();
        inner.members.push(session);
        inner.last_activity = Instant::now();
        JoinOutcome::Joined {
            member_count: inner.members.len(),
            others,
        }
    }

    /// Removes `username` from this room. Returns the remaining members
    /// (snapshot taken under the same lock as the removal) and whether
    /// the room is now empty.
    pub fn leave(&self, username: &str) -> Option<(Vec<Arc<Session>>, bool)> {
        let mut inner = self.inner.lock();
        let before = inner.members.len();
        inner.members.retain(|m| m.username != username);
        if inner.members.len() == before {
            return None;
        }
        inner.last_activity = Instant::now();
        let empty = inner.members.is_empty();
        Some((inner.members.clone(), empty))
    }

    /// Snapshot of every member except `exclude`, for broadcast fan-out.
    /// Also records the broadcast and returns the total member count so
    /// callers can report delivered/total without re-locking.
    pub fn broadcast_targets(&self, exclude: &str) -> (Vec<Arc<Session>>, usize) {
        let mut inner = self.inner.lock();
        inner.broadcast_count += 1;
        inner.last_activity = Instant::now();
        let total = inner.members.len();
        let targets = inner
            .members
            .iter()
            .filter(|m| m.username != exclude)
            .cloned()
            .collect();
        (targets, total)
    }

    pub fn member_count(&self) -> usize {
        self.inner.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.member_count() == 0
    }
}

#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, name: &str) -> Arc<Room> {
        let mut rooms = self.rooms.lock();
        rooms
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Room::new(name.to_string())))
            .clone()
    }

    pub fn find(&self, name: &str) -> Option<Arc<Room>> {
        self.rooms.lock().get(name).cloned()
    }

    /// Removes the room if it is currently empty. Safe to call
    /// speculatively; does nothing if membership changed concurrently.
    pub fn remove_if_empty(&self, name: &str) {
        let mut rooms = self.rooms.lock();
        if let Some(room) = rooms.get(name) {
            if room.is_empty() {
                rooms.remove(name);
            }
        }
    }

    pub fn count(&self) -> usize {
        self.rooms.lock().len()
    }
}

pub fn is_valid_room_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_ROOM_NAME
        && name.chars().all(|c| c.is_ascii_alphanumeric())
}
