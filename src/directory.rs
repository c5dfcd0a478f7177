//! Room directory: the list of currently joinable rooms.
//!
//! The directory is a snapshot, not a diffable set — every refresh replaces
//! it wholesale and no identity persists across refreshes. "Not yet loaded"
//! is distinct from "loaded and empty" so a UI can tell a spinner from a
//! "no rooms" notice.

use crate::protocol::RoomSummary;

/// Client-side view of the lobby room list.
#[derive(Debug, Default)]
pub struct Directory {
    rooms: Option<Vec<RoomSummary>>,
}

impl Directory {
    /// A directory that has not received any snapshot yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether at least one snapshot has arrived. An empty list counts.
    pub fn is_loaded(&self) -> bool {
        self.rooms.is_some()
    }

    /// The latest snapshot, or `None` before the first update.
    pub fn rooms(&self) -> Option<&[RoomSummary]> {
        self.rooms.as_deref()
    }

    /// Replace the directory wholesale with a fresh snapshot.
    pub fn replace(&mut self, rooms: Vec<RoomSummary>) {
        self.rooms = Some(rooms);
    }

    /// Forget everything, returning to the not-yet-loaded state.
    pub fn clear(&mut self) {
        self.rooms = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn summary(id: &str) -> RoomSummary {
        RoomSummary {
            room_id: id.into(),
            room_name: format!("room {id}"),
            host_nickname: "Ann".into(),
            player_count: 1,
        }
    }

    #[test]
    fn empty_is_distinct_from_unloaded() {
        let mut dir = Directory::new();
        assert!(!dir.is_loaded());
        assert!(dir.rooms().is_none());

        dir.replace(vec![]);
        assert!(dir.is_loaded());
        assert_eq!(dir.rooms().unwrap().len(), 0);
    }

    #[test]
    fn replace_is_wholesale() {
        let mut dir = Directory::new();
        dir.replace(vec![summary("a"), summary("b")]);
        dir.replace(vec![summary("c")]);

        let rooms = dir.rooms().unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].room_id, "c");
    }

    #[test]
    fn clear_returns_to_unloaded() {
        let mut dir = Directory::new();
        dir.replace(vec![summary("a")]);
        dir.clear();
        assert!(!dir.is_loaded());
    }
}
