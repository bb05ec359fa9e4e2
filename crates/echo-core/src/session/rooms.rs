//! Per-session broadcast rooms for the event channel.
//!
//! Each session id with at least one subscribed connection has a
//! `tokio::sync::broadcast` channel. Publishing to a room with no
//! subscribers is a no-op.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::broadcast;

use echo_types::event::ServerEvent;

/// Identifies one event-channel connection within the process.
pub type ConnectionId = u64;

/// An event published to a room, tagged with the publishing connection so
/// it can skip its own echo.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    pub from: Option<ConnectionId>,
    pub event: ServerEvent,
}

/// Registry of session rooms.
pub struct SessionRooms {
    rooms: DashMap<String, broadcast::Sender<RoomEvent>>,
    capacity: usize,
    next_connection: AtomicU64,
}

impl SessionRooms {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity,
            next_connection: AtomicU64::new(1),
        }
    }

    /// Allocate an id for a new connection.
    pub fn connection_id(&self) -> ConnectionId {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    /// Subscribe to `session_id`, creating the room if needed.
    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<RoomEvent> {
        self.rooms
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish to every subscriber of `session_id`. Returns how many
    /// subscribers were reached.
    pub fn publish(&self, session_id: &str, from: Option<ConnectionId>, event: ServerEvent) -> usize {
        match self.rooms.get(session_id) {
            Some(room) => room.send(RoomEvent { from, event }).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop the room if nobody is subscribed any more.
    pub fn prune(&self, session_id: &str) {
        self.rooms
            .remove_if(session_id, |_, room| room.receiver_count() == 0);
    }

    /// Tell every member the session ended and close the room.
    ///
    /// Subscribers drain what was already sent, then see the channel close.
    pub fn close(&self, session_id: &str) {
        if let Some((_, room)) = self.rooms.remove(session_id) {
            let _ = room.send(RoomEvent {
                from: None,
                event: ServerEvent::SessionEnded {
                    session_id: session_id.to_string(),
                },
            });
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn member_count(&self, session_id: &str) -> usize {
        self.rooms
            .get(session_id)
            .map(|room| room.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for SessionRooms {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for SessionRooms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRooms")
            .field("rooms", &self.rooms.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(text: &str) -> ServerEvent {
        ServerEvent::PeerMessage {
            session_id: "s1".to_string(),
            message_id: "m1".to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn members_receive_published_events() {
        let rooms = SessionRooms::new(16);
        let mut a = rooms.subscribe("s1");
        let mut b = rooms.subscribe("s1");

        let reached = rooms.publish("s1", Some(7), peer("hi"));

        assert_eq!(reached, 2);
        assert_eq!(a.recv().await.unwrap().from, Some(7));
        assert_eq!(b.recv().await.unwrap().event, peer("hi"));
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let rooms = SessionRooms::new(16);
        let mut other = rooms.subscribe("s2");
        let _member = rooms.subscribe("s1");

        rooms.publish("s1", None, peer("hi"));

        assert!(matches!(
            other.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn publish_without_room_is_a_noop() {
        let rooms = SessionRooms::new(16);
        assert_eq!(rooms.publish("nobody", None, peer("hi")), 0);
        assert_eq!(rooms.room_count(), 0);
    }

    #[test]
    fn prune_removes_only_empty_rooms() {
        let rooms = SessionRooms::new(16);
        let member = rooms.subscribe("s1");
        rooms.prune("s1");
        assert_eq!(rooms.member_count("s1"), 1);

        drop(member);
        rooms.prune("s1");
        assert_eq!(rooms.room_count(), 0);
    }

    #[tokio::test]
    async fn close_notifies_then_ends_the_stream() {
        let rooms = SessionRooms::new(16);
        let mut member = rooms.subscribe("s1");

        rooms.close("s1");

        let last = member.recv().await.unwrap();
        assert!(matches!(last.event, ServerEvent::SessionEnded { .. }));
        assert!(matches!(
            member.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert_eq!(rooms.room_count(), 0);
    }

    #[test]
    fn connection_ids_are_unique() {
        let rooms = SessionRooms::default();
        let a = rooms.connection_id();
        let b = rooms.connection_id();
        assert_ne!(a, b);
    }
}
