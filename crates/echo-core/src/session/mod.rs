//! Session lifecycle and per-session event rooms.

pub mod coordinator;
pub mod rooms;

pub use coordinator::SessionCoordinator;
pub use rooms::{ConnectionId, RoomEvent, SessionRooms};
