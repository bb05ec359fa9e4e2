//! Event-channel frames exchanged over the WebSocket connection.
//!
//! Every frame is a JSON object tagged by `type`; field names are camelCase
//! to match the browser client.

use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;

/// Frame sent by a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Subscribe this connection to a session room.
    Join { session_id: String },
    /// A chat message to relay to the room and analyze.
    Message {
        session_id: String,
        text: String,
        /// Client correlation id; generated by the server when absent.
        #[serde(default)]
        message_id: Option<String>,
    },
    /// Unsubscribe from a session room.
    Leave { session_id: String },
    /// End the session for everyone.
    End { session_id: String },
    Ping,
}

/// Frame sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    Joined {
        session_id: String,
        /// Whether a started session record exists for this id.
        session_known: bool,
    },
    Left { session_id: String },
    SessionEnded { session_id: String },
    /// A message from another member of the room.
    PeerMessage {
        session_id: String,
        message_id: String,
        text: String,
    },
    /// Exactly one per inbound `message`, correlated by `message_id`.
    AnalysisResult {
        session_id: String,
        message_id: String,
        cached: bool,
        result: AnalysisResult,
    },
    Error { message: String },
    Pong,
}
