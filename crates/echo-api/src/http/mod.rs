//! HTTP and WebSocket layer.
//!
//! One axum router with exact method/path routes under `/api/analysis`,
//! health and stats endpoints, and the `/ws` event channel.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod router;
