//! Span field names shared across crates.
//!
//! Usable as `tracing::info_span!` field names so request, connection and
//! analysis spans line up in exported traces.

/// Name of the span wrapping one event-channel connection.
pub const WS_CONNECTION_SPAN: &str = "ws.connection";

/// Process-local id of an event-channel connection.
pub const CONNECTION_ID: &str = "echo.connection.id";

/// Chat session the operation belongs to.
pub const SESSION_ID: &str = "echo.session.id";

/// Client correlation id of one chat message.
pub const MESSAGE_ID: &str = "echo.message.id";

/// Analysis kind (`quick` / `full`).
pub const ANALYSIS_KIND: &str = "echo.analysis.kind";

/// How the result was obtained (`cache` / `leader` / `waiter`).
pub const ANALYSIS_ORIGIN: &str = "echo.analysis.origin";

/// Active store backend (`remote` / `local`).
pub const STORE_MODE: &str = "echo.store.mode";
