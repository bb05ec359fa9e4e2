//! Shared domain types for the Echo analysis server.
//!
//! Sessions, analysis keys and results, event-channel frames, configuration
//! and the error enums shared by every other crate.
//!
//! Zero infrastructure dependencies -- only serde, chrono, sha2, thiserror.

pub mod analysis;
pub mod config;
pub mod error;
pub mod event;
pub mod session;
