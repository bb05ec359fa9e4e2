//! Core logic for the Echo analysis server.
//!
//! Defines the ports the infrastructure implements (`RemoteCache`,
//! `AnalysisClient`) and everything built on them: the hybrid store, the
//! single-flight analysis orchestrator and session lifecycle.

pub mod analysis;
pub mod session;
pub mod store;
pub mod sync;
