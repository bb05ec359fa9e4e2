//! Observability for the Echo analysis server: subscriber setup and the
//! span field names shared by the other crates.

pub mod attrs;
pub mod tracing_setup;
