//! Infrastructure adapters for the Echo analysis server.
//!
//! Implements the ports defined in `echo-core`: [`cache::RedisCache`] for
//! `RemoteCache` and [`provider::HttpAnalysisClient`] for `AnalysisClient`.
//! Also loads [`ServerConfig`](echo_types::config::ServerConfig) from TOML
//! and the environment.

pub mod cache;
pub mod config;
pub mod provider;
