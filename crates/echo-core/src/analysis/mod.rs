//! Analysis pipeline: provider port, sentiment parsing, single-flight
//! orchestration and the service that ties them to sessions.

pub mod client;
pub mod dedup;
pub mod sentiment;
pub mod service;

pub use client::{AnalysisClient, BoxAnalysisClient};
pub use dedup::{DedupOrchestrator, DedupSnapshot, ResolveOrigin, ResolvedAnalysis};
pub use sentiment::parse_sentiment;
pub use service::{AnalysisRequest, AnalysisService};
