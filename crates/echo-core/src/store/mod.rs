//! Session and analysis-result storage.
//!
//! [`HybridStore`] fronts a [`RemoteCache`] (Redis in production) and falls
//! back to an in-process [`LocalMap`] whenever the remote is unreachable.

pub mod hybrid;
pub mod local;
pub mod remote;

pub use hybrid::{HybridStore, Namespace, StoreMode};
pub use local::LocalMap;
pub use remote::{BoxRemoteCache, RemoteCache};
