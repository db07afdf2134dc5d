//! Remote tier: client-side access to an external persistence service.
//!
//! `RemoteBackend` is the pluggable contract (point get/set/delete, bulk
//! delete, "expired before" queries). `HttpBackend` talks to a REST document
//! service and `MemoryBackend` keeps records in-process. `RemoteTier` wraps
//! any backend with per-call timeouts, an availability flag and batch limits.

pub mod backend;
pub mod client;
pub mod error;
pub mod memory;
pub mod remote;

pub use backend::{RemoteBackend, RemoteRecord, DEFAULT_MAX_BATCH_SIZE};
pub use client::HttpBackend;
pub use error::RemoteError;
pub use memory::MemoryBackend;
pub use remote::RemoteTier;
