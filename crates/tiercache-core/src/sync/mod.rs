//! Background reconciliation with the remote tier.
//!
//! `SyncQueue` tracks keys whose writes (or deletes) have not reached the
//! remote tier and runs single-flight drain cycles over a `DrainTarget`.
//! `NetworkMonitor` publishes online/offline transitions that gate remote
//! access and trigger an immediate drain on reconnect.

pub mod network;
pub mod queue;

pub use network::NetworkMonitor;
pub use queue::{DrainTarget, PendingWrite, SyncOutcome, SyncQueue, DEFAULT_MAX_SYNC_RETRIES};
