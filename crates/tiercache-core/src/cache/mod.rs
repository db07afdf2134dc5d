//! Local cache tiers.
//!
//! - `VolatileTier`: bounded in-process LRU map holding live values
//! - `LocalDurableTier`: serialized entries in a quota-limited `DurableStore`
//!
//! Durable backends:
//! - `FileStore`: one JSON file per key, limited by total bytes
//! - `MemoryStore`: in-memory map, limited by entry count

pub mod local;
pub mod store;
pub mod volatile;

pub use local::{LocalDurableTier, DEFAULT_LOCAL_MIN_TTL_MS};
pub use store::{DurableStore, FileStore, MemoryStore};
pub use volatile::{VolatileTier, DEFAULT_VOLATILE_CAPACITY};
