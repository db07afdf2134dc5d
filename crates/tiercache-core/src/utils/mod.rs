//! Utility functions for key handling.

pub mod key;

// Re-export commonly used functions at module level
pub use key::{sanitize_key, truncate_chars, DEFAULT_MAX_KEY_LENGTH};
