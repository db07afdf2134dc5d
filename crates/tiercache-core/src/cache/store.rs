//! Durable key-value backends for the local tier.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::StoreError;

/// Longest file name the file store will produce for a key.
/// Most filesystems cap names at 255 bytes; leave room for the extension.
const MAX_FILE_STEM_BYTES: usize = 240;

/// Marks digest-named files. Never produced by `encode_file_stem`, which escapes `~`.
const HASHED_STEM_PREFIX: char = '~';

/// Per-device key-value storage with a finite quota.
///
/// Calls are synchronous; a full store must report
/// `StoreError::QuotaExceeded` rather than a generic failure.
pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError>;

    fn clear(&self) -> Result<(), StoreError> {
        for key in self.keys()? {
            self.remove(&key)?;
        }
        Ok(())
    }
}

// ============================================================================
// File store
// ============================================================================

/// Contents of a digest-named file; the real key can't be recovered from the name.
#[derive(Debug, Serialize, Deserialize)]
struct HashedFile {
    key: String,
    value: String,
}

/// Where a key lives on disk.
struct KeyPath {
    path: PathBuf,
    hashed: bool,
}

/// One JSON file per key inside a directory, limited by total bytes.
///
/// Short keys are percent-encoded into the file name. Keys whose encoded name
/// would be too long for the filesystem go to a SHA-256 named file that also
/// records the key.
pub struct FileStore {
    dir: PathBuf,
    quota_bytes: u64,
    used_bytes: Mutex<u64>,
}

impl FileStore {
    pub fn open(dir: PathBuf, quota_bytes: u64) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&dir)?;

        let mut used = 0;
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if Self::is_store_file(&entry.path()) {
                used += entry.metadata()?.len();
            }
        }
        debug!(dir = %dir.display(), used_bytes = used, "Opened file store");

        Ok(Self {
            dir,
            quota_bytes,
            used_bytes: Mutex::new(used),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn used_bytes(&self) -> u64 {
        *self.used_bytes.lock()
    }

    fn cache_path(&self, key: &str) -> KeyPath {
        let stem = encode_file_stem(key);
        if stem.len() <= MAX_FILE_STEM_BYTES {
            return KeyPath {
                path: self.dir.join(format!("{}.json", stem)),
                hashed: false,
            };
        }
        KeyPath {
            path: self.dir.join(format!("{}{}.json", HASHED_STEM_PREFIX, hashed_stem(key))),
            hashed: true,
        }
    }

    fn is_store_file(path: &Path) -> bool {
        if path.extension().map_or(true, |ext| ext != "json") {
            return false;
        }
        match path.file_stem().and_then(|s| s.to_str()) {
            Some(stem) if stem.starts_with(HASHED_STEM_PREFIX) => true,
            Some(stem) => decode_file_stem(stem).is_some(),
            None => false,
        }
    }

    fn key_from_path(path: &Path) -> Option<String> {
        if path.extension()? != "json" {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        if stem.starts_with(HASHED_STEM_PREFIX) {
            let contents = std::fs::read_to_string(path).ok()?;
            return match serde_json::from_str::<HashedFile>(&contents) {
                Ok(file) => Some(file.key),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable file store entry");
                    None
                }
            };
        }
        decode_file_stem(stem)
    }

    fn file_len(path: &Path) -> u64 {
        std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let target = self.cache_path(key);
        let contents = match std::fs::read_to_string(&target.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if !target.hashed {
            return Ok(Some(contents));
        }

        let file: HashedFile = serde_json::from_str(&contents)
            .map_err(|e| StoreError::Backend(format!("Unreadable entry for {}: {}", key, e)))?;
        Ok((file.key == key).then_some(file.value))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let target = self.cache_path(key);
        let contents = if target.hashed {
            serde_json::to_string(&HashedFile {
                key: key.to_string(),
                value: value.to_string(),
            })
            .map_err(|e| StoreError::Backend(e.to_string()))?
        } else {
            value.to_string()
        };

        let mut used = self.used_bytes.lock();
        let existing = Self::file_len(&target.path);
        let projected = *used - existing.min(*used) + contents.len() as u64;
        if projected > self.quota_bytes {
            return Err(StoreError::QuotaExceeded {
                used: projected,
                quota: self.quota_bytes,
            });
        }

        std::fs::write(&target.path, contents)?;
        *used = projected;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.cache_path(key).path;
        let mut used = self.used_bytes.lock();
        let existing = Self::file_len(&path);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                *used = used.saturating_sub(existing);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            if let Some(key) = Self::key_from_path(&entry?.path()) {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

fn hashed_stem(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Percent-encode everything outside `[A-Za-z0-9_.-]` so keys map to safe file names
fn encode_file_stem(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'.' | b'-') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

fn decode_file_stem(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

// ============================================================================
// Memory store
// ============================================================================

/// In-memory store limited by entry count.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    max_entries: usize,
}

impl MemoryStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
        }
    }

    /// Overwrite a raw value, ignoring the quota
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            return Err(StoreError::QuotaExceeded {
                used: entries.len() as u64 + 1,
                quota: self.max_entries as u64,
            });
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.lock().keys().cloned().collect())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.entries.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_stem_roundtrip() {
        for key in ["user:1", "a b", "plain_key-1.x", "ünï"] {
            let stem = encode_file_stem(key);
            assert!(stem.bytes().all(|b| b.is_ascii()));
            assert_eq!(decode_file_stem(&stem).as_deref(), Some(key));
        }
        assert_eq!(decode_file_stem("bad%Z"), None);
    }

    #[test]
    fn test_file_store_basic() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path().join("local"), 1024).unwrap();

        assert_eq!(store.get("user:1").unwrap(), None);
        store.set("user:1", "{\"a\":1}").unwrap();
        assert_eq!(store.get("user:1").unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(store.keys().unwrap(), vec!["user:1".to_string()]);
        assert_eq!(store.used_bytes(), 7);

        store.remove("user:1").unwrap();
        assert_eq!(store.get("user:1").unwrap(), None);
        assert_eq!(store.used_bytes(), 0);
        store.remove("user:1").unwrap();
    }

    #[test]
    fn test_file_store_quota() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path().to_path_buf(), 10).unwrap();

        store.set("a", "12345").unwrap();
        store.set("b", "12345").unwrap();
        assert!(matches!(
            store.set("c", "1"),
            Err(StoreError::QuotaExceeded { used: 11, quota: 10 })
        ));
        // Overwrites only count the difference
        store.set("a", "1234").unwrap();
        store.set("c", "1").unwrap();
    }

    #[test]
    fn test_file_store_reopen_counts_usage() {
        let tmp = TempDir::new().unwrap();
        {
            let store = FileStore::open(tmp.path().to_path_buf(), 100).unwrap();
            store.set("a", "123").unwrap();
        }
        let store = FileStore::open(tmp.path().to_path_buf(), 100).unwrap();
        assert_eq!(store.used_bytes(), 3);
    }

    #[test]
    fn test_file_store_long_keys_use_digest_names() {
        let tmp = TempDir::new().unwrap();
        let store = FileStore::open(tmp.path().to_path_buf(), 100_000).unwrap();
        let long = "k".repeat(1500);
        let colons = ":".repeat(90);

        store.set(&long, "1").unwrap();
        store.set(&colons, "2").unwrap();
        assert_eq!(store.get(&long).unwrap().as_deref(), Some("1"));
        assert_eq!(store.get(&colons).unwrap().as_deref(), Some("2"));

        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec![colons.clone(), long.clone()]);

        for entry in std::fs::read_dir(tmp.path()).unwrap() {
            let name = entry.unwrap().file_name();
            assert!(name.len() < 255);
        }

        // Usage survives a reopen and drops back to zero on removal
        let reopened = FileStore::open(tmp.path().to_path_buf(), 100_000).unwrap();
        assert_eq!(reopened.used_bytes(), store.used_bytes());
        reopened.remove(&long).unwrap();
        reopened.remove(&colons).unwrap();
        assert_eq!(reopened.get(&long).unwrap(), None);
        assert_eq!(reopened.used_bytes(), 0);
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemoryStore::new(2);
        store.set("a", "1").unwrap();
        store.set("b", "1").unwrap();
        assert!(matches!(store.set("c", "1"), Err(StoreError::QuotaExceeded { .. })));
        store.set("a", "2").unwrap();
        store.clear().unwrap();
        assert!(store.keys().unwrap().is_empty());
    }
}
