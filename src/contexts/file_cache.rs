use crate::data::Cache;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

/// Default root for cached model responses
pub const DEFAULT_CACHE_DIR: &str = ".ava/cache";

/// FileCache stores accumulated model responses on disk.
///
/// The cache is organized as: `{folder}/{role_model_hash}/{prompt_hash}.cache`
/// where role_model_hash = hash(role + provider + model name), so switching a
/// role to another model never replays the old model's answers.
#[derive(Debug, Clone)]
pub struct FileCache {
    /// The root folder path for the cache (defaults to ".ava/cache")
    folder: String,
    /// Hash of role + provider + model (used as subfolder)
    role_model_hash: String,
}

/// Hex SHA-256 of `parts` joined with ':'
pub fn hash_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join(":").as_bytes());
    hex::encode(hasher.finalize())
}

impl FileCache {
    /// Creates a new FileCache instance
    ///
    /// # Arguments
    /// * `folder` - Optional root folder path. If None, defaults to ".ava/cache"
    /// * `role_model_hash` - Hash identifying the role and model (used as subfolder)
    pub fn new(folder: Option<String>, role_model_hash: String) -> Self {
        Self {
            folder: folder.unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string()),
            role_model_hash,
        }
    }

    /// Path format: `{folder}/{role_model_hash}/{key}.cache`
    fn get_cache_path(&self, key: &str) -> PathBuf {
        let mut path = self.get_cache_dir();
        path.push(format!("{}.cache", key));
        path
    }

    fn get_cache_dir(&self) -> PathBuf {
        let mut path = PathBuf::from(&self.folder);
        path.push(&self.role_model_hash);
        path
    }
}

impl Cache for FileCache {
    /// A missing or unreadable file is a cache miss
    fn get(&self, key: &str) -> Option<String> {
        fs::read_to_string(self.get_cache_path(key)).ok()
    }

    /// Creates necessary directories; failures are logged, never raised
    fn set(&self, key: &str, value: &str) {
        let path = self.get_cache_path(key);
        let dir = self.get_cache_dir();

        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::warn!("Failed to create cache directory {:?}: {}", dir, e);
            return;
        }

        if let Err(e) = fs::write(&path, value) {
            tracing::warn!("Failed to write cache file {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_path_construction() {
        let cache = FileCache::new(Some("/tmp/cache".to_string()), "abc123".to_string());
        let path = cache.get_cache_path("test_key");
        assert_eq!(path.to_str().unwrap(), "/tmp/cache/abc123/test_key.cache");
    }

    #[test]
    fn test_cache_get_set() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(
            Some(dir.path().to_string_lossy().to_string()),
            "test_hash".to_string(),
        );

        assert_eq!(cache.get("nonexistent"), None);

        cache.set("test_key", "test_value");
        assert_eq!(cache.get("test_key"), Some("test_value".to_string()));

        cache.set("test_key", "new_value");
        assert_eq!(cache.get("test_key"), Some("new_value".to_string()));
    }

    #[test]
    fn test_default_folder() {
        let cache = FileCache::new(None, "test_hash".to_string());
        assert_eq!(cache.folder, ".ava/cache");
    }

    #[test]
    fn hash_key_depends_on_every_part() {
        assert_eq!(hash_key(&["coder", "openai/gpt"]).len(), 64);
        assert_ne!(hash_key(&["coder", "a"]), hash_key(&["reviewer", "a"]));
        assert_eq!(hash_key(&["x", "y"]), hash_key(&["x", "y"]));
    }
}
