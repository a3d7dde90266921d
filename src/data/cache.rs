/// Cache trait for storing and retrieving accumulated model responses by key.
///
/// Implementations should handle errors gracefully without panicking.
pub trait Cache {
    /// Retrieves a cached value for the given key.
    ///
    /// # Returns
    /// * `Some(String)` - The cached value if found
    /// * `None` - If the key doesn't exist or retrieval fails
    fn get(&self, key: &str) -> Option<String>;

    /// Stores a value in the cache for the given key.
    ///
    /// Errors during storage are logged, never returned.
    fn set(&self, key: &str, value: &str);
}
