use crate::api::error::StorageError;

/// ETag of the incoming dataset observed by the previous run.
pub const LAST_DATA_ETAG: &str = "LAST_DATA_ETAG";
/// Last-modified time (RFC 3339) of the incoming dataset observed by the previous run.
pub const LAST_DATA_LASTMOD: &str = "LAST_DATA_LASTMOD";

/// Durable key/value state shared by scheduled runs.
pub trait VariableStore {
    fn get(&mut self, name: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, name: &str, value: &str) -> Result<(), StorageError>;
}
