use chrono::{DateTime, Utc};

use crate::api::{
    error::{GetError, HeadError, StorageError},
    pointer::DatasetPointer,
};

/// Metadata returned by a head request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub etag: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Blob storage addressed by bucket and key.
///
/// A missing object is reported as `DoesNotExist`, every other failure as
/// `Storage`.
#[rustfmt::skip]
pub trait ObjectStore {
    fn head(&mut self, object: &DatasetPointer) -> Result<ObjectHead, HeadError>;
    fn get(&mut self, object: &DatasetPointer) -> Result<Vec<u8>, GetError>;
    fn put(&mut self, object: &DatasetPointer, body: &[u8], content_type: &str) -> Result<(), StorageError>;
}
