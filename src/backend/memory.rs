//! In-process backends sharing their contents between clones.

use std::{
    collections::{hash_map::DefaultHasher, HashMap},
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use anyhow::anyhow;
use chrono::{DateTime, Utc};

use crate::{
    api::{
        error::{GetError, HeadError, StorageError},
        store::{ObjectHead, ObjectStore},
        variables::VariableStore,
    },
    timestamp, DatasetPointer,
};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    content_type: String,
    etag: String,
    last_modified: DateTime<Utc>,
}

/// Object store kept in memory. The ETag is derived from the content, so
/// uploading identical bytes twice yields the same fingerprint.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: Arc<Mutex<HashMap<DatasetPointer, StoredObject>>>,
    failures: Arc<AtomicUsize>,
}

fn content_etag(body: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` requests fail with a storage error.
    pub fn fail_next_requests(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn contains(&self, object: &DatasetPointer) -> bool {
        self.lock().map(|objects| objects.contains_key(object)).unwrap_or(false)
    }

    pub fn content_type(&self, object: &DatasetPointer) -> Option<String> {
        let objects = self.lock().ok()?;
        objects.get(object).map(|stored| stored.content_type.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<DatasetPointer, StoredObject>>, StorageError> {
        self.objects.lock().map_err(|_| anyhow!("memory store lock poisoned"))
    }

    fn injected_failure(&self, operation: &str, object: &DatasetPointer) -> Result<(), StorageError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(anyhow!("injected failure during {} of {}", operation, object));
        }
        Ok(())
    }
}

impl ObjectStore for MemoryStore {
    fn head(&mut self, object: &DatasetPointer) -> Result<ObjectHead, HeadError> {
        self.injected_failure("head", object)?;
        let objects = self.lock()?;
        match objects.get(object) {
            Some(stored) => Ok(ObjectHead {
                etag: stored.etag.clone(),
                last_modified: Some(stored.last_modified),
            }),
            None => Err(HeadError::DoesNotExist(object.uri())),
        }
    }

    fn get(&mut self, object: &DatasetPointer) -> Result<Vec<u8>, GetError> {
        self.injected_failure("get", object)?;
        let objects = self.lock()?;
        match objects.get(object) {
            Some(stored) => Ok(stored.body.clone()),
            None => Err(GetError::DoesNotExist(object.uri())),
        }
    }

    fn put(&mut self, object: &DatasetPointer, body: &[u8], content_type: &str) -> Result<(), StorageError> {
        self.injected_failure("put", object)?;
        let mut objects = self.lock()?;
        objects.insert(
            object.clone(),
            StoredObject {
                body: body.to_vec(),
                content_type: content_type.to_string(),
                etag: content_etag(body),
                last_modified: timestamp(),
            },
        );
        Ok(())
    }
}

/// Variables kept in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryVariables {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryVariables {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, StorageError> {
        self.values.lock().map_err(|_| anyhow!("memory variables lock poisoned"))
    }
}

impl VariableStore for MemoryVariables {
    fn get(&mut self, name: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(name).cloned())
    }

    fn set(&mut self, name: &str, value: &str) -> Result<(), StorageError> {
        self.lock()?.insert(name.to_string(), value.to_string());
        Ok(())
    }
}
