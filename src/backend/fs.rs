//! Filesystem backends: a directory tree standing in for buckets, and a JSON
//! file holding the persisted variables.

use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Component, Path, PathBuf},
};

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};

use crate::{
    api::{
        error::{GetError, HeadError, StorageError},
        store::{ObjectHead, ObjectStore},
        variables::VariableStore,
    },
    DatasetPointer,
};

/// Objects live at `{root}/{bucket}/{key}`.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalStore { root: root.into() }
    }

    fn path(&self, object: &DatasetPointer) -> Result<PathBuf, StorageError> {
        let relative = Path::new(&object.bucket).join(&object.key);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if escapes {
            return Err(anyhow!("refusing to map {} outside of {}", object, self.root.display()));
        }
        Ok(self.root.join(relative))
    }
}

fn lookup_error(error: io::Error, object: &DatasetPointer, path: &Path) -> HeadError {
    if error.kind() == io::ErrorKind::NotFound {
        HeadError::DoesNotExist(object.uri())
    } else {
        HeadError::Storage(StorageError::new(error).context(format!("reading {}", path.display())))
    }
}

// `metrics.json` stages as `metrics.json.partial`, distinct from `metrics.csv.partial`.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

// Replaces `path` in one step so readers never observe a partial file.
fn write_atomically(path: &Path, body: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let staging = staging_path(path);
    let mut file = fs::File::create(&staging).with_context(|| format!("creating {}", staging.display()))?;
    file.write_all(body).with_context(|| format!("writing {}", staging.display()))?;
    file.sync_all().with_context(|| format!("syncing {}", staging.display()))?;
    fs::rename(&staging, path).with_context(|| format!("renaming {} into place", staging.display()))?;
    Ok(())
}

impl ObjectStore for LocalStore {
    fn head(&mut self, object: &DatasetPointer) -> Result<ObjectHead, HeadError> {
        let path = self.path(object)?;
        let metadata = fs::metadata(&path).map_err(|error| lookup_error(error, object, &path))?;
        if !metadata.is_file() {
            return Err(HeadError::DoesNotExist(object.uri()));
        }
        let last_modified = metadata.modified().ok().map(DateTime::<Utc>::from);
        // Weak validator in the style of static file servers: mtime and size.
        let etag = format!(
            "{:x}-{:x}",
            last_modified.map(|time| time.timestamp_nanos()).unwrap_or_default(),
            metadata.len()
        );
        Ok(ObjectHead { etag, last_modified })
    }

    fn get(&mut self, object: &DatasetPointer) -> Result<Vec<u8>, GetError> {
        let path = self.path(object)?;
        fs::read(&path).map_err(|error| lookup_error(error, object, &path))
    }

    fn put(&mut self, object: &DatasetPointer, body: &[u8], _content_type: &str) -> Result<(), StorageError> {
        let path = self.path(object)?;
        write_atomically(&path, body)
    }
}

/// Variables persisted as a flat JSON object.
pub struct FileVariables {
    path: PathBuf,
}

impl FileVariables {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileVariables { path: path.into() }
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing variables file {}", self.path.display())),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(error) => Err(StorageError::new(error).context(format!("reading {}", self.path.display()))),
        }
    }
}

impl VariableStore for FileVariables {
    fn get(&mut self, name: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.remove(name))
    }

    fn set(&mut self, name: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.load()?;
        values.insert(name.to_string(), value.to_string());
        let body = serde_json::to_vec_pretty(&values).context("serializing variables")?;
        write_atomically(&self.path, &body)
    }
}
