use anyhow::Context;
use tracing::info;

use crate::{
    api::{
        error::{HeadError, StorageError},
        fingerprint::DatasetFingerprint,
        variables::{LAST_DATA_ETAG, LAST_DATA_LASTMOD},
    },
    DatasetPointer, ObjectStore, VariableStore,
};

/// Result of looking for a changed incoming dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDataCheck {
    pub pointer: DatasetPointer,
    pub fingerprint: DatasetFingerprint,
    pub has_new_data: bool,
}

/// Compares the dataset's current ETag with the one seen by the previous run.
///
/// The persisted ETag (and last-modified time, when the store reports one) is
/// overwritten on every successful head, so a value that flips back counts as
/// new relative to the immediately preceding run only. A missing dataset is
/// not an error and leaves the persisted state untouched.
pub fn check_new_data(
    store: &mut dyn ObjectStore,
    variables: &mut dyn VariableStore,
    pointer: &DatasetPointer,
) -> Result<NewDataCheck, StorageError> {
    let head = match store.head(pointer) {
        Ok(head) => head,
        Err(HeadError::DoesNotExist(_)) => {
            info!(current = %pointer, "no current dataset found");
            return Ok(NewDataCheck {
                pointer: pointer.clone(),
                fingerprint: DatasetFingerprint::absent(),
                has_new_data: false,
            });
        }
        Err(HeadError::Storage(error)) => {
            return Err(error.context(format!("checking {}", pointer)));
        }
    };

    let previous = variables
        .get(LAST_DATA_ETAG)
        .context("reading previous dataset etag")?
        .unwrap_or_default();
    let has_new_data = !head.etag.is_empty() && head.etag != previous;

    // The etag goes last: an attempt that fails before it keeps the previous
    // etag, so a retry still sees the dataset as new.
    if let Some(last_modified) = head.last_modified {
        variables
            .set(LAST_DATA_LASTMOD, &last_modified.to_rfc3339())
            .context("persisting dataset last-modified time")?;
    }
    variables
        .set(LAST_DATA_ETAG, &head.etag)
        .context("persisting dataset etag")?;

    info!(
        current = %pointer,
        etag = %head.etag,
        previous_etag = %previous,
        last_modified = ?head.last_modified.map(|time| time.to_rfc3339()),
        has_new_data,
        "current dataset found"
    );
    Ok(NewDataCheck {
        pointer: pointer.clone(),
        fingerprint: DatasetFingerprint {
            exists: true,
            etag: Some(head.etag),
            last_modified: head.last_modified,
        },
        has_new_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{MemoryStore, MemoryVariables};

    fn current() -> DatasetPointer {
        DatasetPointer::new("credit", "retraining/current.csv")
    }

    #[test]
    fn missing_dataset_is_a_state() {
        let mut store = MemoryStore::new();
        let mut variables = MemoryVariables::new();
        variables.set(LAST_DATA_ETAG, "old").unwrap();
        let check = check_new_data(&mut store, &mut variables, &current()).unwrap();
        assert!(!check.fingerprint.exists);
        assert!(!check.has_new_data);
        assert_eq!(check.fingerprint.etag, None);
        assert_eq!(variables.get(LAST_DATA_ETAG).unwrap().as_deref(), Some("old"));
    }

    #[test]
    fn unchanged_etag_is_not_new_on_second_check() {
        let mut store = MemoryStore::new();
        let mut variables = MemoryVariables::new();
        store.put(&current(), b"AGE\n1\n", "text/csv").unwrap();

        let first = check_new_data(&mut store, &mut variables, &current()).unwrap();
        assert!(first.has_new_data);
        let second = check_new_data(&mut store, &mut variables, &current()).unwrap();
        assert!(!second.has_new_data);
        assert!(second.fingerprint.same_content(&first.fingerprint));
        assert!(variables.get(LAST_DATA_LASTMOD).unwrap().is_some());
    }

    #[test]
    fn flapping_etag_compares_with_previous_run_only() {
        let mut store = MemoryStore::new();
        let mut variables = MemoryVariables::new();
        store.put(&current(), b"A\n1\n", "text/csv").unwrap();
        assert!(check_new_data(&mut store, &mut variables, &current()).unwrap().has_new_data);
        store.put(&current(), b"A\n2\n", "text/csv").unwrap();
        assert!(check_new_data(&mut store, &mut variables, &current()).unwrap().has_new_data);
        store.put(&current(), b"A\n1\n", "text/csv").unwrap();
        assert!(check_new_data(&mut store, &mut variables, &current()).unwrap().has_new_data);
    }

    /// Fails the first write of one variable, then behaves.
    struct FailingOnce {
        inner: MemoryVariables,
        name: &'static str,
        failed: bool,
    }

    impl VariableStore for FailingOnce {
        fn get(&mut self, name: &str) -> Result<Option<String>, StorageError> {
            self.inner.get(name)
        }

        fn set(&mut self, name: &str, value: &str) -> Result<(), StorageError> {
            if name == self.name && !self.failed {
                self.failed = true;
                anyhow::bail!("write of {} timed out", name);
            }
            self.inner.set(name, value)
        }
    }

    #[test]
    fn failed_attempt_keeps_new_data_for_retry() {
        let mut store = MemoryStore::new();
        store.put(&current(), b"AGE\n1\n", "text/csv").unwrap();
        let mut variables = FailingOnce {
            inner: MemoryVariables::new(),
            name: LAST_DATA_LASTMOD,
            failed: false,
        };

        assert!(check_new_data(&mut store, &mut variables, &current()).is_err());
        assert_eq!(variables.get(LAST_DATA_ETAG).unwrap(), None);

        let retry = check_new_data(&mut store, &mut variables, &current()).unwrap();
        assert!(retry.has_new_data);
        assert_eq!(variables.get(LAST_DATA_ETAG).unwrap(), retry.fingerprint.etag);
    }

    #[test]
    fn storage_errors_propagate() {
        let mut store = MemoryStore::new();
        let mut variables = MemoryVariables::new();
        store.fail_next_requests(1);
        assert!(check_new_data(&mut store, &mut variables, &current()).is_err());
        assert_eq!(variables.get(LAST_DATA_ETAG).unwrap(), None);
    }
}
