use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::opt_rfc3339;

/// Observable identity of a remote blob at a point in time.
///
/// Two fingerprints with equal `etag` describe the same content, whatever
/// their `last_modified`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetFingerprint {
    pub exists: bool,
    pub etag: Option<String>,
    #[serde(default, with = "opt_rfc3339")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl DatasetFingerprint {
    pub fn absent() -> Self {
        DatasetFingerprint {
            exists: false,
            etag: None,
            last_modified: None,
        }
    }

    pub fn same_content(&self, other: &DatasetFingerprint) -> bool {
        match (&self.etag, &other.etag) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Strips the quotes HTTP servers wrap around entity tags.
pub fn normalize_etag(raw: &str) -> String {
    let raw = raw.trim();
    let raw = raw.strip_prefix("W/").unwrap_or(raw);
    raw.trim_matches('"').to_string()
}
