use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::api::error::UriError;

// DATASETS

/// Location of a blob in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetPointer {
    pub bucket: String,
    pub key: String,
}

impl DatasetPointer {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        DatasetPointer {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

impl fmt::Display for DatasetPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

impl FromStr for DatasetPointer {
    type Err = UriError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        let rest = match uri.strip_prefix("s3://") {
            Some(rest) => rest,
            None => return Err(UriError::Malformed(uri.to_string())),
        };
        match rest.split_once('/') {
            Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
                Ok(DatasetPointer::new(bucket, key))
            }
            _ => Err(UriError::Malformed(uri.to_string())),
        }
    }
}

// RUNS

/// Run identifier made safe for use inside object keys.
///
/// Every run of characters outside `[0-9A-Za-z_.-]` collapses into a single
/// underscore, surrounding underscores are trimmed and an empty result
/// becomes `run`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunName(String);

impl RunName {
    pub fn sanitize(raw: &str) -> Self {
        let mut out = String::with_capacity(raw.len());
        let mut replacing = false;
        for c in raw.chars() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                out.push(c);
                replacing = false;
            } else if !replacing {
                out.push('_');
                replacing = true;
            }
        }
        let trimmed = out.trim_matches('_');
        if trimmed.is_empty() {
            RunName("run".to_string())
        } else {
            RunName(trimmed.to_string())
        }
    }
}

impl AsRef<str> for RunName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl From<String> for RunName {
    fn from(raw: String) -> Self {
        RunName::sanitize(&raw)
    }
}

impl From<&str> for RunName {
    fn from(raw: &str) -> Self {
        RunName::sanitize(raw)
    }
}

impl fmt::Display for RunName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
