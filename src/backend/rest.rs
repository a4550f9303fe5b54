use crate::{
    api::{
        error::{GetError, HeadError, StorageError},
        fingerprint::normalize_etag,
        store::{ObjectHead, ObjectStore},
    },
    DatasetPointer,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::{fmt::Display, io::Read, time::Duration};

#[derive(Debug, Clone, thiserror::Error)]
pub enum RestError {
    #[error("{status} {code}: {message}")]
    Known { status: u16, code: RestErrorCode, message: String },
    #[error("Unknown {status} error:\n{body}")]
    Unknown { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(String),
}

impl RestError {
    pub fn is_not_found(&self) -> bool {
        match self {
            RestError::Known { status: 404, .. } | RestError::Unknown { status: 404, .. } => true,
            RestError::Known { code, .. } => *code == RestErrorCode::NoSuchKey,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestErrorCode {
    NoSuchKey,
    NoSuchBucket,
    AccessDenied,
    Unknown(String),
}
impl From<&str> for RestErrorCode {
    fn from(value: &str) -> Self {
        match value {
            "NoSuchKey" | "NotFound" => RestErrorCode::NoSuchKey,
            "NoSuchBucket" => RestErrorCode::NoSuchBucket,
            "AccessDenied" => RestErrorCode::AccessDenied,
            _ => RestErrorCode::Unknown(value.to_owned()),
        }
    }
}
impl Display for RestErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Object gateway speaking plain HTTP with path-style addressing:
/// `{base_url}/{bucket}/{key}`.
pub struct Server {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

// Extracts `<Tag>value</Tag>` from an S3 style XML error document.
fn xml_tag<'a>(body: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].trim())
}

fn parse_error(response: ureq::Response) -> RestError {
    if let Some(error) = response.synthetic_error() {
        return RestError::Transport(error.to_string());
    }
    let status = response.status();
    let body = response
        .into_string()
        .unwrap_or_else(|_| "Could not turn error body into String.".to_string());

    match xml_tag(&body, "Code") {
        Some(code) => RestError::Known {
            status,
            code: RestErrorCode::from(code),
            message: xml_tag(&body, "Message").unwrap_or_default().to_string(),
        },
        None => RestError::Unknown { status, body },
    }
}

fn lookup_error(error: RestError, object: &DatasetPointer) -> HeadError {
    if error.is_not_found() {
        HeadError::DoesNotExist(object.uri())
    } else {
        HeadError::Storage(StorageError::new(error).context(format!("requesting {}", object)))
    }
}

impl Server {
    pub fn new(base_url: impl Into<String>) -> Self {
        Server {
            base_url: base_url.into(),
            token: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, object: &DatasetPointer) -> String {
        format!("{}/{}/{}", self.base_url.trim_end_matches('/'), object.bucket, object.key)
    }

    fn request(&self, method: fn(&str) -> ureq::Request, object: &DatasetPointer) -> ureq::Request {
        let mut request = method(&self.url(object));
        request.timeout(self.timeout);
        if let Some(token) = &self.token {
            request.set("Authorization", &format!("Bearer {}", token));
        }
        request
    }

    fn execute<Req>(&self, send: Req) -> Result<ureq::Response, RestError>
    where
        Req: FnOnce() -> ureq::Response,
    {
        let http_response = send();
        if http_response.error() {
            Err(parse_error(http_response))
        } else {
            Ok(http_response)
        }
    }
}

impl ObjectStore for Server {
    fn head(&mut self, object: &DatasetPointer) -> Result<ObjectHead, HeadError> {
        let http_response = self
            .execute(|| self.request(ureq::head, object).call())
            .map_err(|error| lookup_error(error, object))?;
        let etag = http_response.header("ETag").map(normalize_etag).unwrap_or_default();
        let last_modified = http_response
            .header("Last-Modified")
            .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
            .map(|value| value.with_timezone(&Utc));
        Ok(ObjectHead { etag, last_modified })
    }

    fn get(&mut self, object: &DatasetPointer) -> Result<Vec<u8>, GetError> {
        let http_response = self
            .execute(|| self.request(ureq::get, object).call())
            .map_err(|error| lookup_error(error, object))?;
        let mut body = Vec::new();
        http_response
            .into_reader()
            .read_to_end(&mut body)
            .with_context(|| format!("reading body of {}", object))?;
        Ok(body)
    }

    fn put(&mut self, object: &DatasetPointer, body: &[u8], content_type: &str) -> Result<(), StorageError> {
        self.execute(|| {
            self.request(ureq::put, object)
                .set("Content-Type", content_type)
                .send_bytes(body)
        })
        .with_context(|| format!("uploading {}", object))?;
        Ok(())
    }
}
