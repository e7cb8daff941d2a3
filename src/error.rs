use std::path::PathBuf;

use thiserror::Error;

/// Failure to obtain the status page. Usually transient.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("status page returned HTTP {status}")]
    Status { status: u16 },

    #[error("status page body is empty")]
    EmptyBody,

    #[error("status page is behind an anti-bot check")]
    Blocked,

    #[error("status page still shows the query form, no result was returned")]
    NoResult,

    #[error("failed to read page file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The page did not yield a complete status record.
///
/// Usually means the page layout changed and needs a human to look at it.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("page content is empty")]
    EmptyPage,

    #[error("required field `{0}` not found on page")]
    MissingField(&'static str),

    #[error("field `{field}` has an unrecognized count: {value:?}")]
    InvalidCount { field: &'static str, value: String },

    #[error("field `{field}` has an unrecognized date: {value:?}")]
    InvalidDate { field: &'static str, value: String },

    #[error("field `{field}` is malformed: {value:?}")]
    InvalidValue { field: &'static str, value: String },
}

/// Snapshot persistence failure
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("state store unavailable: {0}")]
    Unavailable(String),
}

/// Notification delivery failure
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("invalid mail address {address:?}: {reason}")]
    Address { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Message(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

/// A check cycle that aborted before reaching a decision
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("state store failed: {0}")]
    Store(#[from] StoreError),
}

/// Process exit codes
pub mod exit_code {
    pub const OK: u8 = 0;
    pub const USAGE: u8 = 1;
    pub const FETCH: u8 = 2;
    pub const PARSE: u8 = 3;
    pub const STORE: u8 = 4;
    pub const NOTIFY: u8 = 5;
}

impl CycleError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CycleError::Fetch(_) => exit_code::FETCH,
            CycleError::Parse(_) => exit_code::PARSE,
            CycleError::Store(_) => exit_code::STORE,
        }
    }
}
