//! Error type shared by every sync task and collaborator.

use std::{io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("object id `{id}` invalid: {reason}")]
    InvalidObjectId { id: String, reason: String },
    #[error("bag id `{raw}` invalid: {reason}")]
    InvalidBagId { raw: String, reason: String },
    #[error("peer url `{url}` invalid: {reason}")]
    InvalidPeerUrl { url: String, reason: String },
    #[error("peer responded with status {status} for {url}")]
    PeerStatus { url: String, status: u16 },
    #[error("invalid file hash, expected: {expected} - real: {actual}")]
    HashMismatch { expected: String, actual: String },
    #[error("no expected digest for object `{0}` and unverified downloads are rejected")]
    MissingDigest(String),
    #[error("cannot delete {}: {source}", .path.display())]
    DeleteFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("metadata lookup failed: {0}")]
    Registry(String),
    #[error("task queue is closed")]
    QueueClosed,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SyncError {
    /// True when the failure is a request deadline rather than a refusal.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SyncError::Http(err) if err.is_timeout())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
