//! Synchronization engine of a storage node.
//!
//! The sync driver decides which objects to fetch or delete and submits
//! [`SyncTask`]s to a [`TaskQueue`]. The [`TaskRunner`] executes them with
//! bounded concurrency: deletions respect the local cache's guards, and
//! downloads are resolved to a peer that holds the object, fetched into the
//! temp directory, verified and renamed into the uploads directory.

pub mod errors;
pub mod models;
pub mod services;

pub use errors::{SyncError, SyncResult};
pub use models::{BagId, CachedObject, ObjectId, PeerUrl};
pub use services::{
    cache::{LocalObjectCache, ObjectCache},
    hashing::DigestAlgorithm,
    peers::{HttpPeerClient, PeerClient},
    queue::{QueueSummary, TaskQueue, TaskRunner},
    registry::{MetadataClient, PinnedDigests},
    tasks::{
        DeleteLocalFileTask, DownloadFileTask, MissingDigestPolicy, PrepareDownloadFileTask,
        SyncContext, SyncTask, TransferSettings,
    },
};
