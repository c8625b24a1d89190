//! Synchronization tasks.
//!
//! A task is one unit of sync work: delete a local object, resolve a peer
//! that holds an object, or download an object from an already chosen peer.
//! Tasks are executed by the [`TaskRunner`](crate::services::queue::TaskRunner)
//! and own everything they need except the shared [`SyncContext`].

use crate::{
    errors::{SyncError, SyncResult},
    models::{BagId, ObjectId, PeerUrl},
    services::{
        cache::ObjectCache,
        hashing::{self, DigestAlgorithm},
        peers::{self, HOST_ID_HEADER, PeerClient},
        queue::TaskQueue,
        registry::MetadataClient,
    },
};
use futures::StreamExt;
use rand::seq::IndexedRandom;
use reqwest::Client;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

/// What to do with a download whose expected digest is unknown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingDigestPolicy {
    /// Commit the object unverified.
    #[default]
    Accept,
    /// Refuse the download before any network I/O.
    Reject,
}

/// Collaborators shared by every task the runner executes.
#[derive(Clone)]
pub struct SyncContext {
    pub cache: Arc<dyn ObjectCache>,
    pub http: Client,
    pub peers: Arc<dyn PeerClient>,
    pub registry: Option<Arc<dyn MetadataClient>>,
    pub digest_algorithm: DigestAlgorithm,
    pub missing_digest: MissingDigestPolicy,
}

/// Local directories and request settings used when fetching objects.
#[derive(Clone, Debug)]
pub struct TransferSettings {
    /// Final location of committed objects.
    pub uploads_directory: PathBuf,
    /// Scratch space for in-flight downloads. Must share a filesystem with
    /// `uploads_directory` so the commit is a rename.
    pub temp_directory: PathBuf,
    /// Hard deadline for one download, body included.
    pub download_timeout: Duration,
    /// Sent to peers in [`HOST_ID_HEADER`].
    pub host_id: String,
}

impl TransferSettings {
    /// Convert the operator-facing minute value into a request deadline.
    pub fn with_timeout_minutes(
        uploads_directory: impl Into<PathBuf>,
        temp_directory: impl Into<PathBuf>,
        download_timeout_minutes: u64,
        host_id: impl Into<String>,
    ) -> Self {
        Self {
            uploads_directory: uploads_directory.into(),
            temp_directory: temp_directory.into(),
            download_timeout: Duration::from_secs(download_timeout_minutes.saturating_mul(60)),
            host_id: host_id.into(),
        }
    }
}

pub enum SyncTask {
    DeleteLocalFile(DeleteLocalFileTask),
    DownloadFile(DownloadFileTask),
    PrepareDownloadFile(PrepareDownloadFileTask),
}

impl SyncTask {
    /// Human-friendly task description.
    pub fn description(&self) -> String {
        match self {
            SyncTask::DeleteLocalFile(task) => task.description(),
            SyncTask::DownloadFile(task) => task.description(),
            SyncTask::PrepareDownloadFile(task) => task.description(),
        }
    }

    /// The object this task reads or writes.
    pub fn object_id(&self) -> &ObjectId {
        match self {
            SyncTask::DeleteLocalFile(task) => &task.object_id,
            SyncTask::DownloadFile(task) => &task.object_id,
            SyncTask::PrepareDownloadFile(task) => &task.object_id,
        }
    }

    pub async fn execute(self, ctx: &SyncContext) -> SyncResult<()> {
        match self {
            SyncTask::DeleteLocalFile(task) => task.execute(ctx).await,
            SyncTask::DownloadFile(task) => task.execute(ctx).await,
            SyncTask::PrepareDownloadFile(task) => task.execute(ctx).await,
        }
    }
}

impl From<DeleteLocalFileTask> for SyncTask {
    fn from(task: DeleteLocalFileTask) -> Self {
        SyncTask::DeleteLocalFile(task)
    }
}

impl From<DownloadFileTask> for SyncTask {
    fn from(task: DownloadFileTask) -> Self {
        SyncTask::DownloadFile(task)
    }
}

impl From<PrepareDownloadFileTask> for SyncTask {
    fn from(task: PrepareDownloadFileTask) -> Self {
        SyncTask::PrepareDownloadFile(task)
    }
}

/// Deletes an object's file from local storage unless it is still protected.
pub struct DeleteLocalFileTask {
    uploads_directory: PathBuf,
    object_id: ObjectId,
}

impl DeleteLocalFileTask {
    pub fn new(uploads_directory: impl Into<PathBuf>, object_id: ObjectId) -> Self {
        Self {
            uploads_directory: uploads_directory.into(),
            object_id,
        }
    }

    pub fn description(&self) -> String {
        format!("Cleanup - deleting local file: {} ....", self.object_id)
    }

    /// Skips (successfully) new and pinned objects. A missing file is an
    /// error: the cache claimed the object was present.
    pub async fn execute(self, ctx: &SyncContext) -> SyncResult<()> {
        if ctx.cache.is_new(&self.object_id) {
            warn!(
                "Cleanup - possible ledger update delay (new file) - deleting file canceled: {}",
                self.object_id
            );
            return Ok(());
        }

        if ctx
            .cache
            .get(&self.object_id)
            .is_some_and(|entry| entry.is_pinned())
        {
            warn!(
                "Cleanup - the data object is currently in use - file deletion canceled: {}",
                self.object_id
            );
            return Ok(());
        }

        let path = self.uploads_directory.join(self.object_id.as_str());
        fs::remove_file(&path)
            .await
            .map_err(|source| SyncError::DeleteFile {
                path: path.clone(),
                source,
            })?;

        ctx.cache.remove(&self.object_id);
        debug!("Cleanup - deleted {}", path.display());
        Ok(())
    }
}

/// Downloads one object from one peer, verifies it and commits it.
pub struct DownloadFileTask {
    object_id: ObjectId,
    expected_hash: Option<String>,
    url: Url,
    settings: TransferSettings,
}

impl DownloadFileTask {
    /// `peer` is the API root of the node to fetch from; the object URL is
    /// derived from it. An empty expected hash counts as unknown.
    pub fn new(
        peer: &PeerUrl,
        object_id: ObjectId,
        expected_hash: Option<String>,
        settings: TransferSettings,
    ) -> Self {
        let url = peers::object_url(peer, &object_id);
        Self {
            object_id,
            expected_hash: expected_hash.filter(|hash| !hash.trim().is_empty()),
            url,
            settings,
        }
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn expected_hash(&self) -> Option<&str> {
        self.expected_hash.as_deref()
    }

    pub fn description(&self) -> String {
        format!(
            "Sync - downloading file: {} to {} ....",
            self.url,
            self.settings.uploads_directory.display()
        )
    }

    /// Transport, status and digest failures are logged and cleaned up here;
    /// they never reach the runner.
    pub async fn execute(self, ctx: &SyncContext) -> SyncResult<()> {
        if self.expected_hash.is_none() && ctx.missing_digest == MissingDigestPolicy::Reject {
            return Err(SyncError::MissingDigest(self.object_id.to_string()));
        }

        let file_path = self.settings.uploads_directory.join(self.object_id.as_str());
        // Partial downloads only ever exist under a fresh name in the temp
        // directory, so a crash never leaves them at the final path.
        let temp_path = self
            .settings
            .temp_directory
            .join(Uuid::new_v4().to_string());

        match self.download_and_commit(ctx, &temp_path, &file_path).await {
            Ok(()) => {
                ctx.cache.add(&self.object_id);
                info!("Sync - downloaded {} from {}", self.object_id, self.url);
            }
            Err(err) => {
                if err.is_timeout() {
                    error!("Sync - download timed out for {}: {}", self.url, err);
                } else {
                    error!("Sync - fetching data error for {}: {}", self.url, err);
                }
                warn!("Cleaning up file {}", temp_path.display());
                match fs::remove_file(&temp_path).await {
                    Ok(()) => {}
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => {
                        error!("Sync - cannot cleanup file {}: {}", temp_path.display(), err)
                    }
                }
            }
        }

        Ok(())
    }

    async fn download_and_commit(
        &self,
        ctx: &SyncContext,
        temp_path: &Path,
        file_path: &Path,
    ) -> SyncResult<()> {
        let mut file = File::create(temp_path).await?;

        let response = ctx
            .http
            .get(self.url.clone())
            .timeout(self.settings.download_timeout)
            .header(HOST_ID_HEADER, &self.settings.host_id)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::PeerStatus {
                url: self.url.to_string(),
                status: status.as_u16(),
            });
        }

        // Body errors after the headers (aborted connection, deadline) come
        // out of the stream itself.
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        self.verify_downloaded_file(ctx.digest_algorithm, temp_path)
            .await?;

        if let Err(err) = fs::rename(temp_path, file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(file_path).await?;
                fs::rename(temp_path, file_path).await?;
            } else {
                return Err(SyncError::Io(err));
            }
        }

        Ok(())
    }

    async fn verify_downloaded_file(
        &self,
        algorithm: DigestAlgorithm,
        path: &Path,
    ) -> SyncResult<()> {
        let Some(expected) = self.expected_hash.as_deref() else {
            debug!(
                "Sync - no expected hash for {}, skipping verification",
                self.object_id
            );
            return Ok(());
        };

        let actual = hashing::hash_file(path, algorithm).await?;
        if !hashing::digests_match(expected, &actual) {
            return Err(SyncError::HashMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }
}

/// Finds a peer that holds an object and hands a [`DownloadFileTask`] for it
/// to the queue.
pub struct PrepareDownloadFileTask {
    object_id: ObjectId,
    bag_id: String,
    candidates: Arc<[PeerUrl]>,
    settings: TransferSettings,
    sink: TaskQueue,
}

impl PrepareDownloadFileTask {
    /// `candidates` is shared between many tasks and never modified.
    pub fn new(
        candidates: Arc<[PeerUrl]>,
        bag_id: impl Into<String>,
        object_id: ObjectId,
        settings: TransferSettings,
        sink: TaskQueue,
    ) -> Self {
        Self {
            object_id,
            bag_id: bag_id.into(),
            candidates,
            settings,
            sink,
        }
    }

    pub fn description(&self) -> String {
        format!("Sync - preparing for download of: {} ....", self.object_id)
    }

    /// Each candidate is tried at most once, in random order. Running out of
    /// candidates is not an error; the next sync pass tries again.
    pub async fn execute(self, ctx: &SyncContext) -> SyncResult<()> {
        if self.bag_id.trim().is_empty() {
            error!("Sync - invalid task - no bagId for {}", self.object_id);
            return Ok(());
        }
        let bag_id = BagId::parse(self.bag_id.trim())?;

        let mut remaining: Vec<usize> = (0..self.candidates.len()).collect();
        while !remaining.is_empty() {
            let Some(index) = pick_random(&remaining) else {
                warn!("Sync - cannot get a random URL");
                break;
            };
            remaining.retain(|candidate| *candidate != index);

            let peer = &self.candidates[index];
            debug!("Sync - random storage node URL was chosen {}", peer);

            let (held, expected_hash) = futures::join!(
                ctx.peers.list_held_objects(peer, &self.settings.host_id),
                self.resolve_expected_hash(ctx, &bag_id),
            );

            match held {
                Ok(held) if held.iter().any(|id| id == self.object_id.as_str()) => {
                    let task = DownloadFileTask::new(
                        peer,
                        self.object_id.clone(),
                        expected_hash,
                        self.settings.clone(),
                    );
                    return self.sink.add([SyncTask::from(task)]);
                }
                Ok(_) => debug!(
                    "Sync - {} does not hold {}, trying next candidate",
                    peer, self.object_id
                ),
                Err(err) => error!(
                    "Sync - fetching data error for {} from {}: {}",
                    self.object_id, peer, err
                ),
            }
        }

        warn!("Sync - cannot get operator URLs for {}", self.object_id);
        Ok(())
    }

    /// Registry failures degrade to "unknown digest".
    async fn resolve_expected_hash(&self, ctx: &SyncContext, bag_id: &BagId) -> Option<String> {
        let registry = ctx.registry.as_ref()?;
        match registry
            .resolve_expected_hash(bag_id, &self.object_id)
            .await
        {
            Ok(hash) => hash,
            Err(err) => {
                warn!(
                    "Sync - cannot resolve expected hash for {} in {}: {}",
                    self.object_id, bag_id, err
                );
                None
            }
        }
    }
}

fn pick_random(indices: &[usize]) -> Option<usize> {
    indices.choose(&mut rand::rng()).copied()
}
