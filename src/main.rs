use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use storage_sync::{
    DeleteLocalFileTask, HttpPeerClient, LocalObjectCache, MetadataClient, PeerUrl, PinnedDigests,
    PrepareDownloadFileTask, SyncContext, SyncTask, TaskQueue, TransferSettings,
    services::local_storage,
};
use tracing_subscriber::EnvFilter;

mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting storage-sync with config: {:?}", cfg);

    // --- Ensure directories exist and drop leftovers of interrupted downloads ---
    local_storage::ensure_directory(&cfg.uploads_dir).await?;
    local_storage::ensure_directory(&cfg.temp_dir).await?;
    local_storage::clear_temp_directory(&cfg.temp_dir)
        .await
        .context("clearing temp directory")?;

    // --- Local object cache ---
    let cache = Arc::new(LocalObjectCache::new(Duration::from_secs(
        cfg.new_object_ttl_secs,
    )));
    local_storage::load_local_objects(&cfg.uploads_dir, cache.as_ref())
        .await
        .context("scanning uploads directory")?;

    // --- Collaborators ---
    let http = reqwest::Client::builder()
        .build()
        .context("building HTTP client")?;
    let peers = Arc::new(HttpPeerClient::new(
        http.clone(),
        Duration::from_secs(cfg.peer_timeout_secs),
    ));
    let pinned = PinnedDigests::new(cfg.expected_hashes.iter().cloned());
    let registry: Option<Arc<dyn MetadataClient>> = if pinned.is_empty() {
        None
    } else {
        Some(Arc::new(pinned))
    };

    let context = Arc::new(SyncContext {
        cache,
        http,
        peers,
        registry,
        digest_algorithm: cfg.digest_algorithm,
        missing_digest: cfg.missing_digest,
    });

    // --- Queue the requested work ---
    let (queue, runner) = TaskQueue::new(cfg.max_concurrency, context);
    let runner = tokio::spawn(runner.run());

    let settings = TransferSettings::with_timeout_minutes(
        &cfg.uploads_dir,
        &cfg.temp_dir,
        cfg.download_timeout_minutes,
        cfg.host_id.clone(),
    );
    let candidates: Arc<[PeerUrl]> = cfg.peers.iter().cloned().collect();

    let mut tasks: Vec<SyncTask> = Vec::new();
    for object_id in &cfg.delete {
        tasks.push(DeleteLocalFileTask::new(&cfg.uploads_dir, object_id.clone()).into());
    }
    for request in &cfg.fetch {
        tasks.push(
            PrepareDownloadFileTask::new(
                candidates.clone(),
                request.bag_id.clone(),
                request.object_id.clone(),
                settings.clone(),
                queue.clone(),
            )
            .into(),
        );
    }

    if tasks.is_empty() {
        tracing::warn!("No --fetch or --delete work items given; nothing to do");
    }
    tracing::info!("Submitting {} sync tasks", tasks.len());
    queue.add(tasks)?;
    drop(queue);

    let summary = runner.await.context("sync task runner crashed")?;
    tracing::info!(
        "Sync pass finished: {} completed, {} failed",
        summary.completed,
        summary.failed
    );

    Ok(())
}
