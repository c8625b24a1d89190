//! Startup housekeeping for the uploads and temp directories.

use crate::models::ObjectId;
use crate::services::cache::ObjectCache;
use std::{
    io::{self, ErrorKind},
    path::Path,
};
use tokio::fs;
use tracing::{debug, info, warn};

/// Create `dir` (and parents) if it does not exist yet.
pub async fn ensure_directory(dir: &Path) -> io::Result<()> {
    if fs::try_exists(dir).await? {
        return Ok(());
    }
    fs::create_dir_all(dir).await?;
    info!("Created directory {}", dir.display());
    Ok(())
}

/// Register every committed object found in `uploads_dir`.
///
/// Only regular files whose names are valid object ids count; anything else
/// is left alone and logged. Returns the number of objects registered.
pub async fn load_local_objects(uploads_dir: &Path, cache: &dyn ObjectCache) -> io::Result<usize> {
    let mut entries = fs::read_dir(uploads_dir).await?;
    let mut loaded = 0;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match ObjectId::parse(name) {
            Ok(id) => {
                cache.add(&id);
                loaded += 1;
            }
            Err(err) => warn!("Skipping unexpected file in uploads directory: {}", err),
        }
    }
    info!("Loaded {} local objects from {}", loaded, uploads_dir.display());
    Ok(loaded)
}

/// Delete leftovers of downloads interrupted by a crash.
///
/// Nothing in the temp directory is ever a committed object, so every
/// regular file there is stale at startup. Returns the number removed.
pub async fn clear_temp_directory(temp_dir: &Path) -> io::Result<usize> {
    let mut entries = fs::read_dir(temp_dir).await?;
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        match fs::remove_file(&path).await {
            Ok(_) => {
                debug!("removed stale temp file {}", path.display());
                removed += 1;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!("Cannot remove stale temp file {}: {}", path.display(), err),
        }
    }
    if removed > 0 {
        info!("Removed {} stale temp files from {}", removed, temp_dir.display());
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cache::LocalObjectCache;
    use std::time::Duration;

    #[tokio::test]
    async fn ensure_directory_creates_nested_paths() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a/b/c");
        ensure_directory(&nested).await.unwrap();
        assert!(nested.is_dir());
        ensure_directory(&nested).await.unwrap();
    }

    #[tokio::test]
    async fn loads_only_valid_object_files() {
        let uploads = tempfile::tempdir().unwrap();
        fs::write(uploads.path().join("1"), b"one").await.unwrap();
        fs::write(uploads.path().join("2"), b"two").await.unwrap();
        fs::write(uploads.path().join("bad\tname"), b"x").await.unwrap();
        fs::create_dir(uploads.path().join("subdir")).await.unwrap();

        let cache = LocalObjectCache::new(Duration::from_secs(60));
        let loaded = load_local_objects(uploads.path(), &cache).await.unwrap();

        assert_eq!(loaded, 2);
        assert_eq!(
            cache.object_ids(),
            vec![ObjectId::parse("1").unwrap(), ObjectId::parse("2").unwrap()]
        );
    }

    #[tokio::test]
    async fn clears_stale_temp_files() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("a"), b"partial").await.unwrap();
        fs::write(temp.path().join("b"), b"partial").await.unwrap();
        fs::create_dir(temp.path().join("keep")).await.unwrap();

        assert_eq!(clear_temp_directory(temp.path()).await.unwrap(), 2);
        assert!(!temp.path().join("a").exists());
        assert!(temp.path().join("keep").is_dir());
        assert_eq!(clear_temp_directory(temp.path()).await.unwrap(), 0);
    }
}
