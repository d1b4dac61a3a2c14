use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use futures_util::{Stream, TryStreamExt};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use signage_core::media;
use signage_db::Database;
use uuid::Uuid;

/// Read buffer used while streaming uploads to disk.
const COPY_BUF_SIZE: usize = 64 * 1024;

/// An object written to storage.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Object name relative to the storage root.
    pub path: String,
    pub url: String,
    pub size: u64,
    pub sha256: String,
}

/// Raised when an upload grows past the configured limit.
#[derive(Debug, thiserror::Error)]
#[error("upload exceeds {limit} bytes")]
pub struct TooLarge {
    pub limit: u64,
}

/// Flat on-disk object store served under `/media`.
///
/// Objects live at `{dir}/{prefix}/{millis}-{id}-{file name}` and are reachable at
/// `{public_url}/media/{prefix}/{millis}-{id}-{file name}`.
pub struct Storage {
    dir: PathBuf,
    public_url: String,
}

impl Storage {
    pub async fn new(dir: PathBuf, public_url: &str) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Media storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    pub fn file_path(&self, path: &str) -> PathBuf {
        self.dir.join(path)
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/media/{}", self.public_url, path)
    }

    /// Stream `body` into a new object under `prefix`, hashing as it goes.
    /// Nothing is left behind if the body fails or exceeds `max_bytes`.
    pub async fn put<S, E>(&self, prefix: &str, file_name: &str, body: S, max_bytes: u64) -> Result<StoredObject>
    where
        S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if prefix.is_empty() || prefix.contains(['/', '\\', '.']) {
            bail!("invalid storage prefix '{}'", prefix);
        }

        let object = media::object_name(chrono::Utc::now().timestamp_millis(), Uuid::new_v4(), file_name);
        let path = format!("{}/{}", prefix, object);
        let full_path = self.file_path(&path);
        fs::create_dir_all(self.dir.join(prefix)).await?;
        // Never reuse an existing object.
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full_path)
            .await?;

        match write_stream(file, body, max_bytes).await {
            Ok((size, sha256)) => {
                debug!("Stored {} ({})", path, media::format_bytes(size));
                Ok(StoredObject {
                    url: self.public_url(&path),
                    path,
                    size,
                    sha256,
                })
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(&full_path).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial upload {}: {}", path, rm);
                    }
                }
                Err(e)
            }
        }
    }

    /// Delete an object. A missing object is not an error.
    pub async fn delete(&self, path: &str) -> Result<()> {
        if path.split(['/', '\\']).any(|part| part == "..") {
            bail!("refusing to delete '{}'", path);
        }
        match fs::remove_file(self.file_path(path)).await {
            Ok(()) => {
                info!("Deleted media object {}", path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Media object {} already gone", path);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete several objects, logging failures instead of returning them.
    pub async fn delete_all(&self, paths: &[String]) {
        for path in paths {
            if let Err(e) = self.delete(path).await {
                warn!("Failed to delete media object {}: {}", path, e);
            }
        }
    }
}

async fn write_stream<S, E>(mut file: fs::File, body: S, max_bytes: u64) -> Result<(u64, String)>
where
    S: Stream<Item = Result<bytes::Bytes, E>> + Unpin,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let mut reader = StreamReader::new(body.map_err(std::io::Error::other));
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut size: u64 = 0;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        size += n as u64;
        if size > max_bytes {
            return Err(TooLarge { limit: max_bytes }.into());
        }
        hasher.update(&buf[..n]);
        file.write_all(&buf[..n]).await?;
    }
    file.flush().await?;

    Ok((size, hex::encode(hasher.finalize())))
}

/// Background task that prunes screenshots older than `retention_hours`.
pub async fn run_cleanup_loop(db: Arc<Database>, storage: Arc<Storage>, retention_hours: u64, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match cleanup_expired(&db, &storage, retention_hours).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: pruned {} expired screenshots", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {}", e);
            }
        }
    }
}

pub async fn cleanup_expired(db: &Arc<Database>, storage: &Storage, retention_hours: u64) -> Result<usize> {
    let lookup = db.clone();
    let expired = tokio::task::spawn_blocking(move || lookup.expired_screenshots(retention_hours)).await??;

    let count = expired.len();
    for shot in expired {
        storage.delete(&shot.storage_path).await.ok();

        let db = db.clone();
        tokio::task::spawn_blocking(move || db.delete_screenshot(&shot.id)).await??;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures_util::stream;

    fn body(chunks: &[&'static str]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        stream::iter(
            chunks
                .iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn put_hashes_and_serves_under_media() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf(), "http://cdn.test/").await.unwrap();

        let stored = storage
            .put("contents", "my clip.mp4", body(&["hello ", "world"]), 1024)
            .await
            .unwrap();

        assert_eq!(stored.size, 11);
        assert_eq!(
            stored.sha256,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert!(stored.path.starts_with("contents/"));
        assert!(stored.path.ends_with("-my_clip.mp4"));
        assert_eq!(stored.url, format!("http://cdn.test/media/{}", stored.path));
        assert_eq!(std::fs::read(storage.file_path(&stored.path)).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn oversized_upload_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf(), "http://cdn.test").await.unwrap();

        let err = storage
            .put("contents", "big.bin", body(&["0123456789", "0123456789"]), 15)
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<TooLarge>().is_some());
        assert_eq!(std::fs::read_dir(dir.path().join("contents")).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn same_name_uploads_never_share_an_object() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf(), "http://cdn.test").await.unwrap();

        let mut paths = std::collections::HashSet::new();
        for i in 0..50 {
            let first = storage
                .put("contents", "menu.png", body(&["first"]), 1024)
                .await
                .unwrap();
            let second = storage
                .put("contents", "menu.png", body(&["second"]), 1024)
                .await
                .unwrap();
            assert_ne!(first.path, second.path, "round {}", i);
            assert_eq!(std::fs::read(storage.file_path(&first.path)).unwrap(), b"first");
            assert_eq!(std::fs::read(storage.file_path(&second.path)).unwrap(), b"second");
            assert!(paths.insert(first.path));
            assert!(paths.insert(second.path));
        }

        storage.delete(paths.iter().next().unwrap()).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path().join("contents")).unwrap().count(), 99);
    }

    #[tokio::test]
    async fn delete_tolerates_missing_objects() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf(), "http://cdn.test").await.unwrap();
        storage.delete("contents/nope.png").await.unwrap();
        assert!(storage.delete("../etc/passwd").await.is_err());
    }
}
