//! Durable offline queue for receipts that could not be saved remotely.
//!
//! Each item is one JSON file named `<enqueued_at>-<id>.json`, written to a
//! temporary file, synced, then renamed into place and the directory synced,
//! so a reader never sees a partial item. Items are never rewritten; the drain process removes them
//! once the remote save is confirmed.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::models::{CapturedImage, OfflineQueueItem};

const IMAGES_DIR: &str = "images";

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Queue serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Storage shared by the capture pipeline (append) and the drain process.
#[async_trait]
pub trait OfflineStore: Send + Sync {
    /// Persist `item` atomically and return it as stored (timestamp and
    /// image reference filled in).
    async fn append(&self, item: OfflineQueueItem) -> Result<OfflineQueueItem, QueueError>;

    /// Every pending item, oldest first.
    async fn drain_all(&self) -> Result<Vec<OfflineQueueItem>, QueueError>;

    async fn remove(&self, item: &OfflineQueueItem) -> Result<(), QueueError>;
}

pub struct FileQueue {
    dir: PathBuf,
    last_stamp: Mutex<i64>,
}

impl FileQueue {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(dir.join(IMAGES_DIR)).await?;

        let mut last_stamp = 0;
        for name in item_file_names(&dir).await? {
            if let Some(stamp) = name.split('-').next().and_then(|s| s.parse::<i64>().ok()) {
                last_stamp = last_stamp.max(stamp);
            }
        }

        tracing::info!(dir = %dir.display(), "Offline queue opened");
        Ok(Self {
            dir,
            last_stamp: Mutex::new(last_stamp),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn item_path(&self, item: &OfflineQueueItem) -> PathBuf {
        self.dir
            .join(format!("{:020}-{}.json", item.enqueued_at, item.id))
    }

    /// Copy the captured image next to the queue; the original stays with
    /// the capture session.
    async fn copy_image(&self, item: &OfflineQueueItem, image: &CapturedImage) -> Option<CapturedImage> {
        let ext = image
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "jpg".to_string());
        let target = self.dir.join(IMAGES_DIR).join(format!("{}.{}", item.id, ext));

        match tokio::fs::copy(&image.path, &target).await {
            Ok(_) => Some(CapturedImage::new(target, image.source)),
            Err(e) => {
                tracing::warn!(
                    id = %item.id,
                    path = %image.path.display(),
                    error = %e,
                    "Could not copy receipt image into offline queue; keeping original reference"
                );
                None
            }
        }
    }

    fn owns_image(&self, image: &CapturedImage) -> bool {
        image.path.starts_with(self.dir.join(IMAGES_DIR))
    }
}

#[async_trait]
impl OfflineStore for FileQueue {
    async fn append(&self, mut item: OfflineQueueItem) -> Result<OfflineQueueItem, QueueError> {
        let mut last_stamp = self.last_stamp.lock().await;
        item.enqueued_at = Utc::now().timestamp_micros().max(*last_stamp + 1);

        let mut copied = None;
        if let Some(image) = item.image.clone() {
            copied = self.copy_image(&item, &image).await;
            if let Some(copy) = &copied {
                item.image = Some(copy.clone());
            }
        }

        let path = self.item_path(&item);
        let tmp = path.with_extension("json.tmp");
        let written = async {
            let bytes = serde_json::to_vec_pretty(&item)?;
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, &path).await?;
            sync_dir(&self.dir).await?;
            Ok::<(), QueueError>(())
        }
        .await;

        if let Err(e) = written {
            tracing::error!(id = %item.id, error = %e, "Failed to write offline queue item");
            let _ = tokio::fs::remove_file(&tmp).await;
            let _ = tokio::fs::remove_file(&path).await;
            if let Some(copy) = copied {
                let _ = tokio::fs::remove_file(&copy.path).await;
            }
            return Err(e);
        }

        *last_stamp = item.enqueued_at;
        tracing::info!(id = %item.id, local_id = %item.local_id, enqueued_at = item.enqueued_at, "Receipt queued offline");
        Ok(item)
    }

    async fn drain_all(&self) -> Result<Vec<OfflineQueueItem>, QueueError> {
        let mut items = Vec::new();
        for name in item_file_names(&self.dir).await? {
            let bytes = tokio::fs::read(self.dir.join(&name)).await?;
            match serde_json::from_slice::<OfflineQueueItem>(&bytes) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!(file = %name, error = %e, "Skipping unreadable queue item"),
            }
        }
        items.sort_by_key(|item| item.enqueued_at);
        Ok(items)
    }

    async fn remove(&self, item: &OfflineQueueItem) -> Result<(), QueueError> {
        remove_if_present(&self.item_path(item)).await?;
        if let Some(image) = item.image.as_ref().filter(|i| self.owns_image(i)) {
            remove_if_present(&image.path).await?;
        }
        tracing::debug!(id = %item.id, "Offline queue item removed");
        Ok(())
    }
}

/// Names of committed item files, sorted (zero-padded stamps sort in order).
async fn item_file_names(dir: &Path) -> Result<Vec<String>, QueueError> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".json") {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// Flush the directory entry so a completed rename survives a crash.
async fn sync_dir(dir: &Path) -> Result<(), QueueError> {
    tokio::fs::File::open(dir).await?.sync_all().await?;
    Ok(())
}

async fn remove_if_present(path: &Path) -> Result<(), QueueError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
