//! On-disk message queue.
//!
//! One file per pending message, named `{id}.eml` and holding the message
//! verbatim. The queue directory is the only channel between the enqueuer and
//! the worker.
//!
//! # Atomicity
//! Writes go to `.tmp_{id}.eml`, are synced, then renamed into place. A reader
//! either sees the complete file or nothing at all, even across crashes.

mod types;

use std::{
    io::{Error, ErrorKind},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tokio::{fs, io::AsyncWriteExt};

pub use types::{QUEUE_SUFFIX, QueueId, TEMP_PREFIX};

use crate::{
    error::{RelayError, Result},
    incoming, internal,
    message::recipient_of,
};

/// Temporary files older than this are left over from a crashed enqueue
const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
pub struct Queue {
    path: PathBuf,
}

impl Queue {
    /// Open the queue directory, creating it if it does not exist yet.
    ///
    /// # Errors
    /// - If the directory cannot be created
    /// - If the path exists but is not a directory
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if !path.try_exists().map_err(|e| RelayError::fs(&path, e))? {
            internal!("{} does not exist, creating...", path.display());
            std::fs::create_dir_all(&path).map_err(|e| RelayError::fs(&path, e))?;
        } else if !path.is_dir() {
            return Err(RelayError::fs(
                &path,
                Error::new(
                    ErrorKind::NotADirectory,
                    format!(
                        "Expected {} to be a Directory, but it is not",
                        path.display()
                    ),
                ),
            ));
        }

        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full path of the queue file for `id`
    #[must_use]
    pub fn file_path(&self, id: &QueueId) -> PathBuf {
        self.path.join(id.filename())
    }

    /// Publish a raw message into the queue and return its identifier.
    ///
    /// The `To` header is only read for the log line; a message whose headers
    /// do not parse is still queued, since delivery parses it again anyway.
    ///
    /// # Errors
    /// If the queue directory is not writable
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn enqueue(&self, data: &[u8]) -> Result<QueueId> {
        let id = QueueId::generate();
        let data_path = self.file_path(&id);

        if fs::try_exists(&data_path).await.unwrap_or(false) {
            return Err(RelayError::fs(
                &data_path,
                Error::new(ErrorKind::AlreadyExists, format!("Queue id collision: {id}")),
            ));
        }

        let temp_path = self.path.join(id.temp_filename());
        if let Err(e) = write_synced(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(RelayError::fs(&temp_path, e));
        }

        fs::rename(&temp_path, &data_path)
            .await
            .map_err(|e| RelayError::fs(&data_path, e))?;

        let to = recipient_of(data).unwrap_or_default();
        incoming!(
            level = INFO,
            "Saved to queue To: {to} - {}",
            data_path.display()
        );

        Ok(id)
    }

    /// List queued messages in filename order.
    ///
    /// Temporary files and anything not ending in `.eml` are skipped.
    ///
    /// # Errors
    /// If the directory cannot be read
    pub async fn list(&self) -> Result<Vec<QueueId>> {
        let mut entries = fs::read_dir(&self.path)
            .await
            .map_err(|e| RelayError::fs(&self.path, e))?;
        let mut ids = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RelayError::fs(&self.path, e))?
        {
            let filename = entry.file_name();
            let filename = filename.to_string_lossy();
            match QueueId::from_filename(&filename) {
                Some(id) => ids.push(id),
                None if filename.ends_with(QUEUE_SUFFIX) && !filename.starts_with(TEMP_PREFIX) => {
                    tracing::warn!("Skipping queue file with unusable name: {filename}");
                }
                None => {}
            }
        }

        ids.sort_by_cached_key(QueueId::filename);

        internal!(level = DEBUG, "Found {} messages in queue", ids.len());

        Ok(ids)
    }

    /// Read the raw bytes of a queued message.
    ///
    /// # Errors
    /// If the file is missing or unreadable
    pub async fn read(&self, id: &QueueId) -> Result<Vec<u8>> {
        let path = self.file_path(id);
        fs::read(&path).await.map_err(|e| RelayError::fs(&path, e))
    }

    /// Remove a delivered message.
    ///
    /// # Errors
    /// If the file cannot be removed, including when it is already gone
    pub async fn remove(&self, id: &QueueId) -> Result<()> {
        let path = self.file_path(id);
        fs::remove_file(&path)
            .await
            .map_err(|e| RelayError::fs(&path, e))
    }

    /// Remove temporary files abandoned by an enqueue that crashed mid-write.
    ///
    /// Only files older than an hour are touched, so a concurrent enqueue is
    /// never disturbed.
    ///
    /// # Errors
    /// If the directory cannot be read
    pub async fn cleanup_stale_temp_files(&self) -> Result<usize> {
        let mut entries = fs::read_dir(&self.path)
            .await
            .map_err(|e| RelayError::fs(&self.path, e))?;
        let now = SystemTime::now();
        let mut cleaned = 0;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RelayError::fs(&self.path, e))?
        {
            if !entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                continue;
            }

            let stale = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .is_ok_and(|modified| {
                    now.duration_since(modified).unwrap_or_default() >= STALE_TEMP_AGE
                });

            if stale && fs::remove_file(entry.path()).await.is_ok() {
                cleaned += 1;
            }
        }

        if cleaned > 0 {
            internal!(
                level = INFO,
                "Cleaned up {cleaned} abandoned temporary files from queue"
            );
        }

        Ok(cleaned)
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await
}
