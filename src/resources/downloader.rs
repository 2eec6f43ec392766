//! Streaming resource downloader
//!
//! Each resource goes through:
//! 1. HEAD request to read the declared size (a failed HEAD is not fatal)
//! 2. GET request streamed into a `.part` file, aborting once the cap is passed
//! 3. Size verification and rename into the final destination
//!
//! A failure never leaves a partial file behind and never aborts the batch.

use crate::config::ResourceConfig;
use crate::resources::filename::{derive_filename, FilenameRegistry};
use crate::resources::{DownloadState, ResourceRecord};
use crate::{FetchError, FetchOutcomeResult};
use futures::stream::{self, StreamExt};
use reqwest::header::CONTENT_LENGTH;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Downloads resources under a size cap and a bounded concurrency pool
pub struct ResourceDownloader {
    client: Client,
    max_size_bytes: u64,
    concurrency: usize,
    batch_size: usize,
    batch_delay: Duration,
    timeout: Duration,
    registry: Mutex<FilenameRegistry>,
}

impl ResourceDownloader {
    /// Creates a downloader sharing the crawler's HTTP client
    pub fn new(client: Client, config: &ResourceConfig) -> Self {
        Self {
            client,
            max_size_bytes: config.max_size_bytes,
            concurrency: config.concurrency.max(1),
            batch_size: config.batch_size.max(1),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            timeout: Duration::from_millis(config.timeout_ms),
            registry: Mutex::new(FilenameRegistry::new()),
        }
    }

    /// Downloads a list of resources into `destination_root`
    ///
    /// Resources are processed in batches. Within a batch at most `concurrency`
    /// downloads run at once, and batches are separated by the configured delay.
    /// Records that are already terminal are returned untouched. The returned
    /// list has the same order as the input.
    ///
    /// # Arguments
    ///
    /// * `resources` - The records to download
    /// * `destination_root` - Session directory; kind subdirectories are created below it
    /// * `cancel` - Stops starting new batches when triggered
    pub async fn download_batch(
        &self,
        resources: Vec<ResourceRecord>,
        destination_root: &Path,
        cancel: &CancellationToken,
    ) -> Vec<ResourceRecord> {
        let total = resources.len();
        let mut finished: Vec<Option<ResourceRecord>> = vec![None; total];
        let indexed: Vec<(usize, ResourceRecord)> = resources.into_iter().enumerate().collect();

        for (batch_index, chunk) in indexed.chunks(self.batch_size).enumerate() {
            if batch_index > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.batch_delay) => {}
                }
            }

            if cancel.is_cancelled() {
                for (index, record) in chunk {
                    finished[*index] = Some(record.clone());
                }
                continue;
            }

            let results: Vec<(usize, ResourceRecord)> = stream::iter(chunk.iter().cloned())
                .map(|(index, record)| async move {
                    (index, self.download_one(record, destination_root).await)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for (index, record) in results {
                finished[index] = Some(record);
            }

            tracing::debug!(
                batch = batch_index + 1,
                done = finished.iter().filter(|r| r.is_some()).count(),
                total,
                "Resource batch finished"
            );
        }

        finished.into_iter().flatten().collect()
    }

    /// Downloads a single resource and returns its updated record
    pub async fn download_one(
        &self,
        mut record: ResourceRecord,
        destination_root: &Path,
    ) -> ResourceRecord {
        if record.download_state.is_terminal() {
            return record;
        }

        let url = match Url::parse(&record.url) {
            Ok(url) => url,
            Err(e) => {
                record.fail("invalid_url", format!("invalid URL: {}", e));
                return record;
            }
        };

        let dir = destination_root.join(record.kind.subdir());
        let destination = {
            let mut registry = self
                .registry
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            registry.claim(&dir, &derive_filename(&url), &record.url)
        };
        record.destination_path = Some(destination.clone());
        record.download_state = DownloadState::Downloading;

        let result = tokio::time::timeout(self.timeout, self.fetch_to_file(&url, &destination))
            .await
            .unwrap_or(Err(FetchError::Timeout {
                elapsed_ms: self.timeout.as_millis() as u64,
            }));

        match result {
            Ok(bytes) => {
                tracing::debug!(url = %record.url, bytes, "Resource downloaded");
                record.byte_size = bytes;
                record.download_state = DownloadState::Done;
            }
            Err(e) => {
                tracing::warn!(url = %record.url, error = %e, "Resource download failed");
                remove_partial(&destination).await;
                record.fail(e.kind(), e.to_string());
            }
        }

        record
    }

    /// HEAD size check, then streamed GET into `<destination>.part`, then rename
    async fn fetch_to_file(&self, url: &Url, destination: &Path) -> FetchOutcomeResult<u64> {
        match self.client.head(url.clone()).send().await {
            Ok(head) if head.status().is_success() => {
                check_declared_size(declared_length(&head), self.max_size_bytes)?;
            }
            Ok(head) => {
                tracing::trace!(url = %url, status = head.status().as_u16(), "HEAD not usable");
            }
            Err(e) => {
                tracing::trace!(url = %url, error = %e, "HEAD failed, continuing with GET");
            }
        }

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::from_status(status.as_u16()));
        }
        check_declared_size(declared_length(&response), self.max_size_bytes)?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_error)?;
        }

        let part = part_path(destination);
        let mut file = tokio::fs::File::create(&part).await.map_err(write_error)?;
        let mut written: u64 = 0;
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            written += chunk.len() as u64;
            if written > self.max_size_bytes {
                return Err(FetchError::SizeExceeded {
                    actual: written,
                    limit: self.max_size_bytes,
                });
            }
            file.write_all(&chunk).await.map_err(write_error)?;
        }

        file.flush().await.map_err(write_error)?;
        file.sync_all().await.map_err(write_error)?;
        drop(file);

        let on_disk = tokio::fs::metadata(&part).await.map_err(write_error)?.len();
        if on_disk != written {
            return Err(FetchError::Content {
                message: format!("incomplete write: {} of {} bytes", on_disk, written),
            });
        }

        tokio::fs::rename(&part, destination)
            .await
            .map_err(write_error)?;

        Ok(written)
    }
}

/// Rejects a resource whose declared size is over the cap
///
/// An unknown size passes; the streamed byte count is checked later.
pub fn check_declared_size(declared: Option<u64>, limit: u64) -> FetchOutcomeResult<()> {
    match declared {
        Some(actual) if actual > limit => Err(FetchError::SizeExceeded { actual, limit }),
        _ => Ok(()),
    }
}

/// Reads the Content-Length header directly; HEAD responses carry no body to size
fn declared_length(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

async fn remove_partial(destination: &Path) {
    let part = part_path(destination);
    if let Err(e) = tokio::fs::remove_file(&part).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %part.display(), error = %e, "Failed to remove partial file");
        }
    }
}

fn write_error(err: std::io::Error) -> FetchError {
    FetchError::Content {
        message: format!("write failed: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_size_over_limit() {
        let result = check_declared_size(Some(2048), 1024);
        assert_eq!(
            result,
            Err(FetchError::SizeExceeded {
                actual: 2048,
                limit: 1024
            })
        );
    }

    #[test]
    fn test_declared_size_at_limit_passes() {
        assert!(check_declared_size(Some(1024), 1024).is_ok());
    }

    #[test]
    fn test_unknown_size_passes() {
        assert!(check_declared_size(None, 1).is_ok());
    }

    #[test]
    fn test_part_path() {
        let part = part_path(Path::new("/tmp/session/images/logo.png"));
        assert_eq!(part, PathBuf::from("/tmp/session/images/logo.png.part"));
    }
}
