//! Crawl session aggregate
//!
//! One `CrawlSession` exists per crawl run. The coordinator owns it and hands
//! `Arc` handles to workers; nothing about a crawl lives in module-level state.

use crate::classify::ClassifiedRecord;
use crate::crawler::{FetchResult, Frontier};
use crate::resources::{DownloadState, ResourceRecord};
use crate::state::CrawlPhase;
use crate::FetchError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One entry of the session error log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub url: String,

    /// Error class label (`timeout`, `network`, `content`, ...)
    pub kind: String,

    pub reason: String,

    /// Phase the error was recorded in
    pub phase: CrawlPhase,

    pub at: DateTime<Utc>,
}

/// Resource records indexed by URL, in discovery order
#[derive(Debug, Default)]
struct ResourceInventory {
    records: Vec<ResourceRecord>,
    index: HashMap<String, usize>,
}

impl ResourceInventory {
    fn add(&mut self, record: ResourceRecord) -> bool {
        if self.index.contains_key(&record.url) {
            return false;
        }
        self.index.insert(record.url.clone(), self.records.len());
        self.records.push(record);
        true
    }

    fn update(&mut self, record: ResourceRecord) {
        match self.index.get(&record.url) {
            Some(&i) => self.records[i] = record,
            None => {
                self.add(record);
            }
        }
    }
}

/// Counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub pages_processed: usize,
    pub bytes_downloaded: u64,
    pub errors: usize,
}

/// All state of one crawl run
pub struct CrawlSession {
    id: String,
    started_at: DateTime<Utc>,
    config_hash: String,
    phase: Mutex<CrawlPhase>,
    phase_log: Mutex<Vec<(CrawlPhase, DateTime<Utc>)>>,
    frontier: Mutex<Frontier>,
    pages: Mutex<Vec<FetchResult>>,
    resources: Mutex<ResourceInventory>,
    records: Mutex<Vec<ClassifiedRecord>>,
    errors: Mutex<Vec<ErrorEntry>>,
    pages_processed: AtomicUsize,
    bytes_downloaded: AtomicU64,
    error_count: AtomicUsize,
}

/// Locks a mutex, recovering the data if a worker panicked while holding it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CrawlSession {
    /// Creates a session around an already seeded frontier
    ///
    /// # Arguments
    ///
    /// * `frontier` - The frontier the session takes ownership of
    /// * `config_hash` - Hash of the configuration the session runs with
    pub fn new(frontier: Frontier, config_hash: impl Into<String>) -> Self {
        let started_at = Utc::now();
        Self {
            id: started_at.format("%Y%m%d-%H%M%S-%3f").to_string(),
            started_at,
            config_hash: config_hash.into(),
            phase: Mutex::new(CrawlPhase::Initialized),
            phase_log: Mutex::new(vec![(CrawlPhase::Initialized, started_at)]),
            frontier: Mutex::new(frontier),
            pages: Mutex::new(Vec::new()),
            resources: Mutex::new(ResourceInventory::default()),
            records: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            pages_processed: AtomicUsize::new(0),
            bytes_downloaded: AtomicU64::new(0),
            error_count: AtomicUsize::new(0),
        }
    }

    /// Session identifier, also used as the output directory name
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    // ===== Phase machine =====

    pub fn phase(&self) -> CrawlPhase {
        *lock(&self.phase)
    }

    /// Moves the session forward to `next`
    pub fn advance(&self, next: CrawlPhase) -> crate::Result<()> {
        let mut phase = lock(&self.phase);
        let from = *phase;
        *phase = from.advance_to(next)?;
        lock(&self.phase_log).push((next, Utc::now()));
        tracing::info!(session = %self.id, from = %from, to = %next, "Phase change");
        Ok(())
    }

    /// Every phase the session entered, with the time it entered it
    pub fn phase_log(&self) -> Vec<(CrawlPhase, DateTime<Utc>)> {
        lock(&self.phase_log).clone()
    }

    // ===== Frontier =====

    /// Locks the frontier; hold the guard only for short, non-async sections
    pub fn frontier(&self) -> MutexGuard<'_, Frontier> {
        lock(&self.frontier)
    }

    // ===== Pages =====

    /// Appends a fetched page
    pub fn record_page(&self, page: FetchResult) {
        lock(&self.pages).push(page);
        self.pages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of all fetched pages in completion order
    pub fn pages(&self) -> Vec<FetchResult> {
        lock(&self.pages).clone()
    }

    // ===== Resources =====

    /// Adds a resource to the inventory unless its URL is already there
    pub fn add_resource(&self, record: ResourceRecord) -> bool {
        lock(&self.resources).add(record)
    }

    /// Snapshot of the resource inventory in discovery order
    pub fn resources(&self) -> Vec<ResourceRecord> {
        lock(&self.resources).records.clone()
    }

    /// Stores the downloader's results and updates counters and the error log
    pub fn update_resources(&self, records: Vec<ResourceRecord>) {
        for record in records {
            match record.download_state {
                DownloadState::Done => {
                    self.bytes_downloaded
                        .fetch_add(record.byte_size, Ordering::Relaxed);
                }
                DownloadState::Failed => {
                    let reason = record
                        .error
                        .clone()
                        .unwrap_or_else(|| "download failed".to_string());
                    let kind = record.error_kind.as_deref().unwrap_or("download");
                    self.record_failure(&record.url, kind, reason);
                }
                DownloadState::Pending | DownloadState::Downloading => {}
            }
            lock(&self.resources).update(record);
        }
    }

    // ===== Classified records =====

    pub fn set_records(&self, records: Vec<ClassifiedRecord>) {
        *lock(&self.records) = records;
    }

    pub fn records(&self) -> Vec<ClassifiedRecord> {
        lock(&self.records).clone()
    }

    // ===== Errors =====

    /// Records a per-URL failure in the error log
    pub fn record_error(&self, url: &str, error: &FetchError) {
        self.record_failure(url, error.kind(), error.to_string());
    }

    /// Records a failure that has no `FetchError`, such as an aborted worker
    pub fn record_failure(&self, url: &str, kind: &str, reason: impl Into<String>) {
        let entry = ErrorEntry {
            url: url.to_string(),
            kind: kind.to_string(),
            reason: reason.into(),
            phase: self.phase(),
            at: Utc::now(),
        };
        lock(&self.errors).push(entry);
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn errors(&self) -> Vec<ErrorEntry> {
        lock(&self.errors).clone()
    }

    // ===== Counters =====

    pub fn counters(&self) -> SessionCounters {
        SessionCounters {
            pages_processed: self.pages_processed.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            errors: self.error_count.load(Ordering::Relaxed),
        }
    }
}
