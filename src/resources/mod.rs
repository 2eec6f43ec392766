//! Resource discovery types and the resource downloader
//!
//! Pages reference images, documents, stylesheets, scripts and media. The
//! orchestrator collects those references into [`ResourceRecord`]s and hands
//! them to the [`ResourceDownloader`], which stores each file under a
//! kind-specific subdirectory of the session directory.

mod downloader;
mod filename;

pub use downloader::{check_declared_size, ResourceDownloader};
pub use filename::{derive_filename, FilenameRegistry};

use crate::url::path_extension;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "svg"];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "zip", "rar",
];
const MEDIA_EXTENSIONS: &[&str] = &["mp4", "webm", "mov", "avi", "mp3", "wav", "ogg"];

/// Kind of an embedded or linked resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Image,
    Document,
    Stylesheet,
    Script,
    Media,
}

impl ResourceKind {
    /// Infers a downloadable kind from the URL's file extension
    ///
    /// Stylesheets and scripts are only recognized from the tag that references
    /// them, never from a bare link.
    pub fn from_url(url: &Url) -> Option<Self> {
        let ext = path_extension(url)?;
        let ext = ext.as_str();

        if IMAGE_EXTENSIONS.contains(&ext) {
            Some(Self::Image)
        } else if DOCUMENT_EXTENSIONS.contains(&ext) {
            Some(Self::Document)
        } else if MEDIA_EXTENSIONS.contains(&ext) {
            Some(Self::Media)
        } else {
            None
        }
    }

    /// Subdirectory of the session directory the kind is stored in
    pub fn subdir(&self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Document => "documents",
            Self::Stylesheet | Self::Script => "static",
            Self::Media => "media",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
            Self::Stylesheet => "stylesheet",
            Self::Script => "script",
            Self::Media => "media",
        }
    }
}

/// A resource reference observed on a page
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub url: Url,
    pub kind: ResourceKind,
}

/// Download lifecycle of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
    Pending,
    Downloading,
    Done,
    Failed,
}

impl DownloadState {
    /// Returns true once no further download work will happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Inventory entry for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub url: String,
    pub kind: ResourceKind,

    /// Where the file was (or would have been) written
    pub destination_path: Option<PathBuf>,

    /// Bytes written; zero unless the download completed
    pub byte_size: u64,

    pub download_state: DownloadState,

    /// Failure reason for failed downloads
    pub error: Option<String>,

    /// Machine-readable failure kind, e.g. `size_exceeded` or `timeout`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,

    /// Page the resource was first seen on
    pub found_on: String,
}

impl ResourceRecord {
    /// Creates a pending record for a reference seen on a page
    pub fn pending(reference: &ResourceRef, found_on: &Url) -> Self {
        Self {
            url: reference.url.to_string(),
            kind: reference.kind,
            destination_path: None,
            byte_size: 0,
            download_state: DownloadState::Pending,
            error: None,
            error_kind: None,
            found_on: found_on.to_string(),
        }
    }

    /// Marks the download failed, discarding any byte count
    pub fn fail(&mut self, kind: &str, reason: impl Into<String>) {
        self.download_state = DownloadState::Failed;
        self.byte_size = 0;
        self.error = Some(reason.into());
        self.error_kind = Some(kind.to_string());
    }
}
