//! Headless rendering collaborator
//!
//! The crawler needs only a small surface from a browser: open a page,
//! navigate with a wait policy and a timeout, read the serialized DOM and the
//! title, evaluate a script, close the page. [`RenderEngine`] and
//! [`RenderedPage`] describe that surface; [`ChromiumEngine`] implements it
//! over the DevTools protocol.

mod chromium;

pub use chromium::ChromiumEngine;

use crate::FetchError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// When a navigated page counts as loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitPolicy {
    /// `document.readyState` reached `interactive` or `complete`
    #[default]
    DomReady,

    /// Document complete and no new resource requests for a quiet period
    NetworkIdle,
}

/// Rendering engine errors
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("page did not load within {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("browser protocol error: {0}")]
    Protocol(String),

    #[error("page already closed")]
    Closed,
}

impl From<RenderError> for FetchError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Timeout { elapsed_ms } => FetchError::Timeout { elapsed_ms },
            RenderError::Protocol(message) => FetchError::Content { message },
            other => FetchError::Network {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

/// A browser able to open pages
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Opens a fresh blank page
    async fn new_page(&self) -> Result<Box<dyn RenderedPage>, RenderError>;

    /// Shuts the browser down; pages opened afterwards fail
    async fn shutdown(&self) -> Result<(), RenderError> {
        Ok(())
    }
}

/// One open browser page
#[async_trait]
pub trait RenderedPage: Send + Sync {
    /// Navigates to `url` and waits per `wait` for at most `timeout`
    async fn goto(&self, url: &Url, wait: WaitPolicy, timeout: Duration)
        -> Result<(), RenderError>;

    /// Serialized DOM of the current document
    async fn content(&self) -> Result<String, RenderError>;

    async fn title(&self) -> Result<Option<String>, RenderError>;

    /// Evaluates a script expression and returns its JSON value
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, RenderError>;

    /// Closes the page; later calls fail with [`RenderError::Closed`]
    async fn close(&mut self) -> Result<(), RenderError>;
}
