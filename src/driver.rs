//! # Page Driver
//!
//! The minimal browser surface the pipeline depends on. Everything here is a
//! suspension point that may fail, and every wait takes an explicit bound.
//!
//! ## Key Components
//!
//! - `PageDriver`: async trait implemented by browser engines
//! - `ChromiumDriver`: Chrome DevTools Protocol implementation
//! - `MockDriver`: scripted in-memory implementation for tests

use std::io;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod chromium;
pub mod mock;

pub use chromium::ChromiumDriver;
pub use mock::{DriverCall, MockDriver, MockPage};

/// Error type for page driver operations
#[derive(Debug, Error)]
pub enum DriverError {
    /// A bounded wait expired
    #[error("timed out after {timeout:?} waiting for `{selector}`")]
    Timeout {
        /// Selector that never appeared
        selector: String,
        /// The bound that was exceeded
        timeout: Duration,
    },

    /// No element matched a selector that had to exist
    #[error("no element matches `{0}`")]
    NotFound(String),

    /// Navigation failed
    #[error("navigation to {url} failed: {message}")]
    Navigation {
        /// Target URL
        url: String,
        /// Engine message
        message: String,
    },

    /// The browser could not be started
    #[error("browser launch failed: {0}")]
    Launch(String),

    /// Any other engine or protocol failure
    #[error("browser protocol error: {0}")]
    Protocol(String),

    /// IO error, e.g. while writing a screenshot
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DriverError {
    /// Whether this error is an expired bounded wait
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Control surface of one browser page
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate the page and wait for it to load
    async fn goto(&mut self, url: &str) -> Result<(), DriverError>;

    /// Type text into the element matching `selector`, pausing `delay` between characters
    async fn type_text(&mut self, selector: &str, text: &str, delay: Duration)
    -> Result<(), DriverError>;

    /// Click the element matching `selector`
    async fn click(&mut self, selector: &str) -> Result<(), DriverError>;

    /// Press a key on the focused element
    async fn press(&mut self, key: &str) -> Result<(), DriverError>;

    /// Wait until an element matches `selector`, failing after `timeout`
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration)
    -> Result<(), DriverError>;

    /// Non-throwing existence check
    async fn exists(&mut self, selector: &str) -> Result<bool, DriverError>;

    /// Rendered text of the first element matching `selector`
    async fn inner_text(&mut self, selector: &str) -> Result<String, DriverError>;

    /// Rendered texts of `value_selector` matches inside each `group_selector` match
    async fn grouped_texts(
        &mut self,
        group_selector: &str,
        value_selector: &str,
    ) -> Result<Vec<Vec<String>>, DriverError>;

    /// Write a screenshot of the page to `path`
    async fn screenshot(&mut self, path: &Path, full_page: bool) -> Result<(), DriverError>;

    /// Release the browser
    async fn close(&mut self) -> Result<(), DriverError>;
}
