//! Browser driver seam.
//!
//! The loop engines, runner and prescan only see [`Driver`]; the CDP-backed
//! implementation lives in [`cdp`], and tests substitute a scripted fake.

pub mod capture;
pub mod cdp;
pub mod prescan;
pub mod selector;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::schema::CaptureFrame;

pub use capture::CaptureCollector;
pub use cdp::CdpDriver;
pub use selector::Locator;

/// A cookie attached to the context before any navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("timed out after {timeout_ms}ms: {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("element not found: {0}")]
    NotFound(String),

    #[error("invalid selector: {0}")]
    BadSelector(String),

    #[error("page crashed: {0}")]
    Crashed(String),

    #[error("{0}")]
    Assertion(String),

    #[error("driver protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    pub fn timeout(what: impl Into<String>, timeout: Duration) -> Self {
        DriverError::Timeout {
            what: what.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Crashes get a synthesized page error in the step record.
    pub fn is_crash(&self) -> bool {
        matches!(self, DriverError::Crashed(_))
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Narrow interface over the browser. One instance drives one page.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> DriverResult<()>;

    async fn click(&self, locator: &Locator, timeout: Duration) -> DriverResult<()>;

    async fn fill(&self, locator: &Locator, text: &str, timeout: Duration) -> DriverResult<()>;

    async fn select_option(
        &self,
        locator: &Locator,
        value: &str,
        timeout: Duration,
    ) -> DriverResult<()>;

    async fn upload_file(
        &self,
        locator: &Locator,
        path: &str,
        timeout: Duration,
    ) -> DriverResult<()>;

    async fn press_key(&self, key: &str) -> DriverResult<()>;

    async fn wait_for_visible(&self, locator: &Locator, timeout: Duration) -> DriverResult<()>;

    /// Inner text of the first match of a CSS selector (empty if absent).
    async fn inner_text(&self, css: &str) -> DriverResult<String>;

    /// Inner text of a resolved locator.
    async fn text_content(&self, locator: &Locator, timeout: Duration) -> DriverResult<String>;

    async fn current_url(&self) -> DriverResult<String>;

    async fn title(&self) -> DriverResult<String>;

    async fn evaluate(&self, expression: &str) -> DriverResult<Value>;

    async fn screenshot(&self) -> DriverResult<Vec<u8>>;

    async fn add_cookies(&self, cookies: &[Cookie]) -> DriverResult<()>;

    /// Resolve once no network activity has been seen for the quiet window.
    async fn wait_for_network_idle(&self, timeout: Duration) -> DriverResult<()>;

    /// Drain the capture buffers into an immutable frame.
    fn flush_capture(&self) -> CaptureFrame;

    async fn close(&self) -> DriverResult<()>;
}
