//! Per-step evidence buffers.
//!
//! Event tasks push console/network/page-error entries as the driver
//! dispatches them; the runner drains a consistent frame at step
//! boundaries. Readers see a full frame or an empty one, never a partial
//! one: every append and the drain hold the same lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::{MAX_CONSOLE_ERRORS, MAX_NETWORK_ERRORS};
use crate::schema::{CaptureFrame, ConsoleEntry, ConsoleLevel, NetworkFailure, PageError};

#[derive(Debug)]
struct Buffers {
    console: Vec<ConsoleEntry>,
    network: Vec<NetworkFailure>,
    page_errors: Vec<PageError>,
    request_methods: HashMap<String, String>,
    last_network_activity: Instant,
}

impl Buffers {
    fn new() -> Self {
        Self {
            console: Vec::new(),
            network: Vec::new(),
            page_errors: Vec::new(),
            request_methods: HashMap::new(),
            last_network_activity: Instant::now(),
        }
    }
}

#[derive(Debug)]
pub struct CaptureCollector {
    inner: Mutex<Buffers>,
}

impl Default for CaptureCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Buffers::new()),
        }
    }

    /// Retain only error/warning console events, capped per frame.
    pub fn record_console(&self, level: &str, text: String) {
        let level = match level.to_ascii_lowercase().as_str() {
            "error" => ConsoleLevel::Error,
            "warning" | "warn" => ConsoleLevel::Warn,
            _ => return,
        };
        let mut inner = self.inner.lock();
        if inner.console.len() < MAX_CONSOLE_ERRORS {
            inner.console.push(ConsoleEntry { level, text });
        }
    }

    pub fn record_request(&self, request_id: String, method: String, _url: String) {
        let mut inner = self.inner.lock();
        inner.last_network_activity = Instant::now();
        if inner.request_methods.len() >= 256 {
            inner.request_methods.clear();
        }
        inner.request_methods.insert(request_id, method);
    }

    /// Retain responses with status >= 400, capped per frame.
    pub fn record_response(&self, request_id: &str, status: u16, status_text: String, url: String) {
        let mut inner = self.inner.lock();
        inner.last_network_activity = Instant::now();
        let method = inner
            .request_methods
            .remove(request_id)
            .unwrap_or_else(|| "GET".to_string());
        if status >= 400 && inner.network.len() < MAX_NETWORK_ERRORS {
            inner.network.push(NetworkFailure {
                url,
                status,
                status_text,
                method,
            });
        }
    }

    pub fn record_page_error(&self, message: String) {
        let mut inner = self.inner.lock();
        inner.page_errors.push(PageError { message });
    }

    /// Return the accumulated frame and reset all buffers atomically.
    pub fn flush(&self) -> CaptureFrame {
        let mut inner = self.inner.lock();
        CaptureFrame {
            console_entries: std::mem::take(&mut inner.console),
            network_failures: std::mem::take(&mut inner.network),
            page_errors: std::mem::take(&mut inner.page_errors),
        }
    }

    /// Time since the last request or response was observed.
    pub fn network_idle_for(&self) -> Duration {
        self.inner.lock().last_network_activity.elapsed()
    }
}
