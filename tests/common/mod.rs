//! Scripted fake driver for loop-engine tests.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use promptqa::browser::{CaptureCollector, Cookie, Driver, DriverError, DriverResult, Locator};
use promptqa::schema::CaptureFrame;

#[derive(Debug, Default)]
pub struct FakeState {
    pub url: String,
    pub title: String,
    pub body_text: String,
    pub click_outcomes: VecDeque<DriverResult<()>>,
    pub clicks: usize,
    pub gotos: Vec<String>,
    pub cookies: Vec<Cookie>,
}

pub struct FakeDriver {
    state: Mutex<FakeState>,
    capture: CaptureCollector,
}

impl FakeDriver {
    pub fn new(url: &str, title: &str, body_text: &str) -> Self {
        Self {
            state: Mutex::new(FakeState {
                url: url.to_string(),
                title: title.to_string(),
                body_text: body_text.to_string(),
                ..FakeState::default()
            }),
            capture: CaptureCollector::new(),
        }
    }

    /// Queue the outcome of the next click.
    pub fn push_click_outcome(&self, outcome: DriverResult<()>) {
        self.state.lock().click_outcomes.push_back(outcome);
    }

    pub fn clicks(&self) -> usize {
        self.state.lock().clicks
    }

    pub fn gotos(&self) -> Vec<String> {
        self.state.lock().gotos.clone()
    }

    #[allow(dead_code)]
    pub fn capture(&self) -> &CaptureCollector {
        &self.capture
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn goto(&self, url: &str, _timeout: Duration) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.gotos.push(url.to_string());
        state.url = url.to_string();
        Ok(())
    }

    async fn click(&self, _locator: &Locator, _timeout: Duration) -> DriverResult<()> {
        let mut state = self.state.lock();
        state.clicks += 1;
        state.click_outcomes.pop_front().unwrap_or(Ok(()))
    }

    async fn fill(&self, _locator: &Locator, _text: &str, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    async fn select_option(
        &self,
        _locator: &Locator,
        _value: &str,
        _timeout: Duration,
    ) -> DriverResult<()> {
        Ok(())
    }

    async fn upload_file(
        &self,
        _locator: &Locator,
        _path: &str,
        _timeout: Duration,
    ) -> DriverResult<()> {
        Ok(())
    }

    async fn press_key(&self, _key: &str) -> DriverResult<()> {
        Ok(())
    }

    async fn wait_for_visible(&self, _locator: &Locator, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    async fn inner_text(&self, _css: &str) -> DriverResult<String> {
        Ok(self.state.lock().body_text.clone())
    }

    async fn text_content(&self, _locator: &Locator, _timeout: Duration) -> DriverResult<String> {
        Ok(self.state.lock().body_text.clone())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.state.lock().url.clone())
    }

    async fn title(&self) -> DriverResult<String> {
        Ok(self.state.lock().title.clone())
    }

    async fn evaluate(&self, expression: &str) -> DriverResult<Value> {
        if expression.contains("meta[name") {
            Ok(json!(""))
        } else {
            Ok(json!([]))
        }
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn add_cookies(&self, cookies: &[Cookie]) -> DriverResult<()> {
        self.state.lock().cookies.extend_from_slice(cookies);
        Ok(())
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> DriverResult<()> {
        Ok(())
    }

    fn flush_capture(&self) -> CaptureFrame {
        self.capture.flush()
    }

    async fn close(&self) -> DriverResult<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub fn crash(message: &str) -> DriverError {
    DriverError::Crashed(message.to_string())
}
