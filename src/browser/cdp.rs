//! CDP-backed driver over chromiumoxide.
//!
//! One launched browser, one page. Console, exception and network events
//! are pumped into the capture collector by background tasks; element
//! resolution runs the finder script and then addresses the marked node.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::network::{
    CookieParam, EventRequestWillBeSent, EventResponseReceived,
};
use chromiumoxide::cdp::js_protocol::runtime::{EventConsoleApiCalled, EventExceptionThrown};
use chromiumoxide::element::Element;
use chromiumoxide::page::{Page, ScreenshotParams};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::browser::capture::CaptureCollector;
use crate::browser::selector::{finder_script, Locator, MARK_SELECTOR};
use crate::browser::{Cookie, Driver, DriverError, DriverResult};
use crate::config::NETWORK_IDLE_QUIET_MS;
use crate::errors::{PromptQaError, Result};
use crate::schema::CaptureFrame;

const RESOLVE_POLL: Duration = Duration::from_millis(100);

pub struct CdpDriver {
    browser: AsyncMutex<Browser>,
    page: Page,
    capture: Arc<CaptureCollector>,
    tasks: Vec<JoinHandle<()>>,
}

impl CdpDriver {
    /// Launch a browser, open a blank page, and attach event capture.
    pub async fn launch(headless: bool) -> Result<Self> {
        let mut builder = BrowserConfig::builder();
        if !headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|err| PromptQaError::Browser(format!("browser config: {err}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| PromptQaError::Browser(format!("browser launch failed: {err}")))?;

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        }));

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|err| PromptQaError::Browser(format!("cannot open page: {err}")))?;

        let capture = Arc::new(CaptureCollector::new());
        attach_capture(&page, &capture, &mut tasks)
            .await
            .map_err(|err| PromptQaError::Browser(format!("cannot attach capture: {err}")))?;

        Ok(Self {
            browser: AsyncMutex::new(browser),
            page,
            capture,
            tasks,
        })
    }

    /// Run the finder script until it marks a match, then fetch the element.
    async fn resolve(
        &self,
        locator: &Locator,
        require_visible: bool,
        timeout_in: Duration,
    ) -> DriverResult<Element> {
        let script = finder_script(locator, require_visible);
        let deadline = Instant::now() + timeout_in;
        loop {
            let found = self
                .page
                .evaluate(script.as_str())
                .await
                .map(|result| result.value().and_then(Value::as_bool).unwrap_or(false))
                .map_err(map_cdp)?;
            if found {
                return self
                    .page
                    .find_element(MARK_SELECTOR)
                    .await
                    .map_err(map_cdp);
            }
            if Instant::now() >= deadline {
                return Err(DriverError::timeout(locator.to_string(), timeout_in));
            }
            sleep(RESOLVE_POLL).await;
        }
    }

    async fn eval_value(&self, expression: &str) -> DriverResult<Value> {
        let result = self.page.evaluate(expression).await.map_err(map_cdp)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl Driver for CdpDriver {
    async fn goto(&self, url: &str, timeout_in: Duration) -> DriverResult<()> {
        let navigation = async {
            self.page.goto(url).await.map_err(map_cdp)?;
            self.page.wait_for_navigation().await.map_err(map_cdp)?;
            Ok(())
        };
        match timeout(timeout_in, navigation).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::timeout(format!("navigation to {url}"), timeout_in)),
        }
    }

    async fn click(&self, locator: &Locator, timeout_in: Duration) -> DriverResult<()> {
        let element = self.resolve(locator, true, timeout_in).await?;
        if let Err(err) = element.scroll_into_view().await {
            debug!(%locator, error = %err, "scroll into view failed, clicking anyway");
        }
        element.click().await.map_err(map_cdp)?;
        Ok(())
    }

    async fn fill(&self, locator: &Locator, text: &str, timeout_in: Duration) -> DriverResult<()> {
        let element = self.resolve(locator, true, timeout_in).await?;
        element.click().await.map_err(map_cdp)?;
        self.eval_value(&format!(
            "(() => {{ const el = document.querySelector('{MARK_SELECTOR}'); \
             if (el) {{ el.value = ''; }} return true; }})()"
        ))
        .await?;
        element.type_str(text).await.map_err(map_cdp)?;
        Ok(())
    }

    async fn select_option(
        &self,
        locator: &Locator,
        value: &str,
        timeout_in: Duration,
    ) -> DriverResult<()> {
        self.resolve(locator, false, timeout_in).await?;
        let wanted = serde_json::to_string(value).expect("strings always serialize");
        let matched = self
            .eval_value(&format!(
                "(() => {{\
                 const el = document.querySelector('{MARK_SELECTOR}');\
                 if (!el || el.tagName.toLowerCase() !== 'select') return false;\
                 const wanted = {wanted};\
                 const option = Array.from(el.options)\
                   .find((o) => o.value === wanted || o.label.trim() === wanted);\
                 if (!option) return false;\
                 el.value = option.value;\
                 el.dispatchEvent(new Event('input', {{ bubbles: true }}));\
                 el.dispatchEvent(new Event('change', {{ bubbles: true }}));\
                 return true;\
                 }})()"
            ))
            .await?
            .as_bool()
            .unwrap_or(false);
        if !matched {
            return Err(DriverError::NotFound(format!(
                "option '{value}' in {locator}"
            )));
        }
        Ok(())
    }

    async fn upload_file(
        &self,
        locator: &Locator,
        path: &str,
        timeout_in: Duration,
    ) -> DriverResult<()> {
        let element = self.resolve(locator, false, timeout_in).await?;
        let params = SetFileInputFilesParams::builder()
            .file(path.to_string())
            .object_id(element.remote_object_id.clone())
            .build()
            .map_err(DriverError::Protocol)?;
        self.page.execute(params).await.map_err(map_cdp)?;
        Ok(())
    }

    async fn press_key(&self, key: &str) -> DriverResult<()> {
        // Key events go to the focused element; mark it (or body) first.
        self.eval_value(
            "(() => {\
             for (const el of document.querySelectorAll('[data-pqa-target]')) \
               el.removeAttribute('data-pqa-target');\
             const el = document.activeElement || document.body;\
             el.setAttribute('data-pqa-target', '1');\
             return true;\
             })()",
        )
        .await?;
        let element = self.page.find_element(MARK_SELECTOR).await.map_err(map_cdp)?;
        element.press_key(key).await.map_err(map_cdp)?;
        Ok(())
    }

    async fn wait_for_visible(&self, locator: &Locator, timeout_in: Duration) -> DriverResult<()> {
        self.resolve(locator, true, timeout_in).await.map(|_| ())
    }

    async fn inner_text(&self, css: &str) -> DriverResult<String> {
        let selector = serde_json::to_string(css).expect("strings always serialize");
        let value = self
            .eval_value(&format!(
                "(() => {{ const el = document.querySelector({selector}); \
                 return el ? el.innerText : ''; }})()"
            ))
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn text_content(&self, locator: &Locator, timeout_in: Duration) -> DriverResult<String> {
        self.resolve(locator, false, timeout_in).await?;
        let value = self
            .eval_value(&format!(
                "(() => {{ const el = document.querySelector('{MARK_SELECTOR}'); \
                 return el ? el.innerText : ''; }})()"
            ))
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let value = self.eval_value("location.href").await?;
        Ok(value.as_str().unwrap_or("about:blank").to_string())
    }

    async fn title(&self) -> DriverResult<String> {
        let value = self.eval_value("document.title").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn evaluate(&self, expression: &str) -> DriverResult<Value> {
        self.eval_value(expression).await
    }

    async fn screenshot(&self) -> DriverResult<Vec<u8>> {
        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
            .map_err(map_cdp)
    }

    async fn add_cookies(&self, cookies: &[Cookie]) -> DriverResult<()> {
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            params.push(
                CookieParam::builder()
                    .name(cookie.name.clone())
                    .value(cookie.value.clone())
                    .url(cookie.url.clone())
                    .build()
                    .map_err(DriverError::Protocol)?,
            );
        }
        self.page.set_cookies(params).await.map_err(map_cdp)?;
        Ok(())
    }

    async fn wait_for_network_idle(&self, timeout_in: Duration) -> DriverResult<()> {
        let quiet = Duration::from_millis(NETWORK_IDLE_QUIET_MS);
        let deadline = Instant::now() + timeout_in;
        loop {
            if self.capture.network_idle_for() >= quiet {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DriverError::timeout("network idle", timeout_in));
            }
            sleep(RESOLVE_POLL).await;
        }
    }

    fn flush_capture(&self) -> CaptureFrame {
        self.capture.flush()
    }

    async fn close(&self) -> DriverResult<()> {
        for task in &self.tasks {
            task.abort();
        }
        let mut browser = self.browser.lock().await;
        if let Err(err) = browser.close().await {
            warn!(error = %err, "browser close failed");
        }
        Ok(())
    }
}

async fn attach_capture(
    page: &Page,
    capture: &Arc<CaptureCollector>,
    tasks: &mut Vec<JoinHandle<()>>,
) -> std::result::Result<(), chromiumoxide::error::CdpError> {
    let mut console_events = page.event_listener::<EventConsoleApiCalled>().await?;
    let collector = Arc::clone(capture);
    tasks.push(tokio::spawn(async move {
        while let Some(event) = console_events.next().await {
            let text = event
                .args
                .iter()
                .filter_map(|arg| {
                    arg.value
                        .as_ref()
                        .map(|value| match value {
                            Value::String(text) => text.clone(),
                            other => other.to_string(),
                        })
                        .or_else(|| arg.description.clone())
                })
                .collect::<Vec<_>>()
                .join(" ");
            collector.record_console(&format!("{:?}", event.r#type).to_lowercase(), text);
        }
    }));

    let mut exceptions = page.event_listener::<EventExceptionThrown>().await?;
    let collector = Arc::clone(capture);
    tasks.push(tokio::spawn(async move {
        while let Some(event) = exceptions.next().await {
            let details = &event.exception_details;
            let message = details
                .exception
                .as_ref()
                .and_then(|exception| exception.description.clone())
                .unwrap_or_else(|| details.text.clone());
            collector.record_page_error(message);
        }
    }));

    let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
    let collector = Arc::clone(capture);
    tasks.push(tokio::spawn(async move {
        while let Some(event) = requests.next().await {
            collector.record_request(
                event.request_id.inner().clone(),
                event.request.method.clone(),
                event.request.url.clone(),
            );
        }
    }));

    let mut responses = page.event_listener::<EventResponseReceived>().await?;
    let collector = Arc::clone(capture);
    tasks.push(tokio::spawn(async move {
        while let Some(event) = responses.next().await {
            collector.record_response(
                event.request_id.inner(),
                event.response.status as u16,
                event.response.status_text.clone(),
                event.response.url.clone(),
            );
        }
    }));

    Ok(())
}

/// Fold CDP failures into driver errors. Crash-shaped messages are kept
/// apart so the runner can synthesize a page error.
fn map_cdp(err: impl std::fmt::Display) -> DriverError {
    let text = err.to_string();
    let lowered = text.to_ascii_lowercase();
    if lowered.contains("target closed")
        || lowered.contains("crash")
        || lowered.contains("session closed")
    {
        DriverError::Crashed(text)
    } else if lowered.contains("timeout") {
        DriverError::Timeout {
            what: text,
            timeout_ms: 0,
        }
    } else {
        DriverError::Protocol(text)
    }
}
