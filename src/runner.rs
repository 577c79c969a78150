//! Deterministic step execution.
//!
//! One step in, one [`StepExecutionResult`] out. Artifacts (screenshot,
//! URL, visible text, capture frame) are collected regardless of whether
//! the action succeeded; artifact failures never fail the step.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::browser::prescan::truncate_chars;
use crate::browser::selector::{compile, Locator};
use crate::browser::{Driver, DriverError, DriverResult};
use crate::config::{ACTION_TIMEOUT_MS, MAX_VISIBLE_TEXT_CHARS, NAVIGATION_TIMEOUT_MS};
use crate::schema::{PageError, Step, StepAction, StepExecutionResult};

pub struct StepRunner {
    driver: Arc<dyn Driver>,
    output_dir: PathBuf,
    screenshots: bool,
}

impl StepRunner {
    pub fn new(driver: Arc<dyn Driver>, output_dir: PathBuf) -> Self {
        Self {
            driver,
            output_dir,
            screenshots: true,
        }
    }

    /// Login sub-loop steps skip screenshot artifacts.
    pub fn without_screenshots(mut self) -> Self {
        self.screenshots = false;
        self
    }

    /// Execute one step. `success` is false iff the action itself failed;
    /// artifact collection is best-effort either way.
    pub async fn execute_step(&self, step: &Step, index: usize) -> StepExecutionResult {
        // Drop evidence left over from between-step activity.
        let _ = self.driver.flush_capture();

        debug!(index, kind = step.kind(), description = %step.description, "executing step");
        let outcome = self.dispatch(step).await;
        if let Err(err) = &outcome {
            warn!(index, kind = step.kind(), error = %err, "step action failed");
        }

        let screenshot_path = if self.screenshots {
            self.capture_screenshot(index).await
        } else {
            String::new()
        };
        let url = self.driver.current_url().await.unwrap_or_default();
        let visible_text = self
            .driver
            .inner_text("body")
            .await
            .map(|text| truncate_chars(&text, MAX_VISIBLE_TEXT_CHARS))
            .unwrap_or_default();

        let mut capture = self.driver.flush_capture();
        if let Err(err) = &outcome {
            if err.is_crash() {
                capture.page_errors.push(PageError {
                    message: err.to_string(),
                });
            }
        }

        StepExecutionResult {
            step_index: index,
            step: step.clone(),
            success: outcome.is_ok(),
            url,
            screenshot_path,
            visible_text,
            capture,
            evaluation: None,
        }
    }

    async fn dispatch(&self, step: &Step) -> DriverResult<()> {
        let action_timeout = Duration::from_millis(step.timeout.unwrap_or(ACTION_TIMEOUT_MS));
        match &step.action {
            StepAction::Goto { value } => {
                let timeout =
                    Duration::from_millis(step.timeout.unwrap_or(NAVIGATION_TIMEOUT_MS));
                self.driver.goto(value, timeout).await
            }
            StepAction::Click { selector, .. } => {
                let locator = compile(selector)?;
                self.driver.click(&locator, action_timeout).await
            }
            StepAction::Type { selector, value } => {
                let locator = compile(selector)?;
                self.driver.fill(&locator, value, action_timeout).await
            }
            StepAction::Select { selector, value } => {
                let locator = compile(selector)?;
                self.driver
                    .select_option(&locator, value, action_timeout)
                    .await
            }
            StepAction::Upload { selector, value } => {
                let locator = compile(selector)?;
                self.driver
                    .upload_file(&locator, value, action_timeout)
                    .await
            }
            StepAction::Wait { selector, value } => match (selector, value) {
                (Some(selector), _) => {
                    let locator = compile(selector)?;
                    self.driver.wait_for_visible(&locator, action_timeout).await
                }
                (None, Some(value)) => {
                    let millis = value.trim().parse::<u64>().map_err(|_| {
                        DriverError::BadSelector(format!("wait value '{value}' is not milliseconds"))
                    })?;
                    sleep(Duration::from_millis(millis)).await;
                    Ok(())
                }
                (None, None) => self.driver.wait_for_network_idle(action_timeout).await,
            },
            StepAction::ExpectText { selector, value } => {
                let locator = match selector {
                    Some(selector) => compile(selector)?,
                    None => Locator::Css("body".into()),
                };
                self.driver.wait_for_visible(&locator, action_timeout).await?;
                let text = self.driver.text_content(&locator, action_timeout).await?;
                if text.contains(value.as_str()) {
                    Ok(())
                } else {
                    Err(DriverError::Assertion(format!(
                        "expected text '{value}' was not found in {locator}"
                    )))
                }
            }
            StepAction::PressKey { value } => self.driver.press_key(value).await,
        }
    }

    async fn capture_screenshot(&self, index: usize) -> String {
        let bytes = match self.driver.screenshot().await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(index, error = %err, "screenshot failed");
                return String::new();
            }
        };
        let dir = self.output_dir.join("screenshots");
        let path = dir.join(format!("step-{index}.png"));
        if let Err(err) = tokio::fs::create_dir_all(&dir).await {
            warn!(index, error = %err, "cannot create screenshot directory");
            return String::new();
        }
        if let Err(err) = tokio::fs::write(&path, bytes).await {
            warn!(index, error = %err, "cannot write screenshot");
            return String::new();
        }
        path.to_string_lossy().into_owned()
    }
}
