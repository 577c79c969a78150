//! Retry and hard-fail classification.
//!
//! A pure function over one step record and the previous step's visible
//! text. Page errors and 5xx responses to mutating requests stop the run;
//! everything else is retryable or benign.

use crate::schema::StepExecutionResult;

const MUTATING_METHODS: [&str; 3] = ["POST", "PUT", "DELETE"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Stop the loop; no retry.
    HardFail,
    /// Likely a selector miss; retry once after a wait.
    ElementNotFound,
    /// Action reported success but the page did not change; retry once.
    ActionNoEffect,
    None,
}

pub fn classify_failure(
    result: &StepExecutionResult,
    prev_visible_text: Option<&str>,
) -> FailureClass {
    let page_error = !result.capture.page_errors.is_empty();
    let mutating_5xx = result.capture.network_failures.iter().any(|failure| {
        failure.status >= 500 && MUTATING_METHODS.contains(&failure.method.to_ascii_uppercase().as_str())
    });

    if !result.success {
        if page_error || mutating_5xx {
            return FailureClass::HardFail;
        }
        return FailureClass::ElementNotFound;
    }

    if page_error {
        return FailureClass::HardFail;
    }

    let comparable = !matches!(result.step.kind(), "goto" | "wait" | "expect_text");
    if comparable {
        if let Some(prev) = prev_visible_text {
            if result.visible_text == prev {
                return FailureClass::ActionNoEffect;
            }
        }
    }

    FailureClass::None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        CaptureFrame, NetworkFailure, PageError, SelectorHint, Step, StepAction,
        StepExecutionResult,
    };

    fn result(step: Step, success: bool, visible_text: &str) -> StepExecutionResult {
        StepExecutionResult {
            step_index: 0,
            step,
            success,
            url: "http://app.test".into(),
            screenshot_path: String::new(),
            visible_text: visible_text.into(),
            capture: CaptureFrame::default(),
            evaluation: None,
        }
    }

    fn click() -> Step {
        Step {
            action: StepAction::Click {
                selector: SelectorHint::css("button"),
                value: None,
            },
            description: "click".into(),
            timeout: None,
        }
    }

    fn goto() -> Step {
        Step {
            action: StepAction::Goto {
                value: "http://app.test".into(),
            },
            description: "open".into(),
            timeout: None,
        }
    }

    #[test]
    fn failed_step_without_evidence_is_retryable() {
        let record = result(click(), false, "");
        assert_eq!(
            classify_failure(&record, None),
            FailureClass::ElementNotFound
        );
    }

    #[test]
    fn failed_step_with_page_error_is_hard() {
        let mut record = result(click(), false, "");
        record.capture.page_errors.push(PageError {
            message: "Uncaught TypeError".into(),
        });
        assert_eq!(classify_failure(&record, None), FailureClass::HardFail);
    }

    #[test]
    fn mutating_5xx_is_hard_even_on_success() {
        let mut record = result(click(), false, "");
        record.capture.network_failures.push(NetworkFailure {
            url: "http://app.test/api".into(),
            status: 503,
            status_text: "Service Unavailable".into(),
            method: "POST".into(),
        });
        assert_eq!(classify_failure(&record, None), FailureClass::HardFail);
    }

    #[test]
    fn get_5xx_is_not_hard() {
        let mut record = result(click(), false, "");
        record.capture.network_failures.push(NetworkFailure {
            url: "http://app.test/api".into(),
            status: 500,
            status_text: "Internal Server Error".into(),
            method: "GET".into(),
        });
        assert_eq!(
            classify_failure(&record, None),
            FailureClass::ElementNotFound
        );
    }

    #[test]
    fn successful_page_error_is_hard() {
        let mut record = result(click(), true, "after");
        record.capture.page_errors.push(PageError {
            message: "boom".into(),
        });
        assert_eq!(classify_failure(&record, Some("before")), FailureClass::HardFail);
    }

    #[test]
    fn unchanged_text_after_click_is_no_effect() {
        let record = result(click(), true, "same text");
        assert_eq!(
            classify_failure(&record, Some("same text")),
            FailureClass::ActionNoEffect
        );
        assert_eq!(
            classify_failure(&record, Some("different")),
            FailureClass::None
        );
    }

    #[test]
    fn goto_is_never_no_effect() {
        let record = result(goto(), true, "same text");
        assert_eq!(classify_failure(&record, Some("same text")), FailureClass::None);
    }
}
