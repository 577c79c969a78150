//! Per-step LLM evaluation and the deterministic hard-fail check.
//!
//! Parse problems are repaired once and then degrade to an UNCERTAIN
//! verdict; only transport errors reach the caller, which records the step
//! without an evaluation.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::errors::{PromptQaError, Result};
use crate::llm::extract::extract_json_object;
use crate::llm::LlmClient;
use crate::prompts::{render, Template, EVALUATOR_SYSTEM};
use crate::schema::{CaptureFrame, EvaluationResult, Step, StepAction, StepExecutionResult, Verdict};

/// Fallback verdict when the model cannot produce a parseable judgement.
const FALLBACK_REASON: &str = "Evaluator failed to produce a valid response";

pub struct Evaluator {
    llm: Arc<dyn LlmClient>,
}

impl Evaluator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Judge one executed step from its observed evidence. Errors are
    /// transport-level only; parse failures never propagate.
    pub async fn evaluate(&self, result: &StepExecutionResult) -> Result<EvaluationResult> {
        let expected = expected_action(&result.step);
        let user = render(
            Template::Evaluator,
            &[
                ("description", result.step.description.as_str()),
                ("expectedAction", &expected),
                ("success", if result.success { "true" } else { "false" }),
                ("url", &result.url),
                ("visibleText", &result.visible_text),
                ("consoleErrors", &format_console(&result.capture)),
                ("networkErrors", &format_network(&result.capture)),
                ("pageErrors", &format_page_errors(&result.capture)),
            ],
        );

        match self.attempt(&user).await? {
            Ok(evaluation) => Ok(evaluation),
            Err(parse_err) => {
                warn!(error = %parse_err, "evaluator output invalid, retrying once");
                let repair = format!(
                    "{user}\n\nYour previous answer could not be parsed ({parse_err}). \
                     Respond with ONLY the JSON object."
                );
                match self.attempt(&repair).await? {
                    Ok(evaluation) => Ok(evaluation),
                    Err(parse_err) => {
                        warn!(error = %parse_err, "evaluator failed twice, falling back to UNCERTAIN");
                        Ok(EvaluationResult {
                            result: Verdict::Uncertain,
                            confidence: 0.0,
                            reason: FALLBACK_REASON.to_string(),
                        })
                    }
                }
            }
        }
    }

    /// Outer error: transport. Inner error: unparseable output.
    async fn attempt(
        &self,
        user: &str,
    ) -> Result<std::result::Result<EvaluationResult, PromptQaError>> {
        let raw = self.llm.generate(EVALUATOR_SYSTEM, user).await?;
        Ok(parse_evaluation(&raw))
    }
}

fn parse_evaluation(raw: &str) -> std::result::Result<EvaluationResult, PromptQaError> {
    let slice = extract_json_object(raw)
        .ok_or_else(|| PromptQaError::Schema("response contains no JSON object".into()))?;
    let value: Value = serde_json::from_str(&slice)
        .map_err(|err| PromptQaError::Schema(format!("response is not valid JSON: {err}")))?;
    EvaluationResult::from_raw(&value)
}

/// Deterministic stop condition: failed step, page error, or 5xx on a
/// mutating request.
pub fn detect_hard_fail(result: &StepExecutionResult) -> Option<String> {
    if !result.success {
        return Some(format!(
            "step {} failed to execute: {}",
            result.step_index, result.step.description
        ));
    }
    if let Some(error) = result.capture.page_errors.first() {
        return Some(format!("page error: {}", error.message));
    }
    if let Some(failure) = result.capture.network_failures.iter().find(|failure| {
        failure.status >= 500
            && matches!(
                failure.method.to_ascii_uppercase().as_str(),
                "POST" | "PUT" | "DELETE"
            )
    }) {
        return Some(format!(
            "server error {} on {} {}",
            failure.status, failure.method, failure.url
        ));
    }
    None
}

fn expected_action(step: &Step) -> String {
    match &step.action {
        StepAction::Goto { value } => format!("navigate to {value}"),
        StepAction::Click { .. } => "click the target element".to_string(),
        StepAction::Type { value, .. } => format!("type '{value}' into the target element"),
        StepAction::Select { value, .. } => format!("select option '{value}'"),
        StepAction::Upload { value, .. } => format!("upload file '{value}'"),
        StepAction::Wait { .. } => "wait for the page to settle".to_string(),
        StepAction::ExpectText { value, .. } => format!("see the text '{value}' on the page"),
        StepAction::PressKey { value } => format!("press the '{value}' key"),
    }
}

fn format_console(capture: &CaptureFrame) -> String {
    if capture.console_entries.is_empty() {
        return "(none)".to_string();
    }
    capture
        .console_entries
        .iter()
        .map(|entry| {
            let level = match entry.level {
                crate::schema::ConsoleLevel::Error => "error",
                crate::schema::ConsoleLevel::Warn => "warn",
            };
            format!("{level}: {}", entry.text)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_network(capture: &CaptureFrame) -> String {
    if capture.network_failures.is_empty() {
        return "(none)".to_string();
    }
    capture
        .network_failures
        .iter()
        .map(|failure| {
            format!(
                "{} {} -> {} {}",
                failure.method, failure.url, failure.status, failure.status_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_page_errors(capture: &CaptureFrame) -> String {
    if capture.page_errors.is_empty() {
        return "(none)".to_string();
    }
    capture
        .page_errors
        .iter()
        .map(|error| error.message.clone())
        .collect::<Vec<_>>()
        .join("\n")
}
