//! Typed boundary records.
//!
//! Every record that crosses a component boundary (LLM output, driver
//! evidence, report rows) is defined and validated here. LLM payloads are
//! repaired on the untyped `serde_json::Value` first and only then narrowed
//! into these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::errors::{PromptQaError, Result};

/// Run or step verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
    Uncertain,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Uncertain => "UNCERTAIN",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PASS" => Ok(Verdict::Pass),
            "FAIL" => Ok(Verdict::Fail),
            "UNCERTAIN" => Ok(Verdict::Uncertain),
            other => Err(PromptQaError::Schema(format!(
                "unknown verdict '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bug severity bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Major => "major",
            Severity::Minor => "minor",
        }
    }
}

/// Element lookup strategy. There is no automatic fallback between
/// strategies; a bad hint surfaces as an action-time timeout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SelectorStrategy {
    Testid,
    Role,
    Text,
    Css,
}

/// Abstract element locator produced by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectorHint {
    pub strategy: SelectorStrategy,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SelectorHint {
    pub fn css(value: impl Into<String>) -> Self {
        Self {
            strategy: SelectorStrategy::Css,
            value: value.into(),
            role: None,
            name: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.value.trim().is_empty() {
            return Err(PromptQaError::Schema(
                "selector value must be non-empty".into(),
            ));
        }
        if self.strategy == SelectorStrategy::Role && self.role.is_none() {
            return Err(PromptQaError::Schema(format!(
                "selector strategy 'role' requires a role (value: '{}')",
                self.value
            )));
        }
        Ok(())
    }
}

/// One deterministic browser action, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    Goto {
        value: String,
    },
    Click {
        selector: SelectorHint,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    Type {
        selector: SelectorHint,
        value: String,
    },
    Select {
        selector: SelectorHint,
        value: String,
    },
    Upload {
        selector: SelectorHint,
        value: String,
    },
    Wait {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<SelectorHint>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
    ExpectText {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selector: Option<SelectorHint>,
        value: String,
    },
    PressKey {
        value: String,
    },
}

/// A step plus the human description and optional per-action timeout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    #[serde(flatten)]
    pub action: StepAction,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Step {
    /// The wire name of the step kind.
    pub fn kind(&self) -> &'static str {
        match self.action {
            StepAction::Goto { .. } => "goto",
            StepAction::Click { .. } => "click",
            StepAction::Type { .. } => "type",
            StepAction::Select { .. } => "select",
            StepAction::Upload { .. } => "upload",
            StepAction::Wait { .. } => "wait",
            StepAction::ExpectText { .. } => "expect_text",
            StepAction::PressKey { .. } => "press_key",
        }
    }

    pub fn selector(&self) -> Option<&SelectorHint> {
        match &self.action {
            StepAction::Click { selector, .. }
            | StepAction::Type { selector, .. }
            | StepAction::Select { selector, .. }
            | StepAction::Upload { selector, .. } => Some(selector),
            StepAction::Wait { selector, .. } | StepAction::ExpectText { selector, .. } => {
                selector.as_ref()
            }
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.description.trim().is_empty() {
            return Err(PromptQaError::Schema(format!(
                "{} step is missing a description",
                self.kind()
            )));
        }
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err(PromptQaError::Schema(format!(
                    "{} step timeout must be positive",
                    self.kind()
                )));
            }
        }
        if let Some(selector) = self.selector() {
            selector.validate()?;
        }
        match &self.action {
            StepAction::Goto { value } => {
                Url::parse(value).map_err(|err| {
                    PromptQaError::Schema(format!("goto value '{value}' is not a URL: {err}"))
                })?;
            }
            StepAction::Type { value, .. }
            | StepAction::Select { value, .. }
            | StepAction::Upload { value, .. } => {
                if value.trim().is_empty() {
                    return Err(PromptQaError::Schema(format!(
                        "{} step requires a non-empty value",
                        self.kind()
                    )));
                }
            }
            StepAction::ExpectText { value, .. } | StepAction::PressKey { value } => {
                if value.trim().is_empty() {
                    return Err(PromptQaError::Schema(format!(
                        "{} step requires a non-empty value",
                        self.kind()
                    )));
                }
            }
            StepAction::Wait { selector, value } => {
                if selector.is_none() {
                    if let Some(value) = value {
                        value.trim().parse::<u64>().map_err(|_| {
                            PromptQaError::Schema(format!(
                                "wait value '{value}' must be milliseconds when no selector is given"
                            ))
                        })?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// One interactive element as extracted by the in-page routine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveElement {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_list: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_busy: Option<bool>,
}

/// Structured, truncated view of a page handed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub visible_text: String,
    pub elements: Vec<InteractiveElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Error,
    Warn,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsoleEntry {
    pub level: ConsoleLevel,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkFailure {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageError {
    pub message: String,
}

/// Console/network/page-error evidence accumulated during one step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CaptureFrame {
    pub console_entries: Vec<ConsoleEntry>,
    pub network_failures: Vec<NetworkFailure>,
    pub page_errors: Vec<PageError>,
}

impl CaptureFrame {
    pub fn is_empty(&self) -> bool {
        self.console_entries.is_empty()
            && self.network_failures.is_empty()
            && self.page_errors.is_empty()
    }
}

/// LLM judgement of one executed step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationResult {
    pub result: Verdict,
    pub confidence: f64,
    pub reason: String,
}

impl EvaluationResult {
    /// Narrow a raw LLM object. Confidence is clamped into [0, 1] before
    /// validation; a missing or empty reason fails.
    pub fn from_raw(value: &Value) -> Result<Self> {
        let result = value
            .get("result")
            .and_then(Value::as_str)
            .ok_or_else(|| PromptQaError::Schema("evaluation is missing 'result'".into()))?;
        let result = Verdict::parse(result)?;
        let confidence = value
            .get("confidence")
            .and_then(Value::as_f64)
            .ok_or_else(|| PromptQaError::Schema("evaluation is missing 'confidence'".into()))?
            .clamp(0.0, 1.0);
        let reason = value
            .get("reason")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .ok_or_else(|| PromptQaError::Schema("evaluation is missing 'reason'".into()))?;
        Ok(Self {
            result,
            confidence,
            reason: reason.to_string(),
        })
    }
}

/// Everything recorded about one executed step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepExecutionResult {
    pub step_index: usize,
    pub step: Step,
    pub success: bool,
    pub url: String,
    pub screenshot_path: String,
    pub visible_text: String,
    pub capture: CaptureFrame,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BugReport {
    pub step_index: usize,
    pub description: String,
    pub severity: Severity,
    pub evidence: Vec<String>,
}

/// The full outcome of one run, owned by the loop and fed to the reporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: Uuid,
    pub url: String,
    pub prompt: String,
    pub summary: Verdict,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub steps: Vec<StepExecutionResult>,
    pub bugs: Vec<BugReport>,
    #[serde(default)]
    pub login_failed: bool,
}

/// Agent-loop history line shown back to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionHistoryEntry {
    pub step_index: usize,
    pub action: String,
    pub description: String,
    pub success: bool,
    pub observation: String,
}

/// One agent-loop decision: finish with a summary, or act.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentDecision {
    Done { summary: String },
    Act { step: Step },
}

impl AgentDecision {
    /// Narrow a repaired raw object. Agent actions may not navigate; a
    /// `goto` action is rejected here.
    pub fn from_value(value: &Value) -> Result<Self> {
        let done = value
            .get("done")
            .and_then(Value::as_bool)
            .ok_or_else(|| PromptQaError::Schema("agent response is missing 'done'".into()))?;
        if done {
            let summary = value
                .get("summary")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|summary| !summary.is_empty())
                .unwrap_or("agent declared the goal complete");
            return Ok(AgentDecision::Done {
                summary: summary.to_string(),
            });
        }
        let action = value
            .get("action")
            .ok_or_else(|| PromptQaError::Schema("agent response is missing 'action'".into()))?;
        let step: Step = serde_json::from_value(action.clone())?;
        step.validate()?;
        if matches!(step.action, StepAction::Goto { .. }) {
            return Err(PromptQaError::Schema(
                "agent actions may not navigate; goto is planner-only".into(),
            ));
        }
        Ok(AgentDecision::Act { step })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn click_step() -> Step {
        Step {
            action: StepAction::Click {
                selector: SelectorHint::css("button.save"),
                value: None,
            },
            description: "Click save".into(),
            timeout: None,
        }
    }

    #[test]
    fn step_roundtrips_through_tagged_json() {
        let step = click_step();
        let raw = serde_json::to_value(&step).unwrap();
        assert_eq!(raw["type"], "click");
        assert_eq!(raw["selector"]["strategy"], "css");
        let back: Step = serde_json::from_value(raw).unwrap();
        assert_eq!(back, step);
    }

    #[test]
    fn role_hint_requires_role() {
        let hint = SelectorHint {
            strategy: SelectorStrategy::Role,
            value: "submit".into(),
            role: None,
            name: None,
        };
        assert!(hint.validate().is_err());
        let hint = SelectorHint {
            role: Some("button".into()),
            ..hint
        };
        assert!(hint.validate().is_ok());
    }

    #[test]
    fn goto_value_must_be_a_url() {
        let step = Step {
            action: StepAction::Goto {
                value: "not a url".into(),
            },
            description: "open".into(),
            timeout: None,
        };
        assert!(step.validate().is_err());
    }

    #[test]
    fn wait_value_without_selector_must_be_millis() {
        let step = Step {
            action: StepAction::Wait {
                selector: None,
                value: Some("soon".into()),
            },
            description: "wait".into(),
            timeout: None,
        };
        assert!(step.validate().is_err());
        let step = Step {
            action: StepAction::Wait {
                selector: None,
                value: Some("1500".into()),
            },
            description: "wait".into(),
            timeout: None,
        };
        assert!(step.validate().is_ok());
    }

    #[test]
    fn evaluation_clamps_confidence_before_validation() {
        let raw = json!({ "result": "pass", "confidence": 1.7, "reason": "looks right" });
        let eval = EvaluationResult::from_raw(&raw).unwrap();
        assert_eq!(eval.result, Verdict::Pass);
        assert_eq!(eval.confidence, 1.0);
    }

    #[test]
    fn evaluation_rejects_empty_reason() {
        let raw = json!({ "result": "FAIL", "confidence": 0.5, "reason": "  " });
        assert!(EvaluationResult::from_raw(&raw).is_err());
    }

    #[test]
    fn agent_decision_parses_done_and_action() {
        let done = AgentDecision::from_value(&json!({ "done": true, "summary": "finished" }))
            .unwrap();
        assert_eq!(
            done,
            AgentDecision::Done {
                summary: "finished".into()
            }
        );

        let act = AgentDecision::from_value(&json!({
            "done": false,
            "action": {
                "type": "click",
                "selector": { "strategy": "testid", "value": "submit" },
                "description": "Press submit"
            }
        }))
        .unwrap();
        match act {
            AgentDecision::Act { step } => assert_eq!(step.kind(), "click"),
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[test]
    fn agent_decision_rejects_goto_actions() {
        let err = AgentDecision::from_value(&json!({
            "done": false,
            "action": {
                "type": "goto",
                "value": "https://example.test",
                "description": "navigate away"
            }
        }));
        assert!(err.is_err());
    }
}
