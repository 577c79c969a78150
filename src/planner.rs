//! Plan generation.
//!
//! Renders the planner template from a snapshot, calls the LLM (vision
//! when available), extracts and repairs the JSON, and validates the step
//! list. One template-based repair retry; a second failure is a planner
//! error (exit 3).

use std::sync::Arc;

use base64::Engine;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use crate::errors::{PromptQaError, Result};
use crate::llm::extract::extract_json;
use crate::llm::LlmClient;
use crate::prompts::{render, Template, PLANNER_SYSTEM};
use crate::schema::{InteractiveElement, PageSnapshot, Step, StepAction};

pub struct Planner {
    llm: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Produce an ordered, validated step list for the goal.
    pub async fn plan(
        &self,
        prompt: &str,
        base_url: &str,
        snapshot: &PageSnapshot,
        screenshot: Option<&[u8]>,
        max_steps: usize,
    ) -> Result<Vec<Step>> {
        let elements = serialize_elements(&snapshot.elements);
        let user = render(
            Template::Planner,
            &[
                ("prompt", prompt),
                ("baseUrl", base_url),
                ("url", &snapshot.url),
                ("title", &snapshot.title),
                (
                    "metaDescription",
                    snapshot.meta_description.as_deref().unwrap_or(""),
                ),
                ("visibleText", &snapshot.visible_text),
                ("elements", &elements),
            ],
        );

        let raw = match screenshot {
            Some(bytes) if self.llm.supports_vision() => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                self.llm
                    .generate_with_image(PLANNER_SYSTEM, &user, &encoded, "image/png")
                    .await?
            }
            _ => self.llm.generate(PLANNER_SYSTEM, &user).await?,
        };

        match parse_steps(&raw, max_steps) {
            Ok(steps) => Ok(steps),
            Err(err) => {
                warn!(error = %err, "planner output invalid, attempting repair");
                let repair = render(
                    Template::PlannerRepair,
                    &[("raw", raw.as_str()), ("error", &err.to_string())],
                );
                let raw = self.llm.generate(PLANNER_SYSTEM, &repair).await?;
                parse_steps(&raw, max_steps).map_err(|err| {
                    PromptQaError::Planner(format!("repair attempt still invalid: {err}"))
                })
            }
        }
    }
}

/// Extract, repair and validate one raw planner response.
pub fn parse_steps(raw: &str, max_steps: usize) -> Result<Vec<Step>> {
    let slice = extract_json(raw);
    let mut value: Value = serde_json::from_str(&slice)
        .map_err(|err| PromptQaError::Schema(format!("response is not valid JSON: {err}")))?;
    fixup_raw_steps(&mut value);
    validate_plan(value, max_steps)
}

/// Pre-validation repair on the untyped value. Idempotent: valid input
/// passes through unchanged.
pub fn fixup_raw_steps(value: &mut Value) {
    let Some(items) = value.as_array_mut() else {
        return;
    };
    for item in items {
        let Some(step) = item.as_object_mut() else {
            continue;
        };
        fixup_step(step);
    }
}

fn fixup_step(step: &mut Map<String, Value>) {
    let kind = step
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();

    // Numeric values (wait milliseconds, mostly) become strings.
    if let Some(number) = step.get("value").filter(|value| value.is_number()).cloned() {
        step.insert("value".to_string(), Value::String(number.to_string()));
    }

    let missing_description = step
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .map_or(true, str::is_empty);
    if missing_description {
        step.insert(
            "description".to_string(),
            Value::String(format!("{kind} step")),
        );
    }

    if let Some(selector) = step.get_mut("selector") {
        fixup_selector(selector);
    }

    if kind == "expect_text" {
        let missing_value = step
            .get("value")
            .and_then(Value::as_str)
            .map(str::trim)
            .map_or(true, str::is_empty);
        if missing_value {
            let description = step
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            step.insert(
                "value".to_string(),
                Value::String(expect_text_from_description(&description)),
            );
        }
    }
}

/// Rewrite unknown selector strategies into valid ones.
fn fixup_selector(selector: &mut Value) {
    if let Some(css) = selector.as_str() {
        let css = css.to_string();
        *selector = serde_json::json!({ "strategy": "css", "value": css });
        return;
    }
    let Some(map) = selector.as_object_mut() else {
        return;
    };
    let strategy = map
        .get("strategy")
        .and_then(Value::as_str)
        .unwrap_or("css")
        .to_string();
    let value = map
        .get("value")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    match strategy.as_str() {
        "testid" | "role" | "text" | "css" => {}
        "placeholder" => {
            map.insert("strategy".to_string(), Value::String("css".into()));
            map.insert(
                "value".to_string(),
                Value::String(format!("input[placeholder='{value}']")),
            );
        }
        "name" => {
            map.insert("strategy".to_string(), Value::String("css".into()));
            map.insert("value".to_string(), Value::String(format!("[name='{value}']")));
        }
        "id" => {
            map.insert("strategy".to_string(), Value::String("css".into()));
            map.insert("value".to_string(), Value::String(format!("#{value}")));
        }
        "label" => {
            map.insert("strategy".to_string(), Value::String("text".into()));
        }
        other => {
            let attribute = format!("[{other}='{value}']");
            map.insert("strategy".to_string(), Value::String("css".into()));
            map.insert("value".to_string(), Value::String(attribute));
        }
    }
}

fn expect_text_from_description(description: &str) -> String {
    let quoted = Regex::new("['\"]([^'\"]+)['\"]").expect("static regex");
    if let Some(capture) = quoted.captures(description).and_then(|c| c.get(1)) {
        return capture.as_str().to_string();
    }
    let fallback: String = description.chars().take(60).collect();
    if fallback.trim().is_empty() {
        "expected text".to_string()
    } else {
        fallback
    }
}

/// Narrow the repaired value and enforce the plan invariants: non-empty,
/// capped length, first step navigates.
pub fn validate_plan(value: Value, max_steps: usize) -> Result<Vec<Step>> {
    let mut steps: Vec<Step> = serde_json::from_value(value)
        .map_err(|err| PromptQaError::Schema(format!("step list does not match schema: {err}")))?;
    if steps.is_empty() {
        return Err(PromptQaError::Schema("plan contains no steps".into()));
    }
    if steps.len() > max_steps {
        warn!(planned = steps.len(), max_steps, "plan truncated");
        steps.truncate(max_steps);
    }
    for step in &steps {
        step.validate()?;
    }
    if !matches!(steps[0].action, StepAction::Goto { .. }) {
        return Err(PromptQaError::Schema(
            "first step must be a goto".into(),
        ));
    }
    Ok(steps)
}

/// Serialize elements as pseudo-HTML tags with state flags for the prompt.
pub fn serialize_elements(elements: &[InteractiveElement]) -> String {
    if elements.is_empty() {
        return "(none)".to_string();
    }
    elements.iter().map(element_line).collect::<Vec<_>>().join("\n")
}

fn element_line(element: &InteractiveElement) -> String {
    let mut attrs = String::new();
    if let Some(kind) = &element.kind {
        attrs.push_str(&format!(" type=\"{kind}\""));
    }
    if let Some(test_id) = &element.test_id {
        attrs.push_str(&format!(" data-testid=\"{test_id}\""));
    }
    if let Some(name) = &element.name {
        attrs.push_str(&format!(" name=\"{name}\""));
    }
    if let Some(placeholder) = &element.placeholder {
        attrs.push_str(&format!(" placeholder=\"{placeholder}\""));
    }
    if let Some(href) = &element.href {
        attrs.push_str(&format!(" href=\"{href}\""));
    }
    if let Some(options) = &element.options {
        attrs.push_str(&format!(" options=\"{}\"", options.join("|")));
    }
    if element.disabled.unwrap_or(false) {
        attrs.push_str(" DISABLED");
    }
    if element.read_only.unwrap_or(false) {
        attrs.push_str(" READONLY");
    }
    if element.aria_busy.unwrap_or(false) {
        attrs.push_str(" BUSY");
    }
    if let Some(classes) = &element.class_list {
        if classes.iter().any(|class| {
            let lowered = class.to_ascii_lowercase();
            lowered.contains("loading") || lowered.contains("spinner") || lowered.contains("busy")
        }) {
            attrs.push_str(" LOADING");
        }
    }
    let text = element.text.as_deref().unwrap_or("");
    format!("<{tag}{attrs}>{text}</{tag}>", tag = element.tag)
}
