//! Report contract: versioned JSON with byte-stable serialization, plus a
//! human-readable markdown rendering.

use serde_json::{json, Value};

use crate::schema::{RunSummary, StepExecutionResult, Verdict};
use crate::summary::evidence_lines;

/// Frozen schema version of `summary.json`.
pub const REPORT_VERSION: &str = "1.0";

/// Build the versioned report record.
pub fn generate_json(run: &RunSummary, exit_code: i32) -> Value {
    let steps: Vec<Value> = run.steps.iter().map(step_row).collect();
    let bugs: Vec<Value> = run
        .bugs
        .iter()
        .map(|bug| {
            json!({
                "stepIndex": bug.step_index,
                "description": bug.description,
                "severity": bug.severity.as_str(),
                "evidence": bug.evidence,
            })
        })
        .collect();

    json!({
        "version": REPORT_VERSION,
        "summary": run.summary.as_str(),
        "runId": run.run_id.to_string(),
        "url": run.url,
        "prompt": run.prompt,
        "durationMs": run.duration_ms,
        "exitCode": exit_code,
        "steps": steps,
        "bugs": bugs,
    })
}

fn step_row(step: &StepExecutionResult) -> Value {
    let (result, confidence, reason) = match &step.evaluation {
        Some(evaluation) => (
            evaluation.result,
            evaluation.confidence,
            evaluation.reason.clone(),
        ),
        None => (
            if step.success {
                Verdict::Pass
            } else {
                Verdict::Fail
            },
            0.0,
            "step was not evaluated".to_string(),
        ),
    };
    json!({
        "index": step.step_index,
        "type": step.step.kind(),
        "description": step.step.description,
        "result": result.as_str(),
        "confidence": confidence,
        "reason": reason,
        "screenshotPath": step.screenshot_path,
        "errors": evidence_lines(&step.capture),
    })
}

/// Emit JSON with keys sorted lexicographically at every object level and
/// two-space indentation, so equal inputs produce identical bytes.
pub fn serialize_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value, 0);
    out
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push_str("[\n");
            for (index, item) in items.iter().enumerate() {
                indent(out, depth + 1);
                write_value(out, item, depth + 1);
                if index + 1 < items.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            indent(out, depth);
            out.push(']');
        }
        Value::Object(map) => {
            if map.is_empty() {
                out.push_str("{}");
                return;
            }
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push_str("{\n");
            for (index, key) in keys.iter().enumerate() {
                indent(out, depth + 1);
                out.push_str(&serde_json::to_string(key).expect("keys serialize"));
                out.push_str(": ");
                write_value(out, &map[key.as_str()], depth + 1);
                if index + 1 < keys.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            indent(out, depth);
            out.push('}');
        }
        leaf => out.push_str(&serde_json::to_string(leaf).expect("scalars serialize")),
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

/// Fixed-layout markdown report.
pub fn generate_markdown(run: &RunSummary, exit_code: i32) -> String {
    let mut out = String::new();
    out.push_str("# PromptQA Report\n\n");
    out.push_str("| | |\n|---|---|\n");
    out.push_str(&format!("| Verdict | **{}** |\n", run.summary));
    out.push_str(&format!("| URL | {} |\n", escape_cell(&run.url)));
    out.push_str(&format!("| Prompt | {} |\n", escape_cell(&run.prompt)));
    out.push_str(&format!("| Run ID | {} |\n", run.run_id));
    out.push_str(&format!("| Duration | {} ms |\n", run.duration_ms));
    out.push_str(&format!("| Exit code | {} |\n", exit_code));
    if run.login_failed {
        out.push_str("| Login | failed (run continued without auth) |\n");
    }
    out.push('\n');

    out.push_str("## Steps\n\n");
    if run.steps.is_empty() {
        out.push_str("No steps were executed.\n\n");
    } else {
        out.push_str("| # | Type | Description | Result | Confidence |\n");
        out.push_str("|---|------|-------------|--------|------------|\n");
        for step in &run.steps {
            let (result, confidence) = match &step.evaluation {
                Some(evaluation) => (
                    evaluation.result.as_str(),
                    format!("{:.2}", evaluation.confidence),
                ),
                None => (if step.success { "PASS" } else { "FAIL" }, "-".to_string()),
            };
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                step.step_index,
                step.step.kind(),
                escape_cell(&step.step.description),
                result,
                confidence,
            ));
        }
        out.push('\n');

        out.push_str("## Step details\n\n");
        for step in &run.steps {
            out.push_str(&format!(
                "### Step {}: {}\n\n",
                step.step_index,
                step.step.description.trim()
            ));
            out.push_str(&format!("- URL: {}\n", step.url));
            out.push_str(&format!(
                "- Outcome: {}\n",
                if step.success { "executed" } else { "failed" }
            ));
            if let Some(evaluation) = &step.evaluation {
                out.push_str(&format!(
                    "- Evaluation: {} ({:.2}) {}\n",
                    evaluation.result, evaluation.confidence, evaluation.reason
                ));
            }
            if !step.screenshot_path.is_empty() {
                out.push_str(&format!(
                    "- Screenshot: ![step {}]({})\n",
                    step.step_index, step.screenshot_path
                ));
            }
            let errors = evidence_lines(&step.capture);
            if !errors.is_empty() {
                out.push_str("- Errors:\n");
                for error in errors {
                    out.push_str(&format!("  - {}\n", error));
                }
            }
            out.push('\n');
        }
    }

    if !run.bugs.is_empty() {
        out.push_str("## Bug reports\n\n");
        for bug in &run.bugs {
            out.push_str(&format!(
                "### [{}] {}\n\n",
                bug.severity.as_str(),
                bug.description.trim()
            ));
            out.push_str(&format!("- Step: {}\n", bug.step_index));
            for line in &bug.evidence {
                out.push_str(&format!("- {}\n", line));
            }
            out.push('\n');
        }
    }

    out
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
