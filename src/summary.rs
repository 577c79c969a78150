//! Deterministic run verdict and bug harvesting.
//!
//! No LLM involvement: the verdict is a pure function of the step records,
//! and bugs are mechanical projections of the captured evidence.

use crate::schema::{
    BugReport, CaptureFrame, ConsoleLevel, Severity, StepExecutionResult, Verdict,
};

/// FAIL if any step failed or was judged FAIL; otherwise UNCERTAIN if any
/// judgement was UNCERTAIN; otherwise PASS.
pub fn compute_summary_verdict(steps: &[StepExecutionResult]) -> Verdict {
    let mut uncertain = false;
    for step in steps {
        if !step.success {
            return Verdict::Fail;
        }
        match step.evaluation.as_ref().map(|eval| eval.result) {
            Some(Verdict::Fail) => return Verdict::Fail,
            Some(Verdict::Uncertain) => uncertain = true,
            _ => {}
        }
    }
    if uncertain {
        Verdict::Uncertain
    } else {
        Verdict::Pass
    }
}

/// Evidence lines for one capture frame, in capture order.
pub fn evidence_lines(capture: &CaptureFrame) -> Vec<String> {
    let mut lines = Vec::new();
    for entry in &capture.console_entries {
        match entry.level {
            ConsoleLevel::Error => lines.push(format!("Console error: {}", entry.text)),
            ConsoleLevel::Warn => lines.push(format!("Console warning: {}", entry.text)),
        }
    }
    for failure in &capture.network_failures {
        lines.push(format!(
            "Network {} {} -> {}",
            failure.method, failure.url, failure.status
        ));
    }
    for error in &capture.page_errors {
        lines.push(format!("Page error: {}", error.message));
    }
    lines
}

/// Harvest bug records from the step results.
pub fn extract_bugs(steps: &[StepExecutionResult]) -> Vec<BugReport> {
    let mut bugs = Vec::new();
    for step in steps {
        let evidence = evidence_lines(&step.capture);
        if !step.success {
            bugs.push(BugReport {
                step_index: step.step_index,
                description: format!(
                    "Step {} failed: {}",
                    step.step_index, step.step.description
                ),
                severity: Severity::Critical,
                evidence,
            });
            continue;
        }
        if let Some(evaluation) = &step.evaluation {
            if evaluation.result == Verdict::Fail {
                let severity = if step.capture.page_errors.is_empty() {
                    Severity::Major
                } else {
                    Severity::Critical
                };
                bugs.push(BugReport {
                    step_index: step.step_index,
                    description: format!("Step {}: {}", step.step_index, evaluation.reason),
                    severity,
                    evidence,
                });
            }
        }
    }
    bugs
}

/// Bug record for a run that never got a plan.
pub fn planner_bug(message: &str) -> BugReport {
    BugReport {
        step_index: 0,
        description: format!("Planner error: {message}"),
        severity: Severity::Critical,
        evidence: Vec::new(),
    }
}
