//! Loop engines and shared run plumbing.

pub mod agent;
pub mod plan_once;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::browser::Driver;
use crate::config::{RunConfig, LOGIN_MAX_STEPS};
use crate::errors::{EXIT_FAIL, EXIT_PASS, EXIT_UNCERTAIN};
use crate::planner::Planner;
use crate::report::{generate_json, generate_markdown, serialize_json};
use crate::runner::StepRunner;
use crate::schema::{BugReport, PageSnapshot, RunSummary, StepExecutionResult, Verdict};

/// What a loop engine hands back to the CLI.
#[derive(Debug)]
pub struct LoopOutcome {
    pub summary: RunSummary,
    pub exit_code: i32,
}

pub fn exit_code_for(verdict: Verdict) -> i32 {
    match verdict {
        Verdict::Pass => EXIT_PASS,
        Verdict::Fail => EXIT_FAIL,
        Verdict::Uncertain => EXIT_UNCERTAIN,
    }
}

/// Wall-clock budget for the whole run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn new(total: Duration) -> Self {
        Self {
            at: Instant::now() + total,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Whether `extra` still fits before the deadline.
    pub fn allows(&self, extra: Duration) -> bool {
        Instant::now() + extra < self.at
    }
}

/// Best-effort artifact writes under the run's output directory. Only the
/// summary is part of the public contract.
pub(crate) struct Artifacts {
    output_dir: PathBuf,
}

impl Artifacts {
    pub async fn new(output_dir: PathBuf) -> Self {
        if let Err(err) = tokio::fs::create_dir_all(&output_dir).await {
            warn!(dir = %output_dir.display(), error = %err, "cannot create output directory");
        }
        Self { output_dir }
    }

    pub async fn write_step(&self, result: &StepExecutionResult) {
        let path = self
            .output_dir
            .join(format!("step-{}.json", result.step_index));
        match serde_json::to_string_pretty(result) {
            Ok(body) => {
                if let Err(err) = tokio::fs::write(&path, body).await {
                    warn!(path = %path.display(), error = %err, "cannot write step artifact");
                }
            }
            Err(err) => warn!(error = %err, "cannot serialize step artifact"),
        }
    }

    /// The versioned contract file; stable byte output.
    pub async fn write_summary(&self, run: &RunSummary, exit_code: i32) {
        let report = generate_json(run, exit_code);
        let mut body = serialize_json(&report);
        body.push('\n');
        let path = self.output_dir.join("summary.json");
        if let Err(err) = tokio::fs::write(&path, body).await {
            warn!(path = %path.display(), error = %err, "cannot write summary.json");
        }
    }

    pub async fn write_markdown(&self, run: &RunSummary, exit_code: i32) {
        let path = self.output_dir.join("report.md");
        if let Err(err) = tokio::fs::write(&path, generate_markdown(run, exit_code)).await {
            warn!(path = %path.display(), error = %err, "cannot write report.md");
        }
    }
}

pub(crate) fn build_summary(
    run_id: Uuid,
    config: &RunConfig,
    started_at: DateTime<Utc>,
    verdict: Verdict,
    steps: Vec<StepExecutionResult>,
    bugs: Vec<BugReport>,
    login_failed: bool,
) -> RunSummary {
    let finished_at = Utc::now();
    let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
    RunSummary {
        run_id,
        url: config.url.clone(),
        prompt: config.prompt.clone(),
        summary: verdict,
        started_at,
        finished_at,
        duration_ms,
        steps,
        bugs,
        login_failed,
    }
}

/// Bounded login sub-loop shared by both engines. Failure is non-fatal:
/// the run continues unauthenticated and the summary is flagged.
pub(crate) async fn login_subloop(
    driver: &Arc<dyn Driver>,
    planner: &Planner,
    runner: &StepRunner,
    login_prompt: &str,
    base_url: &str,
    snapshot: &PageSnapshot,
) -> bool {
    info!("running login sub-loop");
    let steps = match planner
        .plan(login_prompt, base_url, snapshot, None, LOGIN_MAX_STEPS)
        .await
    {
        Ok(steps) => steps,
        Err(err) => {
            warn!(error = %err, "login planning failed");
            return true;
        }
    };

    for (index, step) in steps.iter().enumerate() {
        let result = runner.execute_step(step, index).await;
        if !result.success {
            warn!(index, description = %step.description, "login step failed");
            return true;
        }
    }

    // Let any post-login redirects and XHRs settle.
    let _ = driver
        .wait_for_network_idle(Duration::from_secs(5))
        .await;
    false
}
