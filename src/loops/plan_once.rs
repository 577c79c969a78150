//! Plan-once engine: prescan -> plan -> execute with retry classification
//! -> per-step evaluation -> deterministic summary.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::browser::prescan::{prescan, prescan_current};
use crate::browser::Driver;
use crate::classify::{classify_failure, FailureClass};
use crate::config::{RunConfig, NAVIGATION_TIMEOUT_MS, RETRY_WAIT_MS};
use crate::errors::{PromptQaError, Result, EXIT_PLANNER};
use crate::evaluator::Evaluator;
use crate::llm::LlmClient;
use crate::loops::{
    build_summary, exit_code_for, login_subloop, Artifacts, Deadline, LoopOutcome,
};
use crate::planner::Planner;
use crate::runner::StepRunner;
use crate::schema::{StepExecutionResult, Verdict};
use crate::summary::{compute_summary_verdict, extract_bugs, planner_bug};

pub async fn run(
    driver: Arc<dyn Driver>,
    llm: Arc<dyn LlmClient>,
    config: &RunConfig,
) -> Result<LoopOutcome> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let deadline = Deadline::new(config.total_timeout);
    let artifacts = Artifacts::new(config.output_dir.clone()).await;

    let planner = Planner::new(Arc::clone(&llm));
    let evaluator = Evaluator::new(Arc::clone(&llm));
    let runner = StepRunner::new(Arc::clone(&driver), config.output_dir.clone());
    let navigation_timeout = Duration::from_millis(NAVIGATION_TIMEOUT_MS);
    let retry_wait = Duration::from_millis(RETRY_WAIT_MS);

    let cookies = config.cookies()?;
    if !cookies.is_empty() {
        driver
            .add_cookies(&cookies)
            .await
            .map_err(|err| PromptQaError::Browser(format!("cannot add cookies: {err}")))?;
    }

    info!(url = %config.url, "prescanning target");
    let mut snapshot = prescan(driver.as_ref(), &config.url, navigation_timeout)
        .await
        .map_err(|err| PromptQaError::Browser(format!("prescan failed: {err}")))?;
    let mut planner_screenshot = driver.screenshot().await.ok();

    let mut login_failed = false;
    if let Some(login_prompt) = &config.login_prompt {
        let login_runner =
            StepRunner::new(Arc::clone(&driver), config.output_dir.clone()).without_screenshots();
        login_failed = login_subloop(
            &driver,
            &planner,
            &login_runner,
            login_prompt,
            &config.url,
            &snapshot,
        )
        .await;
        match prescan_current(driver.as_ref()).await {
            Ok(fresh) => snapshot = fresh,
            Err(err) => warn!(error = %err, "post-login prescan failed, keeping previous snapshot"),
        }
        planner_screenshot = driver.screenshot().await.ok();
    }

    let steps = match planner
        .plan(
            &config.prompt,
            &config.url,
            &snapshot,
            planner_screenshot.as_deref(),
            config.max_steps,
        )
        .await
    {
        Ok(steps) => steps,
        Err(PromptQaError::Planner(message)) => {
            warn!(error = %message, "planner failed, reporting without execution");
            let run = build_summary(
                run_id,
                config,
                started_at,
                Verdict::Fail,
                Vec::new(),
                vec![planner_bug(&message)],
                login_failed,
            );
            artifacts.write_summary(&run, EXIT_PLANNER).await;
            artifacts.write_markdown(&run, EXIT_PLANNER).await;
            return Ok(LoopOutcome {
                summary: run,
                exit_code: EXIT_PLANNER,
            });
        }
        Err(err) => return Err(err),
    };
    info!(steps = steps.len(), "plan accepted");

    let mut results: Vec<StepExecutionResult> = Vec::new();
    let mut prev_visible_text: Option<String> = None;
    for (index, step) in steps.iter().enumerate() {
        if deadline.expired() {
            warn!(index, "run deadline reached, stopping before step");
            break;
        }

        let mut result = runner.execute_step(step, index).await;

        match classify_failure(&result, prev_visible_text.as_deref()) {
            FailureClass::ElementNotFound => {
                if deadline.allows(retry_wait) {
                    info!(index, "element not found, retrying after wait");
                    sleep(retry_wait).await;
                    result = runner.execute_step(step, index).await;
                }
            }
            FailureClass::ActionNoEffect => {
                info!(index, "action had no visible effect, retrying immediately");
                result = runner.execute_step(step, index).await;
            }
            _ => {}
        }

        if !deadline.expired() {
            match evaluator.evaluate(&result).await {
                Ok(evaluation) => result.evaluation = Some(evaluation),
                Err(err) => warn!(index, error = %err, "evaluation skipped"),
            }
        }

        artifacts.write_step(&result).await;

        // Intentionally re-classified after evaluation with the visible
        // text from before this step; only then does the baseline advance.
        let class = classify_failure(&result, prev_visible_text.as_deref());
        prev_visible_text = Some(result.visible_text.clone());
        results.push(result);

        if class == FailureClass::HardFail {
            warn!(index, "hard failure, stopping the run");
            break;
        }
    }

    let verdict = compute_summary_verdict(&results);
    let bugs = extract_bugs(&results);
    let run = build_summary(
        run_id, config, started_at, verdict, results, bugs, login_failed,
    );
    let exit_code = exit_code_for(verdict);
    artifacts.write_summary(&run, exit_code).await;
    artifacts.write_markdown(&run, exit_code).await;
    info!(verdict = %verdict, exit_code, "run finished");

    Ok(LoopOutcome {
        summary: run,
        exit_code,
    })
}
