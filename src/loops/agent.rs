//! Agent engine: observe-decide-act until done, bounded by iterations and
//! the run deadline, with a final LLM evaluation of the end state.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use chrono::Utc;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::browser::prescan::{prescan, prescan_current, truncate_chars};
use crate::browser::Driver;
use crate::config::{RunConfig, AGENT_MAX_STEPS, NAVIGATION_TIMEOUT_MS, OBSERVATION_CHARS};
use crate::errors::{PromptQaError, Result};
use crate::llm::extract::extract_json_object;
use crate::llm::LlmClient;
use crate::loops::{
    build_summary, exit_code_for, login_subloop, Artifacts, Deadline, LoopOutcome,
};
use crate::planner::{fixup_raw_steps, serialize_elements, Planner};
use crate::prompts::{render, Template, AGENT_SYSTEM, EVALUATOR_SYSTEM};
use crate::runner::StepRunner;
use crate::schema::{
    ActionHistoryEntry, AgentDecision, EvaluationResult, PageSnapshot, StepExecutionResult,
};
use crate::summary::{compute_summary_verdict, extract_bugs};

pub async fn run(
    driver: Arc<dyn Driver>,
    llm: Arc<dyn LlmClient>,
    config: &RunConfig,
) -> Result<LoopOutcome> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let deadline = Deadline::new(config.total_timeout);
    let artifacts = Artifacts::new(config.output_dir.clone()).await;
    let runner = StepRunner::new(Arc::clone(&driver), config.output_dir.clone());
    let navigation_timeout = Duration::from_millis(NAVIGATION_TIMEOUT_MS);

    let cookies = config.cookies()?;
    if !cookies.is_empty() {
        driver
            .add_cookies(&cookies)
            .await
            .map_err(|err| PromptQaError::Browser(format!("cannot add cookies: {err}")))?;
    }

    info!(url = %config.url, "navigating to base URL");
    let snapshot = prescan(driver.as_ref(), &config.url, navigation_timeout)
        .await
        .map_err(|err| PromptQaError::Browser(format!("initial navigation failed: {err}")))?;

    let mut login_failed = false;
    if let Some(login_prompt) = &config.login_prompt {
        let planner = Planner::new(Arc::clone(&llm));
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
    }

    let mut history: Vec<ActionHistoryEntry> = Vec::new();
    let mut results: Vec<StepExecutionResult> = Vec::new();
    let mut done = false;

    let mut iteration = 0usize;
    while iteration < AGENT_MAX_STEPS && !deadline.expired() {
        iteration += 1;

        // Observe the current page; no navigation.
        let snapshot = match prescan_current(driver.as_ref()).await {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!(iteration, error = %err, "observation failed, ending the loop");
                break;
            }
        };
        let screenshot = driver.screenshot().await.ok();

        // Decide.
        let user = render(
            Template::AgentStep,
            &[
                ("prompt", config.prompt.as_str()),
                ("url", &snapshot.url),
                ("title", &snapshot.title),
                ("visibleText", &snapshot.visible_text),
                ("elements", &serialize_elements(&snapshot.elements)),
                ("history", &format_history(&history)),
            ],
        );
        let raw = generate_maybe_vision(&llm, AGENT_SYSTEM, &user, screenshot.as_deref()).await?;

        let decision = match parse_agent_decision(&raw) {
            Ok(decision) => decision,
            Err(err) => {
                warn!(iteration, error = %err, "agent response unusable, recording and continuing");
                history.push(ActionHistoryEntry {
                    step_index: results.len(),
                    action: "decide".to_string(),
                    description: "agent response could not be parsed".to_string(),
                    success: false,
                    observation: truncate_chars(&err.to_string(), OBSERVATION_CHARS),
                });
                continue;
            }
        };

        match decision {
            AgentDecision::Done { summary } => {
                info!(iteration, %summary, "agent declared the goal complete");
                done = true;
                break;
            }
            AgentDecision::Act { step } => {
                let index = results.len();
                let result = runner.execute_step(&step, index).await;
                artifacts.write_step(&result).await;
                history.push(ActionHistoryEntry {
                    step_index: index,
                    action: step.kind().to_string(),
                    description: step.description.clone(),
                    success: result.success,
                    observation: truncate_chars(&result.visible_text, OBSERVATION_CHARS),
                });
                results.push(result);
            }
        }
    }

    // Final evaluation of the end state, regardless of how the loop ended.
    let final_evaluation = final_evaluation(&driver, &llm, config, &history).await;
    if let Some(evaluation) = &final_evaluation {
        if let Some(last) = results.last_mut() {
            last.evaluation = Some(evaluation.clone());
        }
    }

    // With zero executed steps and a done declaration, the final evaluation
    // is the only evidence there is; it dictates the verdict.
    let verdict = match (&final_evaluation, results.is_empty() && done) {
        (Some(evaluation), true) => evaluation.result,
        _ => compute_summary_verdict(&results),
    };
    let bugs = extract_bugs(&results);
    let run = build_summary(
        run_id, config, started_at, verdict, results, bugs, login_failed,
    );
    let exit_code = exit_code_for(verdict);
    artifacts.write_summary(&run, exit_code).await;
    artifacts.write_markdown(&run, exit_code).await;
    info!(verdict = %verdict, exit_code, "agent run finished");

    Ok(LoopOutcome {
        summary: run,
        exit_code,
    })
}

async fn generate_maybe_vision(
    llm: &Arc<dyn LlmClient>,
    system: &str,
    user: &str,
    screenshot: Option<&[u8]>,
) -> Result<String> {
    match screenshot {
        Some(bytes) if llm.supports_vision() => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            llm.generate_with_image(system, user, &encoded, "image/png")
                .await
        }
        _ => llm.generate(system, user).await,
    }
}

/// Extract, repair and narrow one agent decision.
pub fn parse_agent_decision(raw: &str) -> Result<AgentDecision> {
    let slice = extract_json_object(raw)
        .ok_or_else(|| PromptQaError::Schema("response contains no JSON object".into()))?;
    let mut value: Value = serde_json::from_str(&slice)
        .map_err(|err| PromptQaError::Schema(format!("response is not valid JSON: {err}")))?;
    if let Some(action) = value.get_mut("action") {
        let mut wrapper = Value::Array(vec![action.take()]);
        fixup_raw_steps(&mut wrapper);
        if let Value::Array(mut items) = wrapper {
            *action = items.remove(0);
        }
    }
    AgentDecision::from_value(&value)
}

async fn final_evaluation(
    driver: &Arc<dyn Driver>,
    llm: &Arc<dyn LlmClient>,
    config: &RunConfig,
    history: &[ActionHistoryEntry],
) -> Option<EvaluationResult> {
    let snapshot: PageSnapshot = match prescan_current(driver.as_ref()).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(error = %err, "final observation failed, skipping final evaluation");
            return None;
        }
    };
    let screenshot = driver.screenshot().await.ok();
    let user = render(
        Template::AgentFinal,
        &[
            ("prompt", config.prompt.as_str()),
            ("url", &snapshot.url),
            ("title", &snapshot.title),
            ("visibleText", &snapshot.visible_text),
            ("history", &format_history(history)),
        ],
    );
    let raw = match generate_maybe_vision(llm, EVALUATOR_SYSTEM, &user, screenshot.as_deref()).await
    {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "final evaluation call failed");
            return None;
        }
    };
    let parsed = extract_json_object(&raw)
        .and_then(|slice| serde_json::from_str::<Value>(&slice).ok())
        .and_then(|value| EvaluationResult::from_raw(&value).ok());
    if parsed.is_none() {
        warn!("final evaluation output unusable");
    }
    parsed
}

fn format_history(history: &[ActionHistoryEntry]) -> String {
    if history.is_empty() {
        return "(none yet)".to_string();
    }
    history
        .iter()
        .map(|entry| {
            format!(
                "{}. [{}] {} -> {}{}",
                entry.step_index + 1,
                entry.action,
                entry.description,
                if entry.success { "ok" } else { "failed" },
                if entry.observation.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", entry.observation)
                },
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
