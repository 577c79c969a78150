//! End-to-end plan-once scenarios with the mock LLM and a scripted driver.

mod common;

use std::sync::Arc;

use serde_json::Value;

use common::{crash, FakeDriver};
use promptqa::config::RunConfig;
use promptqa::llm::MockClient;
use promptqa::loops::plan_once;
use promptqa::schema::{Severity, Verdict};

const PLAN_TWO_STEPS: &str = r#"[
  {"type":"goto","value":"http://example.test","description":"open"},
  {"type":"expect_text","value":"Example","description":"title"}
]"#;

const EVAL_PASS: &str = r#"{"result":"PASS","confidence":0.9,"reason":"ok"}"#;

fn config(output_dir: &std::path::Path) -> RunConfig {
    let mut config = RunConfig::new("http://example.test", "visit and check title");
    config.output_dir = output_dir.to_path_buf();
    config
}

#[tokio::test]
async fn happy_path_passes_with_two_steps() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(FakeDriver::new(
        "http://example.test",
        "Example",
        "Example Domain",
    ));
    let llm = Arc::new(MockClient::new(vec![
        PLAN_TWO_STEPS.into(),
        EVAL_PASS.into(),
        EVAL_PASS.into(),
    ]));

    let outcome = plan_once::run(driver.clone(), llm, &config(dir.path()))
        .await
        .unwrap();

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.summary.summary, Verdict::Pass);
    assert_eq!(outcome.summary.steps.len(), 2);
    assert!(outcome.summary.bugs.is_empty());
    // Prescan navigation plus the goto step.
    assert_eq!(driver.gotos().len(), 2);

    let raw = std::fs::read_to_string(dir.path().join("summary.json")).unwrap();
    let summary: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(summary["version"], "1.0");
    assert_eq!(summary["summary"], "PASS");
    assert_eq!(summary["exitCode"], 0);
    assert_eq!(summary["steps"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn planner_parse_failure_is_repaired_once() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(FakeDriver::new(
        "http://example.test",
        "Example",
        "Example Domain",
    ));
    let llm = Arc::new(MockClient::new(vec![
        "this is not json".into(),
        PLAN_TWO_STEPS.into(),
        EVAL_PASS.into(),
        EVAL_PASS.into(),
    ]));

    let outcome = plan_once::run(driver, llm.clone(), &config(dir.path()))
        .await
        .unwrap();

    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.summary.steps.len(), 2);
    // First attempt, repair, two evaluations.
    assert_eq!(llm.calls(), 4);
}

#[tokio::test]
async fn planner_hard_failure_exits_three_with_summary() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(FakeDriver::new(
        "http://example.test",
        "Example",
        "Example Domain",
    ));
    let llm = Arc::new(MockClient::new(vec![
        "not json".into(),
        "still not json".into(),
    ]));

    let outcome = plan_once::run(driver, llm, &config(dir.path()))
        .await
        .unwrap();

    assert_eq!(outcome.exit_code, 3);
    assert_eq!(outcome.summary.summary, Verdict::Fail);
    assert!(outcome.summary.steps.is_empty());
    assert!(outcome.summary.bugs[0].description.starts_with("Planner error"));
    assert_eq!(outcome.summary.bugs[0].severity, Severity::Critical);

    // summary.json is still attempted on planner failure.
    let raw = std::fs::read_to_string(dir.path().join("summary.json")).unwrap();
    let summary: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(summary["exitCode"], 3);
    assert_eq!(summary["summary"], "FAIL");
}

#[tokio::test]
async fn crash_mid_run_stops_the_loop_with_a_critical_bug() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(FakeDriver::new(
        "http://example.test",
        "Example",
        "Example Domain",
    ));
    // Step 1 (the click) crashes the page.
    driver.push_click_outcome(Err(crash("Uncaught TypeError: x is undefined")));

    let plan = r##"[
      {"type":"goto","value":"http://example.test","description":"open"},
      {"type":"click","selector":{"strategy":"css","value":"#one"},"description":"first click"},
      {"type":"click","selector":{"strategy":"css","value":"#two"},"description":"second click"}
    ]"##;
    let llm = Arc::new(MockClient::new(vec![
        plan.into(),
        EVAL_PASS.into(),
        r#"{"result":"FAIL","confidence":0.9,"reason":"page crashed"}"#.into(),
    ]));

    let outcome = plan_once::run(driver.clone(), llm, &config(dir.path()))
        .await
        .unwrap();

    assert_eq!(outcome.summary.summary, Verdict::Fail);
    assert_eq!(outcome.exit_code, 1);
    // The loop stopped after the crashed step; the third step never ran.
    assert_eq!(outcome.summary.steps.len(), 2);
    assert!(!outcome.summary.steps[1].success);
    assert!(outcome.summary.steps[1]
        .capture
        .page_errors
        .iter()
        .any(|error| error.message.contains("Uncaught TypeError")));
    let bug = &outcome.summary.bugs[0];
    assert_eq!(bug.severity, Severity::Critical);
    assert_eq!(bug.step_index, 1);
    // A crash is a hard fail: exactly one click, no retry.
    assert_eq!(driver.clicks(), 1);
}

#[tokio::test]
async fn no_effect_click_is_retried_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    // Body text never changes, so the click looks ineffective.
    let driver = Arc::new(FakeDriver::new(
        "http://example.test",
        "Example",
        "static page text",
    ));

    let plan = r##"[
      {"type":"goto","value":"http://example.test","description":"open"},
      {"type":"click","selector":{"strategy":"css","value":"#toggle"},"description":"toggle"}
    ]"##;
    let llm = Arc::new(MockClient::new(vec![
        plan.into(),
        EVAL_PASS.into(),
        EVAL_PASS.into(),
    ]));

    let outcome = plan_once::run(driver.clone(), llm, &config(dir.path()))
        .await
        .unwrap();

    // One initial execution plus a single immediate retry.
    assert_eq!(driver.clicks(), 2);
    assert_eq!(outcome.summary.steps.len(), 2);
    assert_eq!(outcome.summary.summary, Verdict::Pass);
}

#[tokio::test]
async fn uncertain_evaluation_yields_exit_two() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(FakeDriver::new(
        "http://example.test",
        "Example",
        "Example Domain",
    ));
    let llm = Arc::new(MockClient::new(vec![
        PLAN_TWO_STEPS.into(),
        EVAL_PASS.into(),
        r#"{"result":"UNCERTAIN","confidence":0.4,"reason":"cannot tell"}"#.into(),
    ]));

    let outcome = plan_once::run(driver, llm, &config(dir.path()))
        .await
        .unwrap();

    assert_eq!(outcome.summary.summary, Verdict::Uncertain);
    assert_eq!(outcome.exit_code, 2);
}

#[tokio::test]
async fn malformed_cookie_string_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(FakeDriver::new(
        "http://example.test",
        "Example",
        "Example Domain",
    ));
    let llm = Arc::new(MockClient::new(vec![PLAN_TWO_STEPS.into()]));

    let mut config = config(dir.path());
    config.cookie = Some("no-equals-sign".into());
    let err = plan_once::run(driver, llm, &config).await.unwrap_err();
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn cookies_are_attached_before_navigation() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(FakeDriver::new(
        "http://example.test",
        "Example",
        "Example Domain",
    ));
    let llm = Arc::new(MockClient::new(vec![
        PLAN_TWO_STEPS.into(),
        EVAL_PASS.into(),
        EVAL_PASS.into(),
    ]));

    let mut config = config(dir.path());
    config.cookie = Some("sid=abc".into());
    plan_once::run(driver.clone(), llm, &config).await.unwrap();
    // add_cookies ran; navigation happened afterwards.
    assert_eq!(driver.gotos()[0], "http://example.test");
}
