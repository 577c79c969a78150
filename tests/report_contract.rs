//! Contract laws: byte-stable report serialization, idempotent step
//! repair, and JSON extraction over noisy model output.

use chrono::TimeZone;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use promptqa::planner::fixup_raw_steps;
use promptqa::llm::extract::{extract_json, extract_json_object};
use promptqa::report::{generate_json, serialize_json};
use promptqa::schema::{
    BugReport, CaptureFrame, ConsoleEntry, ConsoleLevel, EvaluationResult, RunSummary,
    SelectorHint, Severity, Step, StepAction, StepExecutionResult, Verdict,
};

fn sample_run() -> RunSummary {
    let step = StepExecutionResult {
        step_index: 0,
        step: Step {
            action: StepAction::Goto {
                value: "http://example.test".into(),
            },
            description: "open the page".into(),
            timeout: None,
        },
        success: true,
        url: "http://example.test".into(),
        screenshot_path: ".artifacts/screenshots/step-0.png".into(),
        visible_text: "Example Domain".into(),
        capture: CaptureFrame {
            console_entries: vec![ConsoleEntry {
                level: ConsoleLevel::Error,
                text: "boom".into(),
            }],
            ..CaptureFrame::default()
        },
        evaluation: Some(EvaluationResult {
            result: Verdict::Pass,
            confidence: 0.9,
            reason: "page loaded".into(),
        }),
    };
    RunSummary {
        run_id: Uuid::nil(),
        url: "http://example.test".into(),
        prompt: "visit and check title".into(),
        summary: Verdict::Pass,
        started_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        finished_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 30).unwrap(),
        duration_ms: 30_000,
        steps: vec![step],
        bugs: vec![BugReport {
            step_index: 0,
            description: "Console noise".into(),
            severity: Severity::Minor,
            evidence: vec!["Console error: boom".into()],
        }],
        login_failed: false,
    }
}

#[test]
fn report_serialization_is_byte_identical_for_equal_inputs() {
    let run = sample_run();
    let one = serialize_json(&generate_json(&run, 0));
    let two = serialize_json(&generate_json(&run, 0));
    assert_eq!(one, two);
}

#[test]
fn key_order_is_stable_under_structural_permutation() {
    let permuted: Value = serde_json::from_str(
        r#"{"steps":[],"version":"1.0","bugs":[],"summary":"PASS","runId":"x","url":"u","prompt":"p","durationMs":1,"exitCode":0}"#,
    )
    .unwrap();
    let canonical: Value = serde_json::from_str(
        r#"{"bugs":[],"durationMs":1,"exitCode":0,"prompt":"p","runId":"x","steps":[],"summary":"PASS","url":"u","version":"1.0"}"#,
    )
    .unwrap();
    assert_eq!(serialize_json(&permuted), serialize_json(&canonical));
}

#[test]
fn report_step_rows_match_the_contract_fields() {
    let report = generate_json(&sample_run(), 0);
    let step = &report["steps"][0];
    for field in [
        "index",
        "type",
        "description",
        "result",
        "confidence",
        "reason",
        "screenshotPath",
        "errors",
    ] {
        assert!(step.get(field).is_some(), "missing field {field}");
    }
    assert_eq!(step["type"], "goto");
    assert_eq!(step["errors"][0], "Console error: boom");
    let bug = &report["bugs"][0];
    for field in ["stepIndex", "description", "severity", "evidence"] {
        assert!(bug.get(field).is_some(), "missing field {field}");
    }
}

#[test]
fn fixup_is_idempotent_over_a_messy_plan() {
    let mut value = json!([
        { "type": "goto", "value": "http://example.test" },
        { "type": "type", "selector": { "strategy": "placeholder", "value": "Email" }, "value": "a@b.c" },
        { "type": "wait", "value": 250 },
        { "type": "expect_text", "description": "shows 'Welcome'" },
    ]);
    fixup_raw_steps(&mut value);
    let once = value.clone();
    fixup_raw_steps(&mut value);
    assert_eq!(value, once);

    // The repaired plan narrows cleanly.
    let steps: Vec<Step> = serde_json::from_value(once).unwrap();
    assert_eq!(steps.len(), 4);
    for step in &steps {
        step.validate().unwrap();
    }
}

#[test]
fn extraction_returns_parseable_slices() {
    let cases = [
        "```json\n[{\"type\":\"goto\",\"value\":\"http://x.test\",\"description\":\"d\"}]\n```",
        "Here you go: [\"a\", [\"nested\"], \"b\"] -- enjoy",
        "[1,2,3]",
    ];
    for raw in cases {
        let slice = extract_json(raw);
        serde_json::from_str::<Value>(&slice).expect(raw);
    }

    let objects = [
        "prefix {\"result\":\"PASS\",\"confidence\":1,\"reason\":\"r\"} suffix",
        "```\n{\"done\":true,\"summary\":\"s\"}\n```",
        "{\"reason\":\"contains } in a string\",\"ok\":true}",
    ];
    for raw in objects {
        let slice = extract_json_object(raw).expect(raw);
        serde_json::from_str::<Value>(&slice).expect(raw);
    }
}

#[test]
fn selector_hints_survive_report_roundtrips() {
    let step = Step {
        action: StepAction::Click {
            selector: SelectorHint {
                strategy: promptqa::schema::SelectorStrategy::Role,
                value: "submit".into(),
                role: Some("button".into()),
                name: Some("Save".into()),
            },
            value: None,
        },
        description: "click save".into(),
        timeout: Some(5_000),
    };
    let raw = serde_json::to_value(&step).unwrap();
    let back: Step = serde_json::from_value(raw).unwrap();
    assert_eq!(back, step);
}
