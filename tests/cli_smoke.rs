//! CLI surface smoke tests; nothing here launches a browser.

use assert_cmd::prelude::*;
use std::process::Command;

#[test]
fn version_flag_works() {
    let bin = assert_cmd::cargo::cargo_bin!("promptqa");
    Command::new(bin).arg("--version").assert().success();
}

#[test]
fn invalid_url_is_a_config_error() {
    let bin = assert_cmd::cargo::cargo_bin!("promptqa");
    let assert = Command::new(bin)
        .args(["test", "not-a-url", "check the title"])
        .assert()
        .code(4);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("invalid url"), "stderr was: {stderr}");
}

#[test]
fn mock_provider_without_responses_is_a_config_error() {
    let bin = assert_cmd::cargo::cargo_bin!("promptqa");
    let assert = Command::new(bin)
        .args(["test", "http://example.test", "check the title"])
        .env("LLM_PROVIDER", "mock")
        .env_remove("PROMPTQA_MOCK_RESPONSES")
        .assert()
        .code(4);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(
        stderr.contains("PROMPTQA_MOCK_RESPONSES"),
        "stderr was: {stderr}"
    );
}

#[test]
fn run_requires_a_config_file() {
    let bin = assert_cmd::cargo::cargo_bin!("promptqa");
    let missing = tempfile::tempdir().unwrap().path().join("absent.yaml");
    Command::new(bin)
        .args(["run", "--config", missing.to_str().unwrap()])
        .assert()
        .code(4);
}

#[test]
fn unknown_provider_is_rejected() {
    let bin = assert_cmd::cargo::cargo_bin!("promptqa");
    let assert = Command::new(bin)
        .args(["test", "http://example.test", "check the title"])
        .env("LLM_PROVIDER", "carrier-pigeon")
        .assert()
        .code(4);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr);
    assert!(stderr.contains("carrier-pigeon"), "stderr was: {stderr}");
}
