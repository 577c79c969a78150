//! CLI surface: `test` runs one prompt, `run` executes every test in the
//! config file. Human progress goes to stderr via tracing; JSON (with
//! `--json`) is the only thing written to stdout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{info, warn};

use crate::browser::{CdpDriver, Driver};
use crate::config::{
    FileConfig, RunConfig, Strategy, DEFAULT_CONFIG_PATH, DEFAULT_OUTPUT_DIR,
};
use crate::errors::{PromptQaError, Result, EXIT_CONFIG};
use crate::llm::client_from_env;
use crate::loops::{agent, plan_once, LoopOutcome};
use crate::report::{generate_json, serialize_json};

/// PromptQA: prompt-driven browser testing.
#[derive(Parser, Debug)]
#[command(name = "promptqa", version, about, propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Test one URL against a natural-language prompt
    Test(TestArgs),
    /// Run every test from the config file (or one with --test)
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct TestArgs {
    /// Target URL
    pub url: String,

    /// Natural-language goal to test
    pub prompt: String,

    /// Emit the summary report as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Artifact directory
    #[arg(long = "report-path", default_value = DEFAULT_OUTPUT_DIR)]
    pub report_path: PathBuf,

    /// Cap on planned steps
    #[arg(long = "max-steps")]
    pub max_steps: Option<usize>,

    /// Run the browser headless
    #[arg(long)]
    pub headless: bool,

    /// Whole-run timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Config file path
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Pre-auth cookies ("name=value; name2=value2")
    #[arg(long)]
    pub cookie: Option<String>,

    /// Natural-language login instructions, run before the main prompt
    #[arg(long = "login-prompt")]
    pub login_prompt: Option<String>,

    /// Loop engine
    #[arg(long, value_enum)]
    pub strategy: Option<Strategy>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Config file path
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Run only the named test
    #[arg(long)]
    pub test: Option<String>,

    /// Emit summary reports as a JSON array on stdout
    #[arg(long)]
    pub json: bool,

    /// Artifact root; each test gets its own subdirectory
    #[arg(long = "report-path", default_value = DEFAULT_OUTPUT_DIR)]
    pub report_path: PathBuf,

    /// Cap on planned steps
    #[arg(long = "max-steps")]
    pub max_steps: Option<usize>,

    /// Run the browser headless
    #[arg(long)]
    pub headless: bool,

    /// Whole-run timeout in seconds, per test
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Loop engine
    #[arg(long, value_enum)]
    pub strategy: Option<Strategy>,
}

pub async fn cmd_test(args: TestArgs) -> i32 {
    match run_single(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            err.exit_code()
        }
    }
}

async fn run_single(args: TestArgs) -> Result<i32> {
    let mut config = RunConfig::new(args.url, args.prompt);

    if args.config.exists() {
        let file = FileConfig::load(&args.config)?;
        config.max_steps = file.max_steps;
        config.headless = file.headless;
        config.total_timeout = Duration::from_secs(file.timeout);
        config.strategy = file.strategy.unwrap_or_default();
        config.provider = file.provider.clone();
        config.model = file.model.clone();
        if let Some(auth) = &file.auth {
            config.cookie = auth.cookie.clone();
            config.login_prompt = auth.login_prompt.clone();
        }
    }

    if let Some(max_steps) = args.max_steps {
        config.max_steps = max_steps;
    }
    if args.headless {
        config.headless = true;
    }
    if let Some(timeout) = args.timeout {
        config.total_timeout = Duration::from_secs(timeout);
    }
    config.output_dir = args.report_path;
    if let Some(cookie) = args.cookie {
        config.cookie = Some(cookie);
    }
    if let Some(login_prompt) = args.login_prompt {
        config.login_prompt = Some(login_prompt);
    }
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    config.validate()?;

    let outcome = execute(&config).await?;
    if args.json {
        let report = generate_json(&outcome.summary, outcome.exit_code);
        println!("{}", serialize_json(&report));
    }
    Ok(outcome.exit_code)
}

pub async fn cmd_run(args: RunArgs) -> i32 {
    match run_suite(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            err.exit_code()
        }
    }
}

async fn run_suite(args: RunArgs) -> Result<i32> {
    let file = FileConfig::load(&args.config)?;
    let selected: Vec<_> = match &args.test {
        Some(name) => {
            let test = file
                .tests
                .iter()
                .find(|test| &test.name == name)
                .ok_or_else(|| {
                    PromptQaError::Config(format!("no test named '{name}' in config"))
                })?;
            vec![test.clone()]
        }
        None => file.tests.clone(),
    };
    if selected.is_empty() {
        return Err(PromptQaError::Config("config defines no tests".into()));
    }

    let mut worst = 0i32;
    let mut reports: Vec<Value> = Vec::new();
    for test in &selected {
        info!(test = %test.name, "starting test");
        let mut config = file.run_config_for(test, &args.report_path);
        if let Some(max_steps) = args.max_steps {
            config.max_steps = max_steps;
        }
        if args.headless {
            config.headless = true;
        }
        if let Some(timeout) = args.timeout {
            config.total_timeout = Duration::from_secs(timeout);
        }
        if let Some(strategy) = args.strategy {
            config.strategy = strategy;
        }
        config.validate()?;

        let code = match execute(&config).await {
            Ok(outcome) => {
                reports.push(generate_json(&outcome.summary, outcome.exit_code));
                outcome.exit_code
            }
            Err(err) => {
                eprintln!("test '{}' errored: {err}", test.name);
                err.exit_code()
            }
        };
        info!(test = %test.name, exit_code = code, "test finished");
        worst = worst.max(code);
    }

    if args.json {
        println!("{}", serialize_json(&Value::Array(reports)));
    }
    Ok(worst.min(EXIT_CONFIG))
}

/// Launch the browser, run the selected engine, and always close the
/// session afterwards.
async fn execute(config: &RunConfig) -> Result<LoopOutcome> {
    let llm = client_from_env(config.provider.as_deref(), config.model.as_deref())?;
    let driver: Arc<dyn Driver> = Arc::new(CdpDriver::launch(config.headless).await?);

    let result = match config.strategy {
        Strategy::Plan => plan_once::run(Arc::clone(&driver), llm, config).await,
        Strategy::Agent => agent::run(Arc::clone(&driver), llm, config).await,
    };

    if let Err(err) = driver.close().await {
        warn!(error = %err, "browser close failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_subcommand_parses_flags() {
        let cli = Cli::parse_from([
            "promptqa",
            "test",
            "http://app.test",
            "check the title",
            "--json",
            "--max-steps",
            "5",
            "--headless",
            "--timeout",
            "60",
            "--cookie",
            "sid=abc",
            "--strategy",
            "agent",
        ]);
        match cli.command {
            Commands::Test(args) => {
                assert_eq!(args.url, "http://app.test");
                assert!(args.json);
                assert_eq!(args.max_steps, Some(5));
                assert!(args.headless);
                assert_eq!(args.timeout, Some(60));
                assert_eq!(args.cookie.as_deref(), Some("sid=abc"));
                assert_eq!(args.strategy, Some(Strategy::Agent));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn run_subcommand_defaults() {
        let cli = Cli::parse_from(["promptqa", "run"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
                assert_eq!(args.report_path, PathBuf::from(DEFAULT_OUTPUT_DIR));
                assert!(args.test.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
