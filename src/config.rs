//! Run configuration: hard limits, CLI-level settings, and the optional
//! config file (`.promptqa.yaml`, YAML or JSON).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::browser::Cookie;
use crate::errors::{PromptQaError, Result};

/// Default per-action timeout.
pub const ACTION_TIMEOUT_MS: u64 = 8_000;
/// Default navigation timeout.
pub const NAVIGATION_TIMEOUT_MS: u64 = 15_000;
/// Default whole-run budget in seconds.
pub const TOTAL_TIMEOUT_SECS: u64 = 180;
/// Backoff before re-executing a step classified `element_not_found`.
pub const RETRY_WAIT_MS: u64 = 2_000;
/// Default cap on planned steps.
pub const DEFAULT_MAX_STEPS: usize = 12;
/// Cap on login sub-loop steps.
pub const LOGIN_MAX_STEPS: usize = 6;
/// Cap on agent-loop iterations.
pub const AGENT_MAX_STEPS: usize = 20;
/// Truncation for visible text re-read after each step.
pub const MAX_VISIBLE_TEXT_CHARS: usize = 8_000;
/// Truncation for the prescan body text.
pub const PRESCAN_TEXT_CHARS: usize = 4_000;
/// Per-frame cap on retained console entries.
pub const MAX_CONSOLE_ERRORS: usize = 10;
/// Per-frame cap on retained network failures.
pub const MAX_NETWORK_ERRORS: usize = 10;
/// Cap on interactive elements serialized into a snapshot.
pub const MAX_ELEMENTS: usize = 50;
/// Truncation for agent history observations.
pub const OBSERVATION_CHARS: usize = 80;
/// Quiet window that counts as network idle.
pub const NETWORK_IDLE_QUIET_MS: u64 = 500;
/// Default artifact directory.
pub const DEFAULT_OUTPUT_DIR: &str = ".artifacts";
/// Default config file path.
pub const DEFAULT_CONFIG_PATH: &str = ".promptqa.yaml";

/// Which loop engine drives the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Plan once, then execute and evaluate the whole step list.
    Plan,
    /// Observe-decide-act closed loop.
    Agent,
}

impl Default for Strategy {
    fn default() -> Self {
        Strategy::Plan
    }
}

/// Fully resolved configuration for a single run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub url: String,
    pub prompt: String,
    pub max_steps: usize,
    pub headless: bool,
    pub total_timeout: Duration,
    pub output_dir: PathBuf,
    pub strategy: Strategy,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub cookie: Option<String>,
    pub login_prompt: Option<String>,
}

impl RunConfig {
    pub fn new(url: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            prompt: prompt.into(),
            max_steps: DEFAULT_MAX_STEPS,
            headless: false,
            total_timeout: Duration::from_secs(TOTAL_TIMEOUT_SECS),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            strategy: Strategy::default(),
            provider: None,
            model: None,
            cookie: None,
            login_prompt: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.url)
            .map_err(|err| PromptQaError::Config(format!("invalid url '{}': {err}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PromptQaError::Config(format!(
                "url '{}' must be http(s)",
                self.url
            )));
        }
        if self.prompt.trim().is_empty() {
            return Err(PromptQaError::Config("prompt must be non-empty".into()));
        }
        if self.max_steps == 0 {
            return Err(PromptQaError::Config("maxSteps must be positive".into()));
        }
        if self.total_timeout.is_zero() {
            return Err(PromptQaError::Config("timeout must be positive".into()));
        }
        Ok(())
    }

    /// Cookies attached to the context before any navigation.
    pub fn cookies(&self) -> Result<Vec<Cookie>> {
        match &self.cookie {
            Some(raw) => parse_cookie_header(raw, &self.url),
            None => Ok(Vec::new()),
        }
    }
}

/// Auth block of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default)]
    pub login_prompt: Option<String>,
}

/// One named test in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TestEntry {
    pub name: String,
    pub prompt: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// On-disk configuration (`.promptqa.yaml`). YAML is a superset of JSON, so
/// one parser covers both formats.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
    pub base_url: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    #[serde(default)]
    pub strategy: Option<Strategy>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub tests: Vec<TestEntry>,
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_timeout_secs() -> u64 {
    TOTAL_TIMEOUT_SECS
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            PromptQaError::Config(format!("cannot read config {}: {err}", path.display()))
        })?;
        let config: FileConfig = serde_yaml::from_str(&raw).map_err(|err| {
            PromptQaError::Config(format!("cannot parse config {}: {err}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url).map_err(|err| {
            PromptQaError::Config(format!("invalid baseUrl '{}': {err}", self.base_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PromptQaError::Config(format!(
                "baseUrl '{}' must be http(s)",
                self.base_url
            )));
        }
        if self.max_steps == 0 {
            return Err(PromptQaError::Config("maxSteps must be positive".into()));
        }
        if self.timeout == 0 {
            return Err(PromptQaError::Config("timeout must be positive".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for test in &self.tests {
            if test.name.trim().is_empty() {
                return Err(PromptQaError::Config("test name must be non-empty".into()));
            }
            if test.prompt.trim().is_empty() {
                return Err(PromptQaError::Config(format!(
                    "test '{}' has an empty prompt",
                    test.name
                )));
            }
            if !seen.insert(test.name.clone()) {
                return Err(PromptQaError::Config(format!(
                    "duplicate test name '{}'",
                    test.name
                )));
            }
        }
        Ok(())
    }

    /// Resolve one test entry into a RunConfig, rooted at `output_dir/<name>`.
    pub fn run_config_for(&self, test: &TestEntry, output_dir: &Path) -> RunConfig {
        let mut config = RunConfig::new(
            test.url.clone().unwrap_or_else(|| self.base_url.clone()),
            test.prompt.clone(),
        );
        config.max_steps = self.max_steps;
        config.headless = self.headless;
        config.total_timeout = Duration::from_secs(self.timeout);
        config.output_dir = output_dir.join(sanitize_name(&test.name));
        config.strategy = self.strategy.unwrap_or_default();
        config.provider = self.provider.clone();
        config.model = self.model.clone();
        if let Some(auth) = &self.auth {
            config.cookie = auth.cookie.clone();
            config.login_prompt = auth.login_prompt.clone();
        }
        config
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '-'
            }
        })
        .collect()
}

/// Parse a `"name=value; name2=value2"` header into cookies scoped to the
/// target URL. Malformed pairs are an error.
pub fn parse_cookie_header(raw: &str, url: &str) -> Result<Vec<Cookie>> {
    let mut cookies = Vec::new();
    for pair in raw.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (name, value) = pair.split_once('=').ok_or_else(|| {
            PromptQaError::Config(format!("malformed cookie pair '{pair}' (expected name=value)"))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(PromptQaError::Config(format!(
                "cookie pair '{pair}' has an empty name"
            )));
        }
        cookies.push(Cookie {
            name: name.to_string(),
            value: value.trim().to_string(),
            url: url.to_string(),
        });
    }
    Ok(cookies)
}
