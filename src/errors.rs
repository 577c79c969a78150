//! Unified error type and process exit codes.

use thiserror::Error;

/// Exit code for a passing run.
pub const EXIT_PASS: i32 = 0;
/// Exit code for a failing run.
pub const EXIT_FAIL: i32 = 1;
/// Exit code when the verdict could not be decided either way.
pub const EXIT_UNCERTAIN: i32 = 2;
/// Exit code when the planner could not produce a valid plan.
pub const EXIT_PLANNER: i32 = 3;
/// Exit code for configuration or unexpected errors.
pub const EXIT_CONFIG: i32 = 4;

#[derive(Debug, Error)]
pub enum PromptQaError {
    /// The planner failed to produce a valid step list after repair.
    #[error("planner error: {0}")]
    Planner(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("llm transport error: {0}")]
    Llm(String),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("schema validation failed: {0}")]
    Schema(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PromptQaError {
    /// Map an error to the process exit code contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            PromptQaError::Planner(_) => EXIT_PLANNER,
            _ => EXIT_CONFIG,
        }
    }
}

pub type Result<T> = std::result::Result<T, PromptQaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn planner_errors_map_to_exit_three() {
        let err = PromptQaError::Planner("no valid steps".into());
        assert_eq!(err.exit_code(), EXIT_PLANNER);
    }

    #[test]
    fn other_errors_map_to_exit_four() {
        let err = PromptQaError::Config("bad baseUrl".into());
        assert_eq!(err.exit_code(), EXIT_CONFIG);
        let err = PromptQaError::Llm("connection refused".into());
        assert_eq!(err.exit_code(), EXIT_CONFIG);
    }
}
