//! Prompt template assets.
//!
//! Templates are opaque text with `{{key}}` slots, embedded from the
//! `prompts/` directory at the crate root.

/// System line sent with planner calls.
pub const PLANNER_SYSTEM: &str =
    "You are a meticulous web QA engineer. You output only valid JSON.";
/// System line sent with evaluator and final-evaluation calls.
pub const EVALUATOR_SYSTEM: &str =
    "You judge browser test evidence conservatively. You output only valid JSON.";
/// System line sent with agent decide calls.
pub const AGENT_SYSTEM: &str =
    "You operate a web browser step by step. You output only valid JSON.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    Planner,
    PlannerRepair,
    Evaluator,
    AgentStep,
    AgentFinal,
}

impl Template {
    fn text(self) -> &'static str {
        match self {
            Template::Planner => include_str!("../prompts/planner.md"),
            Template::PlannerRepair => include_str!("../prompts/planner_repair.md"),
            Template::Evaluator => include_str!("../prompts/evaluator.md"),
            Template::AgentStep => include_str!("../prompts/agent_step.md"),
            Template::AgentFinal => include_str!("../prompts/agent_final.md"),
        }
    }
}

/// Substitute `{{key}}` slots. Unknown slots are left in place so a missing
/// variable is visible in the rendered prompt rather than silently dropped.
pub fn render(template: Template, vars: &[(&str, &str)]) -> String {
    let mut out = template.text().to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{{{key}}}}}"), value);
    }
    out
}
