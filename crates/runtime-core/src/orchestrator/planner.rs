//! Bounded argument-repair loop (spec §4.G "optional planner/repair loop").
//!
//! When a tool call's arguments fail schema validation, the planner asks the
//! backend — in a side conversation, not the user-visible one — to produce
//! corrected JSON arguments. Bounded by `max_plan_steps` (how many times the
//! planner may be invoked at all during a request) and `max_rewrites` (how
//! many of those invocations may actually replace a call's arguments).

use serde_json::Value;

use crate::error::RuntimeError;
use crate::message::Message;
use crate::sampling::SamplingParams;

use super::{BackendRequest, ChatBackend};

#[derive(Debug, Clone, Copy)]
pub struct PlannerConfig {
    pub enabled: bool,
    pub max_plan_steps: u32,
    pub max_rewrites: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_plan_steps: 0,
            max_rewrites: 0,
        }
    }
}

/// `max_rewrites` bounds repairs *per tool call*, not per request — a call
/// with its own id tracks its own rewrite count, so one stubborn call can't
/// exhaust the budget for every other call in the same request.
#[derive(Debug, Default)]
pub struct PlannerState {
    pub plan_steps_used: u32,
    pub total_rewrites_used: u32,
    rewrites_by_call: std::collections::HashMap<String, u32>,
}

impl PlannerState {
    pub fn can_invoke(&self, config: &PlannerConfig, call_id: &str) -> bool {
        config.enabled
            && self.plan_steps_used < config.max_plan_steps
            && self.rewrites_by_call.get(call_id).copied().unwrap_or(0) < config.max_rewrites
    }

    pub fn record_rewrite(&mut self, call_id: &str) {
        *self.rewrites_by_call.entry(call_id.to_string()).or_insert(0) += 1;
        self.total_rewrites_used += 1;
    }
}

/// Ask the backend to correct `bad_arguments` against `schema`, given the
/// validation `error` that rejected them. Returns the parsed replacement
/// arguments, or an error if the backend's reply still isn't valid JSON.
pub async fn repair_arguments(
    backend: &dyn ChatBackend,
    model: &str,
    sampling: SamplingParams,
    tool_name: &str,
    schema: &Value,
    bad_arguments: &Value,
    error: &str,
) -> Result<Value, RuntimeError> {
    let prompt = format!(
        "Arguments supplied for tool `{tool_name}` were rejected: {error}\n\
         Schema: {schema}\n\
         Rejected arguments: {bad_arguments}\n\
         Reply with corrected JSON arguments only, no surrounding prose."
    );
    let request = BackendRequest {
        model: model.to_string(),
        messages: vec![
            Message::system("tool argument repair"),
            Message::user(prompt),
        ],
        sampling,
        tool_specs: &[],
        max_tokens: None,
    };
    let response = backend.complete(request).await?;
    let text = response.message.text();
    serde_json::from_str(text.trim()).map_err(|e| {
        RuntimeError::BadRequest(format!("planner repair did not produce valid json: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_by_default() {
        let state = PlannerState::default();
        assert!(!state.can_invoke(&PlannerConfig::default()));
    }

    #[test]
    fn respects_rewrite_budget() {
        let config = PlannerConfig {
            enabled: true,
            max_plan_steps: 2,
            max_rewrites: 1,
        };
        let mut state = PlannerState::default();
        assert!(state.can_invoke(&config, "call_1"));
        state.record_rewrite("call_1");
        assert!(!state.can_invoke(&config, "call_1"));
    }

    #[test]
    fn rewrite_budget_is_scoped_per_call() {
        let config = PlannerConfig {
            enabled: true,
            max_plan_steps: 10,
            max_rewrites: 1,
        };
        let mut state = PlannerState::default();
        state.record_rewrite("call_1");
        assert!(!state.can_invoke(&config, "call_1"));
        assert!(state.can_invoke(&config, "call_2"));
    }
}
