//! Folding per-action results into the single outcome the host receives
//!
//! Every action yields an [`ActionOutput`] where each field is either present
//! or absent. [`OutcomeFolder`] applies them left to right with per-field merge
//! rules:
//!
//! - last wins: permission decision, decision, stop reason, suppress output,
//!   updated input, updated tool output
//! - newline-joined: additional context, system message, reason (reason
//!   restarts whenever the governing decision changes value)
//! - set once: hook event name
//! - `continue` only ever goes from true to false, and is pinned to true for
//!   events the host cannot stop
//!
//! Fields the event's schema does not allow are dropped on entry, so an
//! [`Outcome`] can always be serialized as-is.

use std::fmt;

use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use super::event::EventKind;

/// Top-level `decision` used by PostToolUse, Stop, SubagentStop and UserPromptSubmit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Block => "block",
        }
    }

    /// Parse a configured value. Empty means "no opinion", same as absent.
    pub fn parse(value: &str) -> Result<Option<Self>, String> {
        match value.trim() {
            "" => Ok(None),
            "block" => Ok(Some(Decision::Block)),
            "allow" | "approve" => Ok(Some(Decision::Allow)),
            other => Err(format!(
                "decision must be \"block\" or \"allow\", got \"{}\"",
                other
            )),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PreToolUse `permissionDecision`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDecision {
    Allow,
    Deny,
    Ask,
}

impl PermissionDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionDecision::Allow => "allow",
            PermissionDecision::Deny => "deny",
            PermissionDecision::Ask => "ask",
        }
    }

    /// Parse a configured value. Empty means "no opinion", same as absent.
    pub fn parse(value: &str) -> Result<Option<Self>, String> {
        match value.trim() {
            "" => Ok(None),
            "allow" => Ok(Some(PermissionDecision::Allow)),
            "deny" => Ok(Some(PermissionDecision::Deny)),
            "ask" => Ok(Some(PermissionDecision::Ask)),
            other => Err(format!(
                "permission_decision must be \"allow\", \"deny\" or \"ask\", got \"{}\"",
                other
            )),
        }
    }
}

impl fmt::Display for PermissionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One action's contribution. `None` means the action has no opinion on that field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutput {
    pub continue_: Option<bool>,
    pub decision: Option<Decision>,
    pub permission_decision: Option<PermissionDecision>,
    pub reason: Option<String>,
    pub additional_context: Option<String>,
    pub system_message: Option<String>,
    pub stop_reason: Option<String>,
    pub suppress_output: Option<bool>,
    pub updated_input: Option<Map<String, Value>>,
    pub updated_tool_output: Option<Value>,
    pub hook_event_name: Option<String>,
}

impl ActionOutput {
    /// Safe default after a validation or execution failure.
    ///
    /// Events that can gate get deny/block with the diagnostic as reason.
    /// The rest keep going and surface the diagnostic as a system message.
    pub fn failure(kind: EventKind, diagnostic: impl Into<String>) -> Self {
        let diagnostic = diagnostic.into();
        match kind {
            EventKind::PreToolUse => Self {
                permission_decision: Some(PermissionDecision::Deny),
                reason: Some(diagnostic),
                ..Self::default()
            },
            k if k.can_block() => Self {
                decision: Some(Decision::Block),
                reason: Some(diagnostic),
                ..Self::default()
            },
            _ => Self {
                continue_: Some(true),
                system_message: Some(diagnostic),
                ..Self::default()
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The final, schema-constrained result for one event.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub kind: EventKind,
    pub continue_: bool,
    pub decision: Option<Decision>,
    pub permission_decision: Option<PermissionDecision>,
    pub reason: Option<String>,
    pub additional_context: Option<String>,
    pub system_message: Option<String>,
    pub stop_reason: Option<String>,
    pub suppress_output: Option<bool>,
    pub updated_input: Option<Map<String, Value>>,
    pub updated_tool_output: Option<Value>,
    pub hook_event_name: Option<String>,
}

impl Outcome {
    /// Outcome when no rule matched: proceed, nothing to add.
    pub fn proceed(kind: EventKind) -> Self {
        Self {
            kind,
            continue_: true,
            decision: None,
            permission_decision: None,
            reason: None,
            additional_context: None,
            system_message: None,
            stop_reason: None,
            suppress_output: None,
            updated_input: None,
            updated_tool_output: None,
            hook_event_name: None,
        }
    }

    /// Whether the outcome holds the event's terminal deny/block value.
    pub fn is_terminal(&self) -> bool {
        match self.kind {
            EventKind::PreToolUse => self.permission_decision == Some(PermissionDecision::Deny),
            EventKind::Stop | EventKind::SubagentStop | EventKind::UserPromptSubmit => {
                self.decision == Some(Decision::Block)
            }
            _ => false,
        }
    }

    /// Host-facing JSON document.
    pub fn to_payload(&self) -> Value {
        let mut payload = Map::new();
        payload.insert("continue".into(), Value::Bool(self.continue_));
        if let Some(ref stop_reason) = self.stop_reason {
            payload.insert("stopReason".into(), json!(stop_reason));
        }
        if let Some(suppress) = self.suppress_output {
            payload.insert("suppressOutput".into(), Value::Bool(suppress));
        }
        if let Some(ref message) = self.system_message {
            payload.insert("systemMessage".into(), json!(message));
        }

        if self.kind.carries_decision() && self.decision == Some(Decision::Block) {
            payload.insert("decision".into(), json!(Decision::Block.as_str()));
            if let Some(ref reason) = self.reason {
                payload.insert("reason".into(), json!(reason));
            }
        }

        if self.kind.has_specific_output() {
            let mut specific = Map::new();
            if let Some(pd) = self.permission_decision {
                specific.insert("permissionDecision".into(), json!(pd.as_str()));
                if let Some(ref reason) = self.reason {
                    specific.insert("permissionDecisionReason".into(), json!(reason));
                }
            }
            if let Some(ref input) = self.updated_input {
                specific.insert("updatedInput".into(), Value::Object(input.clone()));
            }
            if let Some(ref context) = self.additional_context {
                specific.insert("additionalContext".into(), json!(context));
            }
            if let Some(ref output) = self.updated_tool_output {
                specific.insert("updatedMCPToolOutput".into(), output.clone());
            }
            if !specific.is_empty() {
                let name = self.hook_event_name.as_deref().unwrap_or(self.kind.as_str());
                specific.insert("hookEventName".into(), json!(name));
                payload.insert("hookSpecificOutput".into(), Value::Object(specific));
            }
        }

        Value::Object(payload)
    }
}

/// Whether processing continues after an action was folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Terminate,
}

/// Left fold of [`ActionOutput`]s into an [`Outcome`] for one event kind.
pub struct OutcomeFolder {
    outcome: Outcome,
    terminated: bool,
}

impl OutcomeFolder {
    pub fn new(kind: EventKind) -> Self {
        Self {
            outcome: Outcome::proceed(kind),
            terminated: false,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.outcome.kind
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Merge one action's output. After `Terminate` every further call is a no-op.
    pub fn apply(&mut self, output: ActionOutput) -> Flow {
        if self.terminated {
            return Flow::Terminate;
        }

        let output = self.restrict_to_schema(output);
        let kind = self.kind();
        let current = &mut self.outcome;

        if current.hook_event_name.is_none() {
            current.hook_event_name = non_empty(output.hook_event_name);
        }

        match output.continue_ {
            Some(false) if kind.pins_continue() => {
                warn!("{} cannot be stopped; ignoring continue=false", kind);
            }
            Some(false) => current.continue_ = false,
            _ => {}
        }

        let decision_changed = if kind == EventKind::PreToolUse {
            let changed = output.permission_decision.is_some()
                && output.permission_decision != current.permission_decision;
            if output.permission_decision.is_some() {
                current.permission_decision = output.permission_decision;
            }
            changed
        } else {
            let changed = output.decision.is_some() && output.decision != current.decision;
            if output.decision.is_some() {
                current.decision = output.decision;
            }
            changed
        };
        if decision_changed {
            current.reason = non_empty(output.reason);
        } else {
            append_line(&mut current.reason, output.reason);
        }

        append_line(&mut current.additional_context, output.additional_context);
        append_line(&mut current.system_message, output.system_message);

        if let Some(stop_reason) = non_empty(output.stop_reason) {
            current.stop_reason = Some(stop_reason);
        }
        if output.suppress_output.is_some() {
            current.suppress_output = output.suppress_output;
        }
        if output.updated_input.is_some() {
            current.updated_input = output.updated_input;
        }
        if output.updated_tool_output.is_some() {
            current.updated_tool_output = output.updated_tool_output;
        }

        if kind.early_terminates() && current.is_terminal() {
            debug!("{} reached a terminal decision; skipping remaining actions", kind);
            self.terminated = true;
            return Flow::Terminate;
        }
        Flow::Continue
    }

    pub fn finish(self) -> Outcome {
        let mut outcome = self.outcome;

        // A reason only reaches the host next to a decision it explains.
        let decision_visible = match outcome.kind {
            EventKind::PreToolUse => outcome.permission_decision.is_some(),
            k if k.carries_decision() => outcome.decision == Some(Decision::Block),
            _ => false,
        };
        if !decision_visible && let Some(reason) = outcome.reason.take() {
            append_line(&mut outcome.system_message, Some(reason));
        }

        outcome
    }

    fn restrict_to_schema(&self, mut output: ActionOutput) -> ActionOutput {
        let kind = self.kind();
        let mut dropped = Vec::new();

        if kind != EventKind::PreToolUse {
            if output.permission_decision.take().is_some() {
                dropped.push("permission_decision");
            }
            if output.updated_input.take().is_some() {
                dropped.push("updated_input");
            }
        }
        if !kind.carries_decision() && output.decision.take().is_some() {
            dropped.push("decision");
        }
        if kind != EventKind::PreToolUse
            && !kind.carries_decision()
            && output.reason.take().is_some()
        {
            dropped.push("reason");
        }
        if !kind.carries_context() && output.additional_context.take().is_some() {
            dropped.push("additional_context");
        }
        if kind != EventKind::PostToolUse && output.updated_tool_output.take().is_some() {
            dropped.push("updated_tool_output");
        }

        if !dropped.is_empty() {
            warn!("{} does not support {}; ignoring", kind, dropped.join(", "));
        }
        output
    }
}

/// Fold a whole sequence at once.
pub fn fold(kind: EventKind, outputs: impl IntoIterator<Item = ActionOutput>) -> Outcome {
    let mut folder = OutcomeFolder::new(kind);
    for output in outputs {
        if folder.apply(output) == Flow::Terminate {
            break;
        }
    }
    folder.finish()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn append_line(target: &mut Option<String>, addition: Option<String>) {
    let Some(addition) = non_empty(addition) else {
        return;
    };
    match target {
        Some(existing) if !existing.is_empty() => {
            existing.push('\n');
            existing.push_str(&addition);
        }
        _ => *target = Some(addition),
    }
}
