//! Condition evaluation: ordered AND over predicates looked up by (event, tag)

use tracing::debug;

use super::error::ConditionError;
use super::event::{Event, EventKind};
use super::predicates::{self, Predicate, PredicateContext};
use crate::config::Condition;

/// Result of evaluating a rule's condition list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionOutcome {
    Matched,
    NotMatched,
    /// A condition tag has no predicate for this event type
    Unhandled {
        kind: EventKind,
        condition_type: String,
    },
}

const COMMON: &[(&str, Predicate)] = &[
    ("file_exists", predicates::file_exists),
    ("file_exists_recursive", predicates::file_exists_recursive),
    ("file_not_exists", predicates::file_not_exists),
    ("file_not_exists_recursive", predicates::file_not_exists_recursive),
    ("dir_exists", predicates::dir_exists),
    ("dir_exists_recursive", predicates::dir_exists_recursive),
    ("dir_not_exists", predicates::dir_not_exists),
    ("dir_not_exists_recursive", predicates::dir_not_exists_recursive),
    ("cwd_is", predicates::cwd_is),
    ("cwd_is_not", predicates::cwd_is_not),
    ("cwd_contains", predicates::cwd_contains),
    ("cwd_not_contains", predicates::cwd_not_contains),
    ("permission_mode_is", predicates::permission_mode_is),
    ("random_chance", predicates::random_chance),
];

const TOOL: &[(&str, Predicate)] = &[
    ("file_extension", predicates::file_extension),
    ("command_contains", predicates::command_contains),
    ("command_starts_with", predicates::command_starts_with),
    ("url_starts_with", predicates::url_starts_with),
];

const PROMPT: &[(&str, Predicate)] = &[
    ("prompt_regex", predicates::prompt_regex),
    ("every_n_prompts", predicates::every_n_prompts),
];

const SESSION_END: &[(&str, Predicate)] = &[("reason_is", predicates::reason_is)];

fn exclusive(kind: EventKind) -> &'static [(&'static str, Predicate)] {
    match kind {
        EventKind::PreToolUse | EventKind::PostToolUse => TOOL,
        EventKind::UserPromptSubmit => PROMPT,
        EventKind::SessionEnd => SESSION_END,
        EventKind::Notification
        | EventKind::Stop
        | EventKind::SubagentStop
        | EventKind::PreCompact
        | EventKind::SessionStart => &[],
    }
}

/// Find the predicate registered for a condition tag on this event type.
pub fn lookup(kind: EventKind, condition_type: &str) -> Option<Predicate> {
    COMMON
        .iter()
        .chain(exclusive(kind))
        .find(|(tag, _)| *tag == condition_type)
        .map(|(_, predicate)| *predicate)
}

/// Tags usable with this event type, for validation messages.
pub fn known_types(kind: EventKind) -> Vec<&'static str> {
    COMMON
        .iter()
        .chain(exclusive(kind))
        .map(|(tag, _)| *tag)
        .collect()
}

/// Evaluate conditions left to right, stopping at the first false.
///
/// Tags after a false condition are never looked up, so an unknown tag only
/// surfaces as [`ConditionOutcome::Unhandled`] when evaluation reaches it.
pub fn evaluate_conditions(
    conditions: &[Condition],
    event: &Event,
) -> Result<ConditionOutcome, ConditionError> {
    if conditions.is_empty() {
        return Ok(ConditionOutcome::Matched);
    }

    let ctx = PredicateContext::new(event)?;
    let kind = event.kind();
    for condition in conditions {
        let Some(predicate) = lookup(kind, &condition.condition_type) else {
            return Ok(ConditionOutcome::Unhandled {
                kind,
                condition_type: condition.condition_type.clone(),
            });
        };
        if !predicate(&condition.value, &ctx)? {
            debug!(
                "Condition {}={:?} did not match",
                condition.condition_type, condition.value
            );
            return Ok(ConditionOutcome::NotMatched);
        }
    }
    Ok(ConditionOutcome::Matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(condition_type: &str, value: &str) -> Condition {
        Condition {
            condition_type: condition_type.to_string(),
            value: value.to_string(),
        }
    }

    fn bash(command: &str) -> Event {
        Event::from_value(
            EventKind::PreToolUse,
            json!({
                "session_id": "s",
                "transcript_path": "/tmp/none.jsonl",
                "hook_event_name": "PreToolUse",
                "cwd": "/",
                "tool_name": "Bash",
                "tool_input": {"command": command}
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_list_matches() {
        assert_eq!(
            evaluate_conditions(&[], &bash("ls")).unwrap(),
            ConditionOutcome::Matched
        );
    }

    #[test]
    fn test_all_true_matches() {
        let conditions = [
            cond("command_contains", "rm -rf"),
            cond("command_starts_with", "rm"),
        ];
        assert_eq!(
            evaluate_conditions(&conditions, &bash("rm -rf /tmp/x")).unwrap(),
            ConditionOutcome::Matched
        );
    }

    #[test]
    fn test_false_short_circuits_before_unknown_tag() {
        let conditions = [cond("command_contains", "sudo"), cond("no_such_tag", "x")];
        assert_eq!(
            evaluate_conditions(&conditions, &bash("ls")).unwrap(),
            ConditionOutcome::NotMatched
        );
    }

    #[test]
    fn test_unknown_tag_is_unhandled_not_false() {
        let conditions = [cond("command_contains", "ls"), cond("no_such_tag", "x")];
        assert_eq!(
            evaluate_conditions(&conditions, &bash("ls")).unwrap(),
            ConditionOutcome::Unhandled {
                kind: EventKind::PreToolUse,
                condition_type: "no_such_tag".to_string(),
            }
        );
    }

    #[test]
    fn test_tags_are_event_scoped() {
        assert!(lookup(EventKind::PreToolUse, "command_contains").is_some());
        assert!(lookup(EventKind::Stop, "command_contains").is_none());
        assert!(lookup(EventKind::UserPromptSubmit, "prompt_regex").is_some());
        assert!(lookup(EventKind::SessionEnd, "reason_is").is_some());
        assert!(lookup(EventKind::SessionStart, "reason_is").is_none());
        for kind in EventKind::ALL {
            assert!(lookup(kind, "file_exists").is_some());
            assert!(known_types(kind).contains(&"random_chance"));
        }
    }

    #[test]
    fn test_predicate_error_propagates() {
        let conditions = [cond("random_chance", "150")];
        assert!(evaluate_conditions(&conditions, &bash("ls")).is_err());
    }
}
