//! Validation of the JSON a `command` action prints on stdout
//!
//! The accepted document is the host's hook-output schema for the event
//! type. Anything outside it (unknown keys, wrong types, fields the event
//! cannot carry) is rejected with a message; the caller turns that into the
//! event's safe default.

use serde_json::{Map, Value};

use super::event::EventKind;
use super::outcome::{ActionOutput, Decision, PermissionDecision};

pub const REASON_REQUIRED: &str = "reason is required when decision is block";

/// Parse and validate command stdout for `kind`.
pub fn parse_command_output(kind: EventKind, stdout: &str) -> Result<ActionOutput, String> {
    let value: Value =
        serde_json::from_str(stdout.trim()).map_err(|e| format!("invalid JSON output: {}", e))?;
    let Value::Object(fields) = value else {
        return Err("output must be a JSON object".to_string());
    };

    let mut out = ActionOutput::default();
    for (key, value) in &fields {
        match key.as_str() {
            "continue" => out.continue_ = Some(expect_bool(key, value)?),
            "stopReason" => out.stop_reason = Some(expect_str(key, value)?),
            "suppressOutput" => out.suppress_output = Some(expect_bool(key, value)?),
            "systemMessage" => out.system_message = Some(expect_str(key, value)?),
            "decision" if kind.carries_decision() => {
                out.decision = Decision::parse(&expect_str(key, value)?)?;
            }
            "reason" if kind.carries_decision() => out.reason = Some(expect_str(key, value)?),
            "hookSpecificOutput" if kind.has_specific_output() => {
                let Value::Object(specific) = value else {
                    return Err("hookSpecificOutput must be an object".to_string());
                };
                parse_specific(kind, specific, &mut out)?;
            }
            other => return Err(format!("field '{}' is not allowed for {}", other, kind)),
        }
    }

    if out.decision == Some(Decision::Block) && is_blank(out.reason.as_deref()) {
        return Err(REASON_REQUIRED.to_string());
    }
    Ok(out)
}

fn parse_specific(
    kind: EventKind,
    specific: &Map<String, Value>,
    out: &mut ActionOutput,
) -> Result<(), String> {
    let name = match specific.get("hookEventName") {
        Some(v) => expect_str("hookEventName", v)?,
        None => return Err("hookSpecificOutput.hookEventName is required".to_string()),
    };
    if name != kind.as_str() {
        return Err(format!(
            "hookSpecificOutput.hookEventName is '{}' but the event is {}",
            name, kind
        ));
    }
    out.hook_event_name = Some(name);

    for (key, value) in specific {
        match (kind, key.as_str()) {
            (_, "hookEventName") => {}
            (EventKind::PreToolUse, "permissionDecision") => {
                out.permission_decision = PermissionDecision::parse(&expect_str(key, value)?)?;
            }
            (EventKind::PreToolUse, "permissionDecisionReason") => {
                out.reason = Some(expect_str(key, value)?);
            }
            (EventKind::PreToolUse, "updatedInput") => match value {
                Value::Object(input) => out.updated_input = Some(input.clone()),
                _ => return Err("updatedInput must be an object".to_string()),
            },
            (EventKind::PostToolUse, "updatedMCPToolOutput") => {
                out.updated_tool_output = Some(value.clone());
            }
            (
                EventKind::PostToolUse | EventKind::UserPromptSubmit | EventKind::SessionStart,
                "additionalContext",
            ) => out.additional_context = Some(expect_str(key, value)?),
            (_, other) => {
                return Err(format!(
                    "hookSpecificOutput.{} is not allowed for {}",
                    other, kind
                ));
            }
        }
    }
    Ok(())
}

fn expect_str(key: &str, value: &Value) -> Result<String, String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| format!("{} must be a string", key))
}

fn expect_bool(key: &str, value: &Value) -> Result<bool, String> {
    value
        .as_bool()
        .ok_or_else(|| format!("{} must be a boolean", key))
}

pub(crate) fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pre_tool_use_output() {
        let out = parse_command_output(
            EventKind::PreToolUse,
            r#"{"hookSpecificOutput": {"hookEventName": "PreToolUse",
                "permissionDecision": "ask", "permissionDecisionReason": "check",
                "updatedInput": {"command": "ls"}}, "systemMessage": "hi"}"#,
        )
        .unwrap();
        assert_eq!(out.permission_decision, Some(PermissionDecision::Ask));
        assert_eq!(out.reason.as_deref(), Some("check"));
        assert_eq!(out.updated_input.unwrap()["command"], "ls");
        assert_eq!(out.system_message.as_deref(), Some("hi"));
        assert_eq!(out.hook_event_name.as_deref(), Some("PreToolUse"));
    }

    #[test]
    fn test_block_requires_reason() {
        let err = parse_command_output(EventKind::Stop, r#"{"decision": "block"}"#).unwrap_err();
        assert_eq!(err, REASON_REQUIRED);

        let out =
            parse_command_output(EventKind::Stop, r#"{"decision": "block", "reason": "tests"}"#)
                .unwrap();
        assert_eq!(out.decision, Some(Decision::Block));
    }

    #[test]
    fn test_rejects_fields_outside_event_schema() {
        let err = parse_command_output(EventKind::SessionEnd, r#"{"decision": "block"}"#)
            .unwrap_err();
        assert!(err.contains("not allowed for SessionEnd"));

        let err = parse_command_output(
            EventKind::SessionStart,
            r#"{"hookSpecificOutput": {"hookEventName": "SessionStart", "permissionDecision": "deny"}}"#,
        )
        .unwrap_err();
        assert!(err.contains("hookSpecificOutput.permissionDecision"));

        assert!(parse_command_output(EventKind::Stop, r#"{"bogus": 1}"#).is_err());
    }

    #[test]
    fn test_rejects_wrong_types_and_names() {
        assert!(parse_command_output(EventKind::Stop, r#"{"continue": "yes"}"#).is_err());
        assert!(parse_command_output(EventKind::Stop, "[1, 2]").is_err());
        assert!(parse_command_output(EventKind::Stop, "not json").is_err());
        assert!(
            parse_command_output(
                EventKind::UserPromptSubmit,
                r#"{"hookSpecificOutput": {"additionalContext": "x"}}"#,
            )
            .unwrap_err()
            .contains("hookEventName is required")
        );
        assert!(
            parse_command_output(
                EventKind::UserPromptSubmit,
                r#"{"hookSpecificOutput": {"hookEventName": "Stop", "additionalContext": "x"}}"#,
            )
            .is_err()
        );
    }

    #[test]
    fn test_common_fields_everywhere() {
        for kind in EventKind::ALL {
            let out = parse_command_output(
                kind,
                r#"{"continue": true, "suppressOutput": true, "systemMessage": "m"}"#,
            )
            .unwrap();
            assert_eq!(out.suppress_output, Some(true));
        }
    }
}
