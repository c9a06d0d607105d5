//! Hook event types delivered by the host, one per invocation

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::error::EventError;

/// The nine lifecycle points the host reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Before a tool runs. Can allow, deny or ask.
    PreToolUse,
    /// After a tool completed. Can annotate, never gate.
    PostToolUse,
    /// Host notification (permission prompt, idle, ...)
    Notification,
    /// Main agent is about to stop. Can block the stop.
    Stop,
    /// A subagent is about to stop. Can block the stop.
    SubagentStop,
    /// Before context compaction
    PreCompact,
    /// Session started, resumed or cleared
    SessionStart,
    /// Session ended
    SessionEnd,
    /// User submitted a prompt. Can block the prompt.
    UserPromptSubmit,
}

impl EventKind {
    pub const ALL: [EventKind; 9] = [
        EventKind::PreToolUse,
        EventKind::PostToolUse,
        EventKind::Notification,
        EventKind::Stop,
        EventKind::SubagentStop,
        EventKind::PreCompact,
        EventKind::SessionStart,
        EventKind::SessionEnd,
        EventKind::UserPromptSubmit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::PreToolUse => "PreToolUse",
            EventKind::PostToolUse => "PostToolUse",
            EventKind::Notification => "Notification",
            EventKind::Stop => "Stop",
            EventKind::SubagentStop => "SubagentStop",
            EventKind::PreCompact => "PreCompact",
            EventKind::SessionStart => "SessionStart",
            EventKind::SessionEnd => "SessionEnd",
            EventKind::UserPromptSubmit => "UserPromptSubmit",
        }
    }

    /// Whether a failure while handling this event defaults to deny/block.
    pub fn can_block(self) -> bool {
        matches!(
            self,
            EventKind::PreToolUse
                | EventKind::PostToolUse
                | EventKind::Stop
                | EventKind::SubagentStop
                | EventKind::UserPromptSubmit
        )
    }

    /// Whether reaching deny/block stops all further actions and rules.
    ///
    /// PostToolUse is excluded: the tool already ran, so every configured
    /// action still gets to contribute context.
    pub fn early_terminates(self) -> bool {
        matches!(
            self,
            EventKind::PreToolUse
                | EventKind::Stop
                | EventKind::SubagentStop
                | EventKind::UserPromptSubmit
        )
    }

    /// Whether the plain exit-code protocol is available for this event.
    pub fn supports_legacy(self) -> bool {
        matches!(
            self,
            EventKind::PreToolUse | EventKind::PostToolUse | EventKind::Stop | EventKind::SubagentStop
        )
    }

    /// Whether `continue` is forced to true because the host cannot stop here.
    pub fn pins_continue(self) -> bool {
        matches!(
            self,
            EventKind::Notification | EventKind::PreCompact | EventKind::SessionEnd
        )
    }

    /// Whether the top-level `decision`/`reason` pair is part of the schema.
    pub fn carries_decision(self) -> bool {
        matches!(
            self,
            EventKind::PostToolUse
                | EventKind::Stop
                | EventKind::SubagentStop
                | EventKind::UserPromptSubmit
        )
    }

    /// Whether the payload has a nested `hookSpecificOutput` block.
    pub fn has_specific_output(self) -> bool {
        matches!(
            self,
            EventKind::PreToolUse
                | EventKind::PostToolUse
                | EventKind::UserPromptSubmit
                | EventKind::SessionStart
        )
    }

    /// Whether `additionalContext` is a legal field.
    pub fn carries_context(self) -> bool {
        matches!(
            self,
            EventKind::PostToolUse | EventKind::UserPromptSubmit | EventKind::SessionStart
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| EventError::UnknownKind(s.to_string()))
    }
}

/// Fields every event carries
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub session_id: String,
    pub transcript_path: String,
    pub hook_event_name: String,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub permission_mode: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreToolUse {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostToolUse {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub tool_name: String,
    #[serde(default)]
    pub tool_input: Map<String, Value>,
    #[serde(default)]
    pub tool_response: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub notification_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Stop {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub stop_hook_active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubagentStop {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub stop_hook_active: bool,
    #[serde(default)]
    pub agent_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreCompact {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub custom_instructions: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionStart {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionEnd {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserPromptSubmit {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub prompt: String,
}

/// Typed view over the event, one variant per [`EventKind`]
#[derive(Debug, Clone)]
pub enum EventData {
    PreToolUse(PreToolUse),
    PostToolUse(PostToolUse),
    Notification(Notification),
    Stop(Stop),
    SubagentStop(SubagentStop),
    PreCompact(PreCompact),
    SessionStart(SessionStart),
    SessionEnd(SessionEnd),
    UserPromptSubmit(UserPromptSubmit),
}

/// One parsed event plus the JSON it came from.
///
/// The raw document is kept for template queries and for piping to
/// commands with `use_stdin`.
#[derive(Debug, Clone)]
pub struct Event {
    data: EventData,
    raw: Value,
}

impl Event {
    /// Parse stdin content as the event type chosen by the caller.
    pub fn parse(kind: EventKind, input: &str) -> Result<Self, EventError> {
        let raw: Value = serde_json::from_str(input).map_err(EventError::InvalidJson)?;
        Self::from_value(kind, raw)
    }

    pub fn from_value(kind: EventKind, raw: Value) -> Result<Self, EventError> {
        fn typed<T: serde::de::DeserializeOwned>(
            kind: EventKind,
            raw: &Value,
        ) -> Result<T, EventError> {
            serde_json::from_value(raw.clone()).map_err(|source| EventError::InvalidShape {
                kind: kind.as_str(),
                source,
            })
        }

        let data = match kind {
            EventKind::PreToolUse => EventData::PreToolUse(typed(kind, &raw)?),
            EventKind::PostToolUse => EventData::PostToolUse(typed(kind, &raw)?),
            EventKind::Notification => EventData::Notification(typed(kind, &raw)?),
            EventKind::Stop => EventData::Stop(typed(kind, &raw)?),
            EventKind::SubagentStop => EventData::SubagentStop(typed(kind, &raw)?),
            EventKind::PreCompact => EventData::PreCompact(typed(kind, &raw)?),
            EventKind::SessionStart => EventData::SessionStart(typed(kind, &raw)?),
            EventKind::SessionEnd => EventData::SessionEnd(typed(kind, &raw)?),
            EventKind::UserPromptSubmit => EventData::UserPromptSubmit(typed(kind, &raw)?),
        };

        let event = Self { data, raw };
        if event.envelope().hook_event_name != kind.as_str() {
            warn!(
                "Event selector is {} but payload says hook_event_name={}",
                kind,
                event.envelope().hook_event_name
            );
        }
        Ok(event)
    }

    pub fn kind(&self) -> EventKind {
        match &self.data {
            EventData::PreToolUse(_) => EventKind::PreToolUse,
            EventData::PostToolUse(_) => EventKind::PostToolUse,
            EventData::Notification(_) => EventKind::Notification,
            EventData::Stop(_) => EventKind::Stop,
            EventData::SubagentStop(_) => EventKind::SubagentStop,
            EventData::PreCompact(_) => EventKind::PreCompact,
            EventData::SessionStart(_) => EventKind::SessionStart,
            EventData::SessionEnd(_) => EventKind::SessionEnd,
            EventData::UserPromptSubmit(_) => EventKind::UserPromptSubmit,
        }
    }

    pub fn data(&self) -> &EventData {
        &self.data
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn envelope(&self) -> &Envelope {
        match &self.data {
            EventData::PreToolUse(e) => &e.envelope,
            EventData::PostToolUse(e) => &e.envelope,
            EventData::Notification(e) => &e.envelope,
            EventData::Stop(e) => &e.envelope,
            EventData::SubagentStop(e) => &e.envelope,
            EventData::PreCompact(e) => &e.envelope,
            EventData::SessionStart(e) => &e.envelope,
            EventData::SessionEnd(e) => &e.envelope,
            EventData::UserPromptSubmit(e) => &e.envelope,
        }
    }

    /// The field rule matchers are tested against, if this event has one.
    pub fn subject(&self) -> Option<&str> {
        match &self.data {
            EventData::PreToolUse(e) => Some(&e.tool_name),
            EventData::PostToolUse(e) => Some(&e.tool_name),
            EventData::Notification(e) => Some(&e.notification_type),
            EventData::SubagentStop(e) => Some(&e.agent_type),
            EventData::PreCompact(e) => Some(&e.trigger),
            EventData::SessionStart(e) => Some(&e.source),
            EventData::Stop(_) | EventData::SessionEnd(_) | EventData::UserPromptSubmit(_) => None,
        }
    }

    pub fn tool_input(&self) -> Option<&Map<String, Value>> {
        match &self.data {
            EventData::PreToolUse(e) => Some(&e.tool_input),
            EventData::PostToolUse(e) => Some(&e.tool_input),
            _ => None,
        }
    }

    /// String field of `tool_input`, e.g. `command` or `file_path`.
    pub fn tool_input_str(&self, field: &str) -> Option<&str> {
        self.tool_input()?.get(field)?.as_str()
    }

    pub fn prompt(&self) -> Option<&str> {
        match &self.data {
            EventData::UserPromptSubmit(e) => Some(&e.prompt),
            _ => None,
        }
    }

    pub fn end_reason(&self) -> Option<&str> {
        match &self.data {
            EventData::SessionEnd(e) => Some(&e.reason),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(name: &str) -> Value {
        json!({
            "session_id": "s-1",
            "transcript_path": "/tmp/t.jsonl",
            "hook_event_name": name,
            "cwd": "/work"
        })
    }

    fn with(mut base: Value, extra: Value) -> Value {
        if let (Some(b), Some(e)) = (base.as_object_mut(), extra.as_object()) {
            for (k, v) in e {
                b.insert(k.clone(), v.clone());
            }
        }
        base
    }

    #[test]
    fn test_kind_round_trips_through_name() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("BeforeToolCall".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_parse_pre_tool_use() {
        let raw = with(
            envelope("PreToolUse"),
            json!({"tool_name": "Bash", "tool_input": {"command": "ls -la"}}),
        );
        let event = Event::parse(EventKind::PreToolUse, &raw.to_string()).unwrap();

        assert_eq!(event.kind(), EventKind::PreToolUse);
        assert_eq!(event.subject(), Some("Bash"));
        assert_eq!(event.tool_input_str("command"), Some("ls -la"));
        assert_eq!(event.envelope().session_id, "s-1");
        assert_eq!(event.envelope().cwd.as_deref(), Some("/work"));
    }

    #[test]
    fn test_missing_envelope_field_is_error() {
        let raw = json!({"session_id": "s", "tool_name": "Bash"});
        let err = Event::from_value(EventKind::PreToolUse, raw).unwrap_err();
        assert!(matches!(err, EventError::InvalidShape { kind: "PreToolUse", .. }));
    }

    #[test]
    fn test_invalid_json_is_error() {
        let err = Event::parse(EventKind::Stop, "{not json").unwrap_err();
        assert!(matches!(err, EventError::InvalidJson(_)));
    }

    #[test]
    fn test_subjects_per_event() {
        let compact = Event::from_value(
            EventKind::PreCompact,
            with(envelope("PreCompact"), json!({"trigger": "auto"})),
        )
        .unwrap();
        assert_eq!(compact.subject(), Some("auto"));

        let stop = Event::from_value(EventKind::Stop, envelope("Stop")).unwrap();
        assert_eq!(stop.subject(), None);

        let sub = Event::from_value(
            EventKind::SubagentStop,
            with(envelope("SubagentStop"), json!({"agent_type": "reviewer"})),
        )
        .unwrap();
        assert_eq!(sub.subject(), Some("reviewer"));
    }

    #[test]
    fn test_capabilities() {
        assert!(EventKind::PreToolUse.early_terminates());
        assert!(!EventKind::PostToolUse.early_terminates());
        assert!(EventKind::PostToolUse.can_block());
        assert!(!EventKind::SessionStart.can_block());
        assert!(EventKind::PreCompact.pins_continue());
        assert!(!EventKind::SessionEnd.carries_decision());
        assert!(EventKind::Stop.supports_legacy());
        assert!(!EventKind::UserPromptSubmit.supports_legacy());
    }
}
