//! Event dispatch: check rules in order, run their actions, produce the host response

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::action::ActionRunner;
use super::condition::{ConditionOutcome, evaluate_conditions};
use super::event::Event;
use super::matcher::matches;
use super::outcome::{Flow, Outcome, OutcomeFolder};
use super::runner::{CommandRunner, ShellRunner};
use super::template::TemplateEngine;
use crate::config::{Rule, RuleSet};

/// What the binary writes back to the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl Response {
    fn payload(outcome: &Outcome) -> Self {
        Self {
            stdout: outcome.to_payload().to_string(),
            stderr: String::new(),
            exit_code: 0,
        }
    }
}

/// Evaluates a [`RuleSet`] against incoming events
pub struct Dispatcher {
    rules: RuleSet,
    actions: ActionRunner,
    exit_code_mode: bool,
}

impl Dispatcher {
    /// Dispatcher running commands through `sh -c`, with a fresh query cache.
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            actions: ActionRunner::new(Arc::new(ShellRunner), TemplateEngine::new()),
            exit_code_mode: false,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.actions = ActionRunner::new(runner, self.actions.templates().clone());
        self
    }

    pub fn with_templates(mut self, templates: TemplateEngine) -> Self {
        self.actions = ActionRunner::new(self.actions.runner(), templates);
        self
    }

    /// Use the plain exit-code protocol for event types that support it
    pub fn with_exit_code_mode(mut self, enabled: bool) -> Self {
        self.exit_code_mode = enabled;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Run the rules for `event` in declaration order and build the response.
    pub async fn dispatch(&self, event: &Event) -> Response {
        let kind = event.kind();
        debug!("{} rule(s) configured for {}", self.rules.rules_for(kind).len(), kind);

        if self.exit_code_mode && kind.supports_legacy() {
            self.dispatch_exit_code(event).await
        } else {
            Response::payload(&self.outcome(event).await)
        }
    }

    /// Fold the actions of applicable rules into one outcome.
    ///
    /// Each rule is checked only when its turn comes, so its conditions see
    /// the effects of earlier actions. Nothing after a terminal result is
    /// evaluated.
    pub async fn outcome(&self, event: &Event) -> Outcome {
        let mut folder = OutcomeFolder::new(event.kind());
        'rules: for (index, rule) in self.rules.rules_for(event.kind()).iter().enumerate() {
            if !self.applies(index, rule, event) {
                continue;
            }
            for action in &rule.actions {
                let output = self.actions.run(action, event).await;
                if folder.apply(output) == Flow::Terminate {
                    info!("{} outcome is final; skipping remaining actions", event.kind());
                    break 'rules;
                }
            }
        }
        folder.finish()
    }

    async fn dispatch_exit_code(&self, event: &Event) -> Response {
        let mut stdout = String::new();
        for (index, rule) in self.rules.rules_for(event.kind()).iter().enumerate() {
            if !self.applies(index, rule, event) {
                continue;
            }
            for action in &rule.actions {
                match self.actions.run_exit_code(action, event).await {
                    Ok(Some(text)) => {
                        stdout.push_str(&text);
                        if !text.ends_with('\n') {
                            stdout.push('\n');
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        info!("{} blocked with exit code {}", event.kind(), e.exit_code());
                        return Response {
                            stdout,
                            stderr: e.to_string(),
                            exit_code: e.exit_code(),
                        };
                    }
                }
            }
        }
        Response {
            stdout,
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Whether the rule's matcher and conditions accept the event.
    fn applies(&self, index: usize, rule: &Rule, event: &Event) -> bool {
        // Events without a subject ignore the matcher
        if let Some(subject) = event.subject()
            && !matches(rule.matcher.as_deref(), subject)
        {
            return false;
        }
        match evaluate_conditions(&rule.conditions, event) {
            Ok(ConditionOutcome::Matched) => true,
            Ok(ConditionOutcome::NotMatched) => false,
            Ok(ConditionOutcome::Unhandled {
                kind,
                condition_type,
            }) => {
                warn!(
                    "Skipping {} rule #{}: condition '{}' is not supported for this event",
                    kind,
                    index + 1,
                    condition_type
                );
                false
            }
            Err(e) => {
                warn!("Skipping {} rule #{}: {}", event.kind(), index + 1, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::event::EventKind;
    use crate::hooks::runner::{CommandOutput, MockCommandRunner};
    use serde_json::{Value, json};

    fn event(kind: EventKind, extra: Value) -> Event {
        let mut raw = json!({
            "session_id": "s",
            "transcript_path": "/tmp/missing-transcript.jsonl",
            "hook_event_name": kind.as_str(),
            "cwd": "/"
        });
        if let (Some(r), Some(e)) = (raw.as_object_mut(), extra.as_object()) {
            r.extend(e.clone());
        }
        Event::from_value(kind, raw).unwrap()
    }

    fn bash(command: &str) -> Event {
        event(
            EventKind::PreToolUse,
            json!({"tool_name": "Bash", "tool_input": {"command": command}}),
        )
    }

    fn dispatcher(yaml: &str) -> Dispatcher {
        Dispatcher::new(RuleSet::from_yaml(yaml).unwrap())
            .with_runner(Arc::new(MockCommandRunner::new()))
    }

    fn payload(response: &Response) -> Value {
        assert_eq!(response.exit_code, 0);
        serde_json::from_str(&response.stdout).unwrap()
    }

    #[tokio::test]
    async fn test_dangerous_command_is_denied() {
        let d = dispatcher(
            r#"
PreToolUse:
  - matcher: Bash
    conditions:
      - type: command_contains
        value: "rm -rf"
    actions:
      - type: output
        message: "Dangerous command blocked: {.tool_input.command}"
        permission_decision: deny
"#,
        );

        let p = payload(&d.dispatch(&bash("rm -rf /tmp/x")).await);
        assert_eq!(p["continue"], true);
        assert_eq!(p["hookSpecificOutput"]["permissionDecision"], "deny");
        assert_eq!(
            p["hookSpecificOutput"]["permissionDecisionReason"],
            "Dangerous command blocked: rm -rf /tmp/x"
        );

        let p = payload(&d.dispatch(&bash("ls")).await);
        assert_eq!(p, json!({"continue": true}));
    }

    #[tokio::test]
    async fn test_stop_block_without_reason() {
        let d = dispatcher(
            r#"
Stop:
  - actions:
      - type: output
        decision: block
"#,
        );
        let p = payload(&d.dispatch(&event(EventKind::Stop, json!({}))).await);
        assert_eq!(p["decision"], "block");
        assert_eq!(p["reason"], "reason is required when decision is block");
    }

    #[tokio::test]
    async fn test_session_start_context_concatenates() {
        let d = dispatcher(
            r#"
SessionStart:
  - actions:
      - type: output
        message: First
      - type: output
        message: Second
"#,
        );
        let p = payload(
            &d.dispatch(&event(EventKind::SessionStart, json!({"source": "startup"})))
                .await,
        );
        assert_eq!(p["continue"], true);
        assert_eq!(p["hookSpecificOutput"]["additionalContext"], "First\nSecond");
        assert_eq!(p["hookSpecificOutput"]["hookEventName"], "SessionStart");
    }

    #[tokio::test]
    async fn test_non_gating_events_drop_decisions() {
        let d = dispatcher(
            r#"
PreCompact:
  - actions:
      - type: output
        message: compacting
        decision: block
        continue: false
SessionEnd:
  - conditions:
      - type: reason_is
        value: "logout"
    actions:
      - type: output
        message: bye
        decision: block
"#,
        );

        let p = payload(
            &d.dispatch(&event(EventKind::PreCompact, json!({"trigger": "auto"})))
                .await,
        );
        assert_eq!(p["continue"], true);
        assert!(p.get("decision").is_none());
        assert!(p.get("reason").is_none());
        assert_eq!(p["systemMessage"], "compacting");

        let p = payload(
            &d.dispatch(&event(EventKind::SessionEnd, json!({"reason": "logout"})))
                .await,
        );
        assert!(p.get("decision").is_none());
        assert!(p.get("hookSpecificOutput").is_none());
        assert_eq!(p["systemMessage"], "bye");
    }

    #[tokio::test]
    async fn test_post_tool_use_runs_every_rule() {
        let d = dispatcher(
            r#"
PostToolUse:
  - matcher: Write|Edit
    actions:
      - type: output
        message: "Lint failed"
        decision: block
  - actions:
      - type: output
        message: "Remember to run tests"
"#,
        );
        let ev = event(
            EventKind::PostToolUse,
            json!({"tool_name": "Write", "tool_input": {"file_path": "a.rs"}, "tool_response": {}}),
        );
        let p = payload(&d.dispatch(&ev).await);
        assert_eq!(p["decision"], "block");
        assert_eq!(p["reason"], "Lint failed");
        assert_eq!(
            p["hookSpecificOutput"]["additionalContext"],
            "Remember to run tests"
        );
    }

    #[tokio::test]
    async fn test_deny_skips_later_rules() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run().times(0);
        let d = Dispatcher::new(
            RuleSet::from_yaml(
                r#"
PreToolUse:
  - actions:
      - type: output
        message: no
        permission_decision: deny
  - actions:
      - type: command
        command: "echo '{}'"
      - type: output
        message: yes
        permission_decision: allow
"#,
            )
            .unwrap(),
        )
        .with_runner(Arc::new(mock));

        let p = payload(&d.dispatch(&bash("ls")).await);
        assert_eq!(p["hookSpecificOutput"]["permissionDecision"], "deny");
        assert_eq!(p["hookSpecificOutput"]["permissionDecisionReason"], "no");
    }

    #[tokio::test]
    async fn test_matcher_and_skipped_rules() {
        let d = dispatcher(
            r#"
PreToolUse:
  - matcher: Edit|Write
    actions:
      - type: output
        message: edit
  - conditions:
      - type: prompt_regex
        value: "x"
    actions:
      - type: output
        message: unhandled
  - conditions:
      - type: random_chance
        value: "150"
    actions:
      - type: output
        message: broken
  - conditions:
      - type: command_contains
        value: "nope"
      - type: prompt_regex
        value: "x"
    actions:
      - type: output
        message: short-circuit
"#,
        );
        let ev = bash("ls");
        assert_eq!(payload(&d.dispatch(&ev).await), json!({"continue": true}));
    }

    #[tokio::test]
    async fn test_subjectless_event_ignores_matcher() {
        let d = dispatcher(
            r#"
UserPromptSubmit:
  - matcher: "does-not-apply"
    conditions:
      - type: prompt_regex
        value: "(?i)deploy"
    actions:
      - type: output
        message: "Check the release checklist"
"#,
        );
        let ev = event(EventKind::UserPromptSubmit, json!({"prompt": "Deploy now"}));
        let p = payload(&d.dispatch(&ev).await);
        assert_eq!(
            p["hookSpecificOutput"]["additionalContext"],
            "Check the release checklist"
        );
    }

    #[tokio::test]
    async fn test_exit_code_mode_blocks_on_first_failure() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .withf(|cmd, _| cmd == "fmt")
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    stdout: "formatted".to_string(),
                    stderr: String::new(),
                    exit_code: 0,
                })
            });
        mock.expect_run()
            .withf(|cmd, _| cmd == "lint")
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    stdout: String::new(),
                    stderr: "unused variable".to_string(),
                    exit_code: 1,
                })
            });
        let d = Dispatcher::new(
            RuleSet::from_yaml(
                r#"
PostToolUse:
  - actions:
      - type: command
        command: fmt
      - type: command
        command: lint
      - type: command
        command: never
"#,
            )
            .unwrap(),
        )
        .with_runner(Arc::new(mock))
        .with_exit_code_mode(true);

        let ev = event(
            EventKind::PostToolUse,
            json!({"tool_name": "Write", "tool_input": {}, "tool_response": {}}),
        );
        let response = d.dispatch(&ev).await;
        assert_eq!(response.exit_code, 2);
        assert_eq!(response.stderr, "unused variable");
        assert_eq!(response.stdout, "formatted\n");
    }

    #[tokio::test]
    async fn test_exit_code_mode_only_for_legacy_events() {
        let d = dispatcher(
            r#"
Stop:
  - actions:
      - type: output
        message: "keep going"
        exit_status: 2
SessionStart:
  - actions:
      - type: output
        message: hello
        exit_status: 2
"#,
        )
        .with_exit_code_mode(true);

        let response = d.dispatch(&event(EventKind::Stop, json!({}))).await;
        assert_eq!(response.exit_code, 2);
        assert_eq!(response.stderr, "keep going");

        let p = payload(
            &d.dispatch(&event(EventKind::SessionStart, json!({"source": "resume"})))
                .await,
        );
        assert_eq!(p["hookSpecificOutput"]["additionalContext"], "hello");
    }

    #[tokio::test]
    async fn test_refolding_is_deterministic() {
        let d = dispatcher(
            r#"
UserPromptSubmit:
  - actions:
      - type: output
        message: A
      - type: output
        message: ""
      - type: output
        message: B
"#,
        );
        let ev = event(EventKind::UserPromptSubmit, json!({"prompt": "hi"}));
        let first = d.dispatch(&ev).await;
        let second = d.dispatch(&ev).await;
        assert_eq!(first, second);
        assert_eq!(payload(&first)["hookSpecificOutput"]["additionalContext"], "A\nB");
    }

    #[tokio::test]
    async fn test_later_rule_sees_earlier_command_effects() {
        let dir = tempfile::TempDir::new().unwrap();
        let marker = dir.path().join("marker");
        let yaml = format!(
            r#"
PostToolUse:
  - actions:
      - type: command
        command: "touch '{}'"
  - conditions:
      - type: file_exists
        value: marker
    actions:
      - type: output
        message: "second rule ran"
"#,
            marker.display()
        );
        let d = Dispatcher::new(RuleSet::from_yaml(&yaml).unwrap());
        let ev = event(
            EventKind::PostToolUse,
            json!({
                "tool_name": "Write",
                "tool_input": {},
                "tool_response": {},
                "cwd": dir.path()
            }),
        );

        let p = payload(&d.dispatch(&ev).await);
        assert!(marker.exists());
        assert_eq!(p["hookSpecificOutput"]["additionalContext"], "second rule ran");
    }

    #[tokio::test]
    async fn test_configured_reason_blocks_stop() {
        let d = dispatcher(
            r#"
Stop:
  - actions:
      - type: output
        decision: block
        reason: "tests are failing"
"#,
        );
        let p = payload(&d.dispatch(&event(EventKind::Stop, json!({}))).await);
        assert_eq!(p["decision"], "block");
        assert_eq!(p["reason"], "tests are failing");
    }

    #[tokio::test]
    async fn test_block_skips_later_rules() {
        for (kind, extra) in [
            (EventKind::Stop, json!({})),
            (EventKind::SubagentStop, json!({"agent_type": "reviewer"})),
            (EventKind::UserPromptSubmit, json!({"prompt": "ship it"})),
        ] {
            let yaml = format!(
                r#"
{kind}:
  - actions:
      - type: output
        message: "blocked first"
        decision: block
      - type: output
        message: "same rule, later"
        decision: allow
  - conditions:
      - type: every_n_prompts
        value: "not a number"
    actions:
      - type: output
        message: "never"
  - actions:
      - type: command
        command: "echo '{{}}'"
      - type: output
        message: "later rule"
        system_message: "late"
"#
            );
            let mut mock = MockCommandRunner::new();
            mock.expect_run().times(0);
            let d = Dispatcher::new(RuleSet::from_yaml(&yaml).unwrap())
                .with_runner(Arc::new(mock));

            let p = payload(&d.dispatch(&event(kind, extra)).await);
            assert_eq!(p["decision"], "block", "{}", kind);
            assert_eq!(p["reason"], "blocked first", "{}", kind);
            assert!(p.get("systemMessage").is_none(), "{}", kind);
            assert!(p.get("hookSpecificOutput").is_none(), "{}", kind);
        }
    }
}
