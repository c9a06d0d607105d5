//! Executing one action of a matched rule

use std::sync::Arc;

use tracing::{debug, warn};

use super::error::ActionError;
use super::event::{Event, EventKind};
use super::outcome::{ActionOutput, Decision};
use super::runner::CommandRunner;
use super::schema::{REASON_REQUIRED, is_blank, parse_command_output};
use super::template::TemplateEngine;
use crate::config::{Action, ActionType};

/// Exit status for a failed command in exit-code mode
pub const BLOCKING_EXIT_CODE: i32 = 2;

/// Runs actions against one event, rendering templates and spawning commands
#[derive(Clone)]
pub struct ActionRunner {
    runner: Arc<dyn CommandRunner>,
    templates: TemplateEngine,
}

impl ActionRunner {
    pub fn new(runner: Arc<dyn CommandRunner>, templates: TemplateEngine) -> Self {
        Self { runner, templates }
    }

    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.runner)
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    /// Run an action for an event with a JSON response.
    ///
    /// Never fails: execution and validation problems come back as the
    /// event's safe-default output.
    pub async fn run(&self, action: &Action, event: &Event) -> ActionOutput {
        let kind = event.kind();
        match action.action_type {
            ActionType::Command => self.run_command(action, event).await,
            ActionType::Output => self.output(action, event),
            ActionType::Unsupported => failure(kind, "unsupported action type".to_string()),
        }
    }

    /// Run an action for an event using the plain exit-code protocol.
    ///
    /// Returns text for stdout on success, or the blocking failure that ends
    /// the invocation.
    pub async fn run_exit_code(
        &self,
        action: &Action,
        event: &Event,
    ) -> Result<Option<String>, ActionError> {
        match action.action_type {
            ActionType::Command => {
                let command = self.render(action.command.as_deref(), event).unwrap_or_default();
                if command.trim().is_empty() {
                    warn!("Skipping command action without a command");
                    return Ok(None);
                }
                let stdin = action.use_stdin.then(|| event.raw().to_string());
                let output = self.runner.run(&command, stdin).await.map_err(|e| {
                    ActionError::Blocking {
                        exit_code: BLOCKING_EXIT_CODE,
                        message: format!("Command '{}' failed: {}", command, e),
                    }
                })?;
                if !output.success() {
                    let detail = [output.stderr.trim(), output.stdout.trim()]
                        .into_iter()
                        .find(|s| !s.is_empty())
                        .map(str::to_string)
                        .unwrap_or_else(|| {
                            format!("Command '{}' exited with code {}", command, output.exit_code)
                        });
                    return Err(ActionError::Blocking {
                        exit_code: BLOCKING_EXIT_CODE,
                        message: detail,
                    });
                }
                Ok(Some(output.stdout).filter(|s| !s.trim().is_empty()))
            }
            ActionType::Output => {
                let message = self.render(action.message.as_deref(), event).unwrap_or_default();
                match action.exit_status {
                    Some(code) if code != 0 => Err(ActionError::Blocking {
                        exit_code: code,
                        message,
                    }),
                    _ => Ok(Some(message).filter(|m| !m.is_empty())),
                }
            }
            ActionType::Unsupported => {
                warn!("Skipping unsupported action type");
                Ok(None)
            }
        }
    }

    async fn run_command(&self, action: &Action, event: &Event) -> ActionOutput {
        let kind = event.kind();
        let command = self.render(action.command.as_deref(), event).unwrap_or_default();
        if command.trim().is_empty() {
            return failure(kind, "command action has no command".to_string());
        }

        let stdin = action.use_stdin.then(|| event.raw().to_string());
        let output = match self.runner.run(&command, stdin).await {
            Ok(output) => output,
            Err(e) => return failure(kind, format!("Command '{}' failed: {}", command, e)),
        };

        if !output.success() {
            let stderr = output.stderr.trim();
            let detail = if stderr.is_empty() {
                String::new()
            } else {
                format!(": {}", stderr)
            };
            return failure(
                kind,
                format!(
                    "Command '{}' exited with code {}{}",
                    command, output.exit_code, detail
                ),
            );
        }

        // Silent success carries no information
        if output.stdout.trim().is_empty() {
            debug!("Command '{}' produced no output", command);
            return ActionOutput::default();
        }

        parse_command_output(kind, &output.stdout).unwrap_or_else(|e| {
            failure(kind, format!("Invalid output from command '{}': {}", command, e))
        })
    }

    fn output(&self, action: &Action, event: &Event) -> ActionOutput {
        let kind = event.kind();
        let message = self
            .render(action.message.as_deref(), event)
            .filter(|m| !m.is_empty());
        let additional = self.render(action.additional_context.as_deref(), event);
        let reason = self
            .render(action.reason.as_deref(), event)
            .filter(|r| !r.is_empty());

        let decision = match action.decision() {
            Ok(decision) => decision,
            Err(e) => return failure(kind, e),
        };
        let permission = match action.permission_decision() {
            Ok(permission) => permission,
            Err(e) => return failure(kind, e),
        };

        let mut out = ActionOutput {
            continue_: action.continue_,
            stop_reason: action.stop_reason.clone(),
            suppress_output: action.suppress_output,
            system_message: self.render(action.system_message.as_deref(), event),
            ..ActionOutput::default()
        };

        if decision.is_some() && !kind.carries_decision() {
            warn!("{} does not support 'decision'; ignoring", kind);
        }
        if permission.is_some() && kind != EventKind::PreToolUse {
            warn!("{} does not support 'permission_decision'; ignoring", kind);
        }
        if reason.is_some() && kind != EventKind::PreToolUse && !kind.carries_decision() {
            warn!("{} does not support 'reason'; ignoring", kind);
        }

        match kind {
            EventKind::PreToolUse => {
                out.permission_decision = permission;
                let (reason, message) = if permission.is_some() {
                    reason_from(reason, message)
                } else {
                    (reason, message)
                };
                out.reason = reason;
                out.system_message = join(message, out.system_message);
            }
            EventKind::PostToolUse | EventKind::UserPromptSubmit => {
                out.decision = decision;
                let (reason, message) = if decision == Some(Decision::Block) {
                    reason_from(reason, message)
                } else {
                    (reason, message)
                };
                if decision == Some(Decision::Block) && is_blank(reason.as_deref()) {
                    return failure(kind, REASON_REQUIRED.to_string());
                }
                out.reason = reason;
                out.additional_context = join(message, additional);
            }
            EventKind::Stop | EventKind::SubagentStop => {
                out.decision = decision;
                let (reason, message) = if decision == Some(Decision::Block) {
                    reason_from(reason, message)
                } else {
                    (reason, message)
                };
                if decision == Some(Decision::Block) && is_blank(reason.as_deref()) {
                    return failure(kind, REASON_REQUIRED.to_string());
                }
                out.reason = reason;
                out.system_message = join(message, out.system_message);
            }
            EventKind::SessionStart => {
                out.additional_context = join(message, additional);
            }
            EventKind::Notification | EventKind::PreCompact | EventKind::SessionEnd => {
                out.system_message = join(message, out.system_message);
            }
        }
        out
    }

    fn render(&self, template: Option<&str>, event: &Event) -> Option<String> {
        template.map(|t| self.templates.render(t, event.raw()))
    }
}

fn failure(kind: EventKind, diagnostic: String) -> ActionOutput {
    warn!("{} action failed: {}", kind, diagnostic);
    ActionOutput::failure(kind, diagnostic)
}

/// A configured reason explains the decision and the message keeps its usual
/// place. Without one the message becomes the reason.
fn reason_from(
    reason: Option<String>,
    message: Option<String>,
) -> (Option<String>, Option<String>) {
    match reason {
        Some(reason) => (Some(reason), message),
        None => (message, None),
    }
}

fn join(first: Option<String>, second: Option<String>) -> Option<String> {
    let parts: Vec<String> = [first, second]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n"))
}
