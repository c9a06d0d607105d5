//! Rule engine for coding-agent lifecycle hooks
//!
//! The host invokes `hookgate` once per event with the event JSON on stdin.
//! Rules are declared per event type in YAML:
//!
//! ```yaml
//! PreToolUse:
//!   - matcher: "Bash"
//!     conditions:
//!       - type: command_contains
//!         value: "rm -rf"
//!     actions:
//!       - type: output
//!         message: "Dangerous command blocked: {.tool_input.command}"
//!         permission_decision: deny
//! ```
//!
//! A rule is selected when its matcher accepts the event subject (tool name,
//! notification type, ...) and every condition holds. Actions of selected
//! rules run in order and their results are folded into one [`Outcome`],
//! serialized as the JSON document the host expects. PreToolUse,
//! PostToolUse, Stop and SubagentStop can instead use the plain exit-code
//! protocol: exit 0 to allow, non-zero with a message on stderr to block.

mod action;
mod condition;
mod dispatcher;
mod error;
mod event;
mod matcher;
mod outcome;
mod predicates;
mod runner;
mod schema;
mod template;

pub use action::{ActionRunner, BLOCKING_EXIT_CODE};
pub use condition::{ConditionOutcome, evaluate_conditions, known_types, lookup};
pub use dispatcher::{Dispatcher, Response};
pub use error::{ActionError, ConditionError, EventError, RunnerError, TemplateError};
pub use event::{Envelope, Event, EventData, EventKind};
pub use matcher::matches;
pub use outcome::{ActionOutput, Decision, Flow, Outcome, OutcomeFolder, PermissionDecision, fold};
pub use predicates::{Predicate, PredicateContext, count_user_prompts};
pub use runner::{CommandOutput, CommandRunner, ShellRunner};
pub use schema::{REASON_REQUIRED, parse_command_output};
pub use template::{Query, QueryCache, TemplateEngine};
