//! Error types for event parsing, predicates, templates and actions

use thiserror::Error;

/// Failure to turn stdin into an [`Event`](super::Event). Fatal for the invocation.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Unknown event type: {0}")]
    UnknownKind(String),

    #[error("Event input is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Invalid {kind} event: {source}")]
    InvalidShape {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// A predicate could not be evaluated. Aborts evaluation of the rule that owns it.
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("Invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid integer '{value}' for {condition}")]
    InvalidInteger { condition: String, value: String },

    #[error("random_chance must be between 0 and 100, got {0}")]
    PercentOutOfRange(i64),

    #[error("every_n_prompts must be positive, got {0}")]
    NonPositiveInterval(i64),

    #[error("Failed to read transcript {path}: {source}")]
    TranscriptRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed transcript {path} at line {line}: {source}")]
    TranscriptParse {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot determine working directory: {0}")]
    WorkingDir(#[source] std::io::Error),
}

/// A `{...}` placeholder could not be compiled or evaluated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("parse error at offset {offset} in '{query}': {message}")]
    Parse {
        query: String,
        offset: usize,
        message: String,
    },

    #[error("cannot index {target} with {index}")]
    Index { target: String, index: String },

    #[error("unterminated placeholder starting at offset {0}")]
    Unterminated(usize),
}

/// Subprocess could not be spawned or waited on.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to spawn command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to write to command stdin: {0}")]
    Stdin(#[source] std::io::Error),

    #[error("Command wait failed: {0}")]
    Wait(#[source] std::io::Error),
}

/// Hard failure of an action in exit-code mode.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("{message}")]
    Blocking { exit_code: i32, message: String },
}

impl ActionError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ActionError::Blocking { exit_code, .. } => *exit_code,
        }
    }
}
