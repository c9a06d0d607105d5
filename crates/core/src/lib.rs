//! Rule evaluation for coding-agent lifecycle hooks
//!
//! This crate holds everything between "one JSON event on stdin" and "one
//! response for the host": event parsing, the YAML rule set, condition
//! predicates, action execution and the per-event outcome fold. The CLI crate
//! only wires stdin, stdout and the exit code around [`hooks::Dispatcher`].

pub mod config;
pub mod env;
pub mod hooks;

pub use config::{Action, ActionType, Condition, Config, Rule, RuleSet};
pub use hooks::{Dispatcher, Event, EventKind, Outcome, Response};
