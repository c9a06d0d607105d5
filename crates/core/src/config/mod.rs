//! Rule file: YAML mapping from event type to an ordered list of rules
//!
//! ```yaml
//! PreToolUse:
//!   - matcher: "Write|Edit"
//!     conditions:
//!       - type: file_extension
//!         value: ".rs"
//!     actions:
//!       - type: command
//!         command: "rustfmt {.tool_input.file_path}"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::env::HOOKGATE_CONFIG_DIR;
use crate::hooks::{Decision, EventKind, PermissionDecision, known_types, lookup};

const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Could not determine a config directory; pass --config")]
    NoConfigDir,
}

/// One `{type, value}` condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,

    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Run a shell command
    Command,
    /// Emit a message
    #[default]
    Output,
    #[serde(other)]
    Unsupported,
}

/// One step of a matched rule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,

    /// Shell command, template-substituted (`command` actions)
    #[serde(default)]
    pub command: Option<String>,

    /// Message text, template-substituted (`output` actions)
    #[serde(default)]
    pub message: Option<String>,

    /// Pipe the event JSON to the command's stdin
    #[serde(default)]
    pub use_stdin: bool,

    /// Exit status for `output` actions in exit-code mode (non-zero blocks)
    #[serde(default)]
    pub exit_status: Option<i32>,

    /// "block" or "allow"; empty is the same as absent
    #[serde(default)]
    pub decision: Option<String>,

    /// PreToolUse only: "allow", "deny" or "ask"; empty is the same as absent
    #[serde(default)]
    pub permission_decision: Option<String>,

    /// Reason for the decision; when absent the message is used
    #[serde(default)]
    pub reason: Option<String>,

    #[serde(default, rename = "continue")]
    pub continue_: Option<bool>,

    #[serde(default)]
    pub stop_reason: Option<String>,

    #[serde(default)]
    pub suppress_output: Option<bool>,

    #[serde(default)]
    pub additional_context: Option<String>,

    #[serde(default)]
    pub system_message: Option<String>,
}

impl Action {
    pub fn decision(&self) -> Result<Option<Decision>, String> {
        self.decision.as_deref().map_or(Ok(None), Decision::parse)
    }

    pub fn permission_decision(&self) -> Result<Option<PermissionDecision>, String> {
        self.permission_decision
            .as_deref()
            .map_or(Ok(None), PermissionDecision::parse)
    }
}

/// Matcher + conditions + actions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Pipe-separated substrings tested against the event subject
    #[serde(default)]
    pub matcher: Option<String>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub actions: Vec<Action>,
}

/// Rules per event type, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: HashMap<EventKind, Vec<Rule>>,
}

impl RuleSet {
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file deserializes as null
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn rules_for(&self, kind: EventKind) -> &[Rule] {
        self.rules.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn insert(&mut self, kind: EventKind, rules: Vec<Rule>) {
        self.rules.insert(kind, rules);
    }

    pub fn rule_count(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Static problems in the rule set, one human-readable line each.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for kind in EventKind::ALL {
            for (r, rule) in self.rules_for(kind).iter().enumerate() {
                let at = format!("{}[{}]", kind, r);
                validate_rule(kind, &at, rule, &mut problems);
            }
        }
        problems
    }
}

fn validate_rule(kind: EventKind, at: &str, rule: &Rule, problems: &mut Vec<String>) {
    for (c, cond) in rule.conditions.iter().enumerate() {
        if lookup(kind, &cond.condition_type).is_none() {
            problems.push(format!(
                "{}.conditions[{}]: condition type '{}' is not supported for {} (known: {})",
                at,
                c,
                cond.condition_type,
                kind,
                known_types(kind).join(", ")
            ));
        }
    }

    if rule.actions.is_empty() {
        problems.push(format!("{}: rule has no actions", at));
    }

    for (a, action) in rule.actions.iter().enumerate() {
        let at = format!("{}.actions[{}]", at, a);
        match action.action_type {
            ActionType::Command if action.command.as_deref().is_none_or(str::is_empty) => {
                problems.push(format!("{}: command action needs a 'command'", at));
            }
            ActionType::Output if action.message.is_none() => {
                problems.push(format!("{}: output action needs a 'message'", at));
            }
            ActionType::Unsupported => {
                problems.push(format!(
                    "{}: unsupported action type (expected 'command' or 'output')",
                    at
                ));
            }
            _ => {}
        }

        match action.decision() {
            Err(e) => problems.push(format!("{}: {}", at, e)),
            Ok(Some(_)) if !kind.carries_decision() => {
                problems.push(format!("{}: {} does not support 'decision'", at, kind));
            }
            _ => {}
        }
        match action.permission_decision() {
            Err(e) => problems.push(format!("{}: {}", at, e)),
            Ok(Some(_)) if kind != EventKind::PreToolUse => {
                problems.push(format!(
                    "{}: 'permission_decision' is only supported for PreToolUse",
                    at
                ));
            }
            _ => {}
        }
        if action.reason.is_some() && kind != EventKind::PreToolUse && !kind.carries_decision() {
            problems.push(format!("{}: {} does not support 'reason'", at, kind));
        }
        if action.continue_ == Some(false) && kind.pins_continue() {
            problems.push(format!("{}: {} cannot be stopped with continue: false", at, kind));
        }
    }
}

/// Loaded rule file
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Where the rules came from
    pub path: PathBuf,
    pub rules: RuleSet,
}

impl Config {
    /// Load from `path_override`, or the default location.
    ///
    /// A missing file means no rules. A file that exists but cannot be read
    /// or parsed is an error.
    pub fn load(path_override: Option<&str>) -> Result<Self, ConfigError> {
        let path = Self::resolve_path(path_override)?;
        if !path.exists() {
            warn!("No config at {}; no rules will apply", path.display());
            return Ok(Self {
                path,
                rules: RuleSet::default(),
            });
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let rules = RuleSet::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded {} rules from {}", rules.rule_count(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            rules,
        })
    }

    /// Resolution order: explicit path, `HOOKGATE_CONFIG_DIR`, then the
    /// platform config dir (e.g. `~/.config/hookgate/config.yaml`).
    pub fn resolve_path(path_override: Option<&str>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = path_override.filter(|p| !p.is_empty()) {
            return Ok(PathBuf::from(shellexpand::tilde(path).to_string()));
        }
        if let Ok(dir) = std::env::var(HOOKGATE_CONFIG_DIR)
            && !dir.is_empty()
        {
            return Ok(PathBuf::from(shellexpand::tilde(&dir).to_string()).join(CONFIG_FILE_NAME));
        }
        ProjectDirs::from("", "", "hookgate")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }
}
