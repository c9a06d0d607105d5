//! Condition predicates
//!
//! Each predicate takes the condition's configured value and the evaluation
//! context and answers true/false, or fails when the value itself is bad.
//! The only side effects are filesystem reads.

use std::fs;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use rand::RngExt;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::error::ConditionError;
use super::event::Event;

/// Signature shared by every predicate
pub type Predicate = fn(&str, &PredicateContext<'_>) -> Result<bool, ConditionError>;

/// What a predicate may look at
pub struct PredicateContext<'a> {
    pub event: &'a Event,
    /// Directory relative paths resolve against: the event's `cwd`, else the process cwd
    pub base_dir: PathBuf,
}

impl<'a> PredicateContext<'a> {
    pub fn new(event: &'a Event) -> Result<Self, ConditionError> {
        let base_dir = match event.envelope().cwd.as_deref().filter(|c| !c.is_empty()) {
            Some(cwd) => PathBuf::from(cwd),
            None => std::env::current_dir().map_err(ConditionError::WorkingDir)?,
        };
        Ok(Self { event, base_dir })
    }
}

// Filesystem

pub fn file_exists(value: &str, ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    Ok(ctx.base_dir.join(expand(value)).is_file())
}

pub fn file_not_exists(value: &str, ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    file_exists(value, ctx).map(|found| !found)
}

pub fn file_exists_recursive(
    value: &str,
    ctx: &PredicateContext<'_>,
) -> Result<bool, ConditionError> {
    Ok(find_upward(&ctx.base_dir, &expand(value), Path::is_file).is_some())
}

pub fn file_not_exists_recursive(
    value: &str,
    ctx: &PredicateContext<'_>,
) -> Result<bool, ConditionError> {
    file_exists_recursive(value, ctx).map(|found| !found)
}

pub fn dir_exists(value: &str, ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    Ok(ctx.base_dir.join(expand(value)).is_dir())
}

pub fn dir_not_exists(value: &str, ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    dir_exists(value, ctx).map(|found| !found)
}

pub fn dir_exists_recursive(
    value: &str,
    ctx: &PredicateContext<'_>,
) -> Result<bool, ConditionError> {
    Ok(find_upward(&ctx.base_dir, &expand(value), Path::is_dir).is_some())
}

pub fn dir_not_exists_recursive(
    value: &str,
    ctx: &PredicateContext<'_>,
) -> Result<bool, ConditionError> {
    dir_exists_recursive(value, ctx).map(|found| !found)
}

/// Walk from `start` through its parents until `name` satisfies `test` or the root is passed.
pub fn find_upward(start: &Path, name: &str, test: fn(&Path) -> bool) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(name))
        .find(|candidate| test(candidate))
}

// Working directory and session

pub fn cwd_is(value: &str, ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    Ok(ctx.base_dir == Path::new(&expand(value)))
}

pub fn cwd_is_not(value: &str, ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    cwd_is(value, ctx).map(|hit| !hit)
}

pub fn cwd_contains(value: &str, ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    Ok(ctx.base_dir.to_string_lossy().contains(value))
}

pub fn cwd_not_contains(value: &str, ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    cwd_contains(value, ctx).map(|hit| !hit)
}

pub fn permission_mode_is(value: &str, ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    Ok(ctx.event.envelope().permission_mode.as_deref() == Some(value))
}

/// Percentage chance, drawn fresh on every evaluation.
pub fn random_chance(value: &str, _ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    let percent = parse_int("random_chance", value)?;
    if !(0..=100).contains(&percent) {
        return Err(ConditionError::PercentOutOfRange(percent));
    }
    Ok(match percent {
        0 => false,
        100 => true,
        p => rand::rng().random_range(0..100) < p,
    })
}

// Tool input

pub fn file_extension(value: &str, ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    Ok(ctx
        .event
        .tool_input_str("file_path")
        .is_some_and(|path| path.ends_with(value)))
}

pub fn command_contains(value: &str, ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    Ok(ctx
        .event
        .tool_input_str("command")
        .is_some_and(|cmd| cmd.contains(value)))
}

pub fn command_starts_with(
    value: &str,
    ctx: &PredicateContext<'_>,
) -> Result<bool, ConditionError> {
    Ok(ctx
        .event
        .tool_input_str("command")
        .is_some_and(|cmd| cmd.starts_with(value)))
}

pub fn url_starts_with(value: &str, ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    Ok(ctx
        .event
        .tool_input_str("url")
        .is_some_and(|url| url.starts_with(value)))
}

// Prompt

pub fn prompt_regex(value: &str, ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    let re = Regex::new(value).map_err(|source| ConditionError::InvalidRegex {
        pattern: value.to_string(),
        source,
    })?;
    Ok(ctx.event.prompt().is_some_and(|p| re.is_match(p)))
}

/// Match on every N-th prompt, counted from the session transcript.
pub fn every_n_prompts(value: &str, ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    let n = parse_int("every_n_prompts", value)?;
    if n <= 0 {
        return Err(ConditionError::NonPositiveInterval(n));
    }
    let path = expand(&ctx.event.envelope().transcript_path);
    let count = count_user_prompts(Path::new(&path))?;
    debug!("Transcript {} has {} user prompts", path, count);
    Ok(count as i64 % n == 0)
}

/// Count transcript records that are user prompts (tool results excluded).
///
/// A transcript that does not exist yet counts as empty.
pub fn count_user_prompts(path: &Path) -> Result<usize, ConditionError> {
    let display = path.display().to_string();
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(source) => {
            return Err(ConditionError::TranscriptRead {
                path: display,
                source,
            });
        }
    };

    let mut count = 0;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| ConditionError::TranscriptRead {
            path: display.clone(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Value =
            serde_json::from_str(&line).map_err(|source| ConditionError::TranscriptParse {
                path: display.clone(),
                line: index + 1,
                source,
            })?;
        let is_user = record.get("type").and_then(Value::as_str) == Some("user");
        let is_prompt = record
            .pointer("/message/content")
            .is_some_and(Value::is_string);
        if is_user && is_prompt {
            count += 1;
        }
    }
    Ok(count)
}

// Session end

pub fn reason_is(value: &str, ctx: &PredicateContext<'_>) -> Result<bool, ConditionError> {
    Ok(ctx.event.end_reason() == Some(value))
}

fn parse_int(condition: &str, value: &str) -> Result<i64, ConditionError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConditionError::InvalidInteger {
            condition: condition.to_string(),
            value: value.to_string(),
        })
}

fn expand(value: &str) -> String {
    shellexpand::tilde(value).to_string()
}
