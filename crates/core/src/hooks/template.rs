//! `{...}` placeholder substitution against the event JSON
//!
//! Placeholders hold a small jq-style path query:
//!
//! - `{.}` the whole event
//! - `{.tool_input.file_path}` nested fields
//! - `{.edits[0].old_string}` array index (negative counts from the end)
//! - `{.["odd key"]}` quoted keys
//! - `{.tool_input.path?}` optional access, never errors
//! - `{.tool_input.path // .tool_input.file_path}` first non-null alternative
//!
//! `{` not followed by `.` is left alone, and `{{` renders as `{`. A query
//! that fails renders inline as `[template error: ...]` so the surrounding
//! text still comes through.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::debug;

use super::error::TemplateError;

#[derive(Debug, Clone, PartialEq)]
enum Key {
    Field(String),
    Index(i64),
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    key: Key,
    optional: bool,
}

/// A compiled query: alternatives separated by `//`, each a path of steps
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    alternatives: Vec<Vec<Step>>,
}

impl Query {
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        Parser::new(source).parse()
    }

    pub fn evaluate(&self, input: &Value) -> Result<Value, TemplateError> {
        let mut last_err = None;
        for (i, path) in self.alternatives.iter().enumerate() {
            let is_last = i + 1 == self.alternatives.len();
            match walk(path, input) {
                Ok(v) if is_last || !matches!(v, Value::Null | Value::Bool(false)) => return Ok(v),
                Ok(_) => {}
                Err(e) if is_last => return Err(e),
                Err(e) => last_err = Some(e),
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(Value::Null),
        }
    }
}

fn walk(path: &[Step], input: &Value) -> Result<Value, TemplateError> {
    let mut current = input;
    for step in path {
        let next = match (&step.key, current) {
            (_, Value::Null) => None,
            (Key::Field(name), Value::Object(map)) => map.get(name),
            (Key::Index(i), Value::Array(items)) => {
                let idx = if *i < 0 { items.len() as i64 + i } else { *i };
                usize::try_from(idx).ok().and_then(|idx| items.get(idx))
            }
            (key, other) if !step.optional => {
                return Err(TemplateError::Index {
                    target: type_name(other).to_string(),
                    index: match key {
                        Key::Field(name) => format!("\"{}\"", name),
                        Key::Index(i) => i.to_string(),
                    },
                });
            }
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return Ok(Value::Null),
        }
    }
    Ok(current.clone())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

struct Parser<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<Query, TemplateError> {
        let mut alternatives = vec![self.path()?];
        loop {
            self.skip_ws();
            if self.peek().is_none() {
                break;
            }
            if self.peek() == Some('/') && self.peek_at(1) == Some('/') {
                self.pos += 2;
                alternatives.push(self.path()?);
            } else {
                return Err(self.error("unexpected character"));
            }
        }
        Ok(Query { alternatives })
    }

    fn path(&mut self) -> Result<Vec<Step>, TemplateError> {
        self.skip_ws();
        if self.peek() != Some('.') {
            return Err(self.error("query must start with '.'"));
        }
        self.pos += 1;

        let mut steps = Vec::new();
        match self.peek() {
            Some(c) if is_ident_start(c) => steps.push(self.field_step()?),
            Some('[') => steps.push(self.bracket_step()?),
            _ => {}
        }
        loop {
            match self.peek() {
                Some('.') if self.peek_at(1).is_some_and(is_ident_start) => {
                    self.pos += 1;
                    steps.push(self.field_step()?);
                }
                Some('.') if self.peek_at(1) == Some('[') => {
                    self.pos += 1;
                    steps.push(self.bracket_step()?);
                }
                Some('[') => steps.push(self.bracket_step()?),
                _ => break,
            }
        }
        Ok(steps)
    }

    fn field_step(&mut self) -> Result<Step, TemplateError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().map(|(_, c)| c).collect();
        Ok(Step {
            key: Key::Field(name),
            optional: self.optional_marker(),
        })
    }

    fn bracket_step(&mut self) -> Result<Step, TemplateError> {
        self.pos += 1; // '['
        self.skip_ws();
        let key = match self.peek() {
            Some('"') => Key::Field(self.string_literal()?),
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let start = self.pos;
                self.pos += 1;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
                let digits: String = self.chars[start..self.pos].iter().map(|(_, c)| c).collect();
                Key::Index(
                    digits
                        .parse()
                        .map_err(|_| self.error("invalid array index"))?,
                )
            }
            _ => return Err(self.error("expected index or quoted key")),
        };
        self.skip_ws();
        if self.peek() != Some(']') {
            return Err(self.error("expected ']'"));
        }
        self.pos += 1;
        Ok(Step {
            key,
            optional: self.optional_marker(),
        })
    }

    fn string_literal(&mut self) -> Result<String, TemplateError> {
        self.pos += 1; // opening quote
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated string")),
                Some('"') => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        Some(c) => out.push(c),
                        None => return Err(self.error("unterminated string")),
                    }
                    self.pos += 1;
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn optional_marker(&mut self) -> bool {
        if self.peek() == Some('?') {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|(_, c)| *c)
    }

    fn error(&self, message: &str) -> TemplateError {
        TemplateError::Parse {
            query: self.source.to_string(),
            offset: self
                .chars
                .get(self.pos)
                .map(|(i, _)| *i)
                .unwrap_or(self.source.len()),
            message: message.to_string(),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

/// Compiled queries keyed by their source text.
///
/// Shared by every action of an invocation; safe to share across threads
/// when the engine is embedded in a long-lived process.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: RwLock<HashMap<String, Arc<Query>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compile(&self, source: &str) -> Result<Arc<Query>, TemplateError> {
        if let Ok(guard) = self.entries.read()
            && let Some(query) = guard.get(source)
        {
            return Ok(Arc::clone(query));
        }

        let query = Arc::new(Query::compile(source)?);
        if let Ok(mut guard) = self.entries.write() {
            guard
                .entry(source.to_string())
                .or_insert_with(|| Arc::clone(&query));
        }
        debug!("Compiled template query '{}'", source);
        Ok(query)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Renders command strings and messages against an event payload
#[derive(Debug, Clone, Default)]
pub struct TemplateEngine {
    cache: Arc<QueryCache>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(cache: Arc<QueryCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Evaluate one query and format the result for splicing into text.
    pub fn evaluate(&self, query: &str, payload: &Value) -> Result<String, TemplateError> {
        let compiled = self.cache.get_or_compile(query.trim())?;
        Ok(match compiled.evaluate(payload)? {
            Value::Null => String::new(),
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    /// Replace every `{.query}` placeholder in `template`.
    pub fn render(&self, template: &str, payload: &Value) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        let mut offset = 0;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            if after.starts_with('{') {
                out.push('{');
                rest = &after[1..];
                offset += open + 2;
                continue;
            }
            if !after.trim_start().starts_with('.') {
                out.push('{');
                rest = after;
                offset += open + 1;
                continue;
            }

            match find_close(after) {
                Some(close) => {
                    let query = &after[..close];
                    match self.evaluate(query, payload) {
                        Ok(text) => out.push_str(&text),
                        Err(e) => out.push_str(&format!("[template error: {}]", e)),
                    }
                    rest = &after[close + 1..];
                    offset += open + close + 2;
                }
                None => {
                    let err = TemplateError::Unterminated(offset + open);
                    out.push_str(&format!("[template error: {}]", err));
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Byte offset of the `}` closing a placeholder, skipping quoted keys.
fn find_close(s: &str) -> Option<usize> {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '}' if !in_string => return Some(i),
            _ => {}
        }
    }
    None
}
