//! Key/value options handed to every judge invocation.
//!
//! Options arrive from heterogeneous sources (repeated `--option` flags, a
//! comma-delimited string, a map, an options file) and are normalized into a
//! single canonical table: keys are trimmed and lowercased, purely numeric
//! values become integers, and a token without `=` becomes a boolean flag.
//! Malformed tokens are dropped silently so operator-supplied configuration
//! never aborts a run.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// One normalized option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptValue {
    /// A purely numeric value, coerced to an integer.
    Int(i64),
    /// A bare token without `=`, treated as a boolean-true flag.
    Bool(bool),
    /// Everything else, trimmed.
    Str(String),
}

impl OptValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        matches!(self, OptValue::Bool(true))
    }
}

impl fmt::Display for OptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptValue::Int(n) => write!(f, "{n}"),
            OptValue::Bool(b) => write!(f, "{b}"),
            OptValue::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Canonical, merged option table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    table: BTreeMap<String, OptValue>,
}

impl Options {
    /// Build from `key=value` tokens, normalizing each one.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Options::default();
        for pair in pairs {
            options.absorb(pair.as_ref());
        }
        options
    }

    /// Build from a comma-delimited string, like `"a=1,b=42"`.
    pub fn from_list(list: &str) -> Self {
        Self::from_pairs(list.split(','))
    }

    /// Build from a plain string map.
    pub fn from_map(map: &BTreeMap<String, String>) -> Self {
        Self::from_pairs(map.iter().map(|(k, v)| format!("{k}={v}")))
    }

    /// Parse an options file: one `key=value` per non-blank line, with
    /// whitespace trimmed on both sides. Lines starting with `#` are
    /// skipped. The split happens at the first `=` only, so values may
    /// themselves contain `=`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("read options file {}", path.display()))?;
        let lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'));
        Ok(Self::from_pairs(lines))
    }

    /// Overlay `other` on top of `self`; on key collision `other` wins.
    pub fn merge(&self, other: &Options) -> Options {
        let mut table = self.table.clone();
        for (key, value) in &other.table {
            table.insert(key.clone(), value.clone());
        }
        Options { table }
    }

    /// Case-insensitive lookup.
    pub fn value_of(&self, key: &str) -> Option<&OptValue> {
        self.table.get(&key.trim().to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Iterate the canonical table in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptValue)> {
        self.table.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Deterministic, sorted listing for diagnostic logs. Values longer
    /// than 8 characters are partially masked: first and last 4 characters
    /// stay visible, the middle is replaced by asterisks.
    pub fn describe(&self) -> String {
        self.table
            .iter()
            .map(|(key, value)| format!("{key} → \"{}\"", mask(&value.to_string())))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn absorb(&mut self, token: &str) {
        let token = token.trim();
        if token.is_empty() {
            return;
        }
        let (key, value) = match token.split_once('=') {
            Some((key, value)) => {
                let key = key.trim().to_lowercase();
                if key.is_empty() {
                    return;
                }
                (key, coerce(value.trim()))
            }
            None => (token.to_lowercase(), OptValue::Bool(true)),
        };
        self.table.insert(key, value);
    }
}

fn coerce(value: &str) -> OptValue {
    if !value.is_empty() && value.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(n) = value.parse::<i64>() {
            return OptValue::Int(n);
        }
    }
    OptValue::Str(value.to_string())
}

fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return value.to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 8))
}
