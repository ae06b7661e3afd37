//! Call keys
//!
//! A [`CallKey`] identifies "the same logical call". It is built from the
//! full argument list of the call, so two submissions are debounced together
//! exactly when all of their arguments are equal.

use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// A single hashable argument value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Str(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        KeyValue::Str(value)
    }
}

impl From<&String> for KeyValue {
    fn from(value: &String) -> Self {
        KeyValue::Str(value.clone())
    }
}

impl From<&Path> for KeyValue {
    fn from(value: &Path) -> Self {
        KeyValue::Str(value.to_string_lossy().into_owned())
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        KeyValue::Int(value)
    }
}

impl From<u32> for KeyValue {
    fn from(value: u32) -> Self {
        KeyValue::Int(i64::from(value))
    }
}

impl From<bool> for KeyValue {
    fn from(value: bool) -> Self {
        KeyValue::Bool(value)
    }
}

impl From<Vec<u8>> for KeyValue {
    fn from(value: Vec<u8>) -> Self {
        KeyValue::Bytes(value)
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Str(s) => write!(f, "{:?}", s),
            KeyValue::Int(i) => write!(f, "{}", i),
            KeyValue::Bool(b) => write!(f, "{}", b),
            KeyValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Identity of a call: ordered positional values plus named values
///
/// Named values live in a sorted map, so equality and hashing ignore the
/// order in which they were added.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CallKey {
    positional: SmallVec<[KeyValue; 2]>,
    named: BTreeMap<String, KeyValue>,
}

impl CallKey {
    /// Empty key (a call without arguments)
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a key from positional and named values in one go
    pub fn from_parts<P, N, S>(positional: P, named: N) -> Self
    where
        P: IntoIterator,
        P::Item: Into<KeyValue>,
        N: IntoIterator<Item = (S, KeyValue)>,
        S: Into<String>,
    {
        Self {
            positional: positional.into_iter().map(Into::into).collect(),
            named: named.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// Append a positional value
    pub fn arg(mut self, value: impl Into<KeyValue>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set a named value (replaces an earlier value with the same name)
    pub fn named(mut self, name: impl Into<String>, value: impl Into<KeyValue>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn positional(&self) -> &[KeyValue] {
        &self.positional
    }

    pub fn named_values(&self) -> impl Iterator<Item = (&str, &KeyValue)> {
        self.named.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        let mut first = true;
        for value in &self.positional {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}", value)?;
        }
        for (name, value) in &self.named {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}={}", name, value)?;
        }
        write!(f, ")")
    }
}
