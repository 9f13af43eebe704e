//! Shared data types for the response parser and the execution report.

use std::fmt;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

/// Normalized script type derived from a fence's declared language.
///
/// `sh`, `shell` and `bash` collapse to [`ScriptType::Bash`]; `py`, `python`
/// and `python3` collapse to [`ScriptType::Python`]. Everything else is kept
/// lower-cased in [`ScriptType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScriptType {
    Bash,
    Python,
    Other(String),
}

impl ScriptType {
    pub fn from_language(token: &str) -> Self {
        let lowered = token.trim().to_lowercase();
        match lowered.as_str() {
            "sh" | "shell" | "bash" => Self::Bash,
            "py" | "python" | "python3" => Self::Python,
            _ => Self::Other(lowered),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Bash => "bash",
            Self::Python => "python",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ScriptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ScriptType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ScriptType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from_language(&raw))
    }
}

/// A fenced block pulled out of a model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCandidate {
    /// 1-based position among all fenced blocks with a language token.
    pub ordinal: usize,
    /// Raw language token exactly as written after the opening fence.
    pub declared_language: String,
    /// Body between the fences, untouched.
    pub raw_content: String,
    pub script_type: ScriptType,
}

impl ScriptCandidate {
    pub fn new(ordinal: usize, declared_language: &str, raw_content: &str) -> Self {
        Self {
            ordinal,
            declared_language: declared_language.to_string(),
            raw_content: raw_content.to_string(),
            script_type: ScriptType::from_language(declared_language),
        }
    }
}

/// Classification of a candidate. Exactly one per candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScriptDecision {
    RejectedNonExecutable,
    RejectedRunner,
    Cleanup,
    Normal,
}

impl ScriptDecision {
    pub fn is_rejected(self) -> bool {
        matches!(self, Self::RejectedNonExecutable | Self::RejectedRunner)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RejectedNonExecutable => "rejected-non-executable",
            Self::RejectedRunner => "rejected-runner",
            Self::Cleanup => "cleanup",
            Self::Normal => "normal",
        }
    }
}

/// Script body and type as stored in a [`ScriptSet`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptEntry {
    pub content: String,
    #[serde(rename = "type")]
    pub script_type: ScriptType,
}

/// Ordered, named scripts ready for execution.
///
/// Iteration order is execution order. Serializes as a JSON object whose key
/// order matches that order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptSet {
    entries: Vec<(String, ScriptEntry)>,
}

impl ScriptSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScriptEntry)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ScriptEntry> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, entry)| entry)
    }

    /// Append an entry. A name that is already present replaces the old entry in place.
    pub fn push(&mut self, name: String, entry: ScriptEntry) {
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|(existing, _)| *existing == name)
        {
            slot.1 = entry;
        } else {
            self.entries.push((name, entry));
        }
    }
}

impl FromIterator<(String, ScriptEntry)> for ScriptSet {
    fn from_iter<I: IntoIterator<Item = (String, ScriptEntry)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (name, entry) in iter {
            set.push(name, entry);
        }
        set
    }
}

impl Serialize for ScriptSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, entry) in &self.entries {
            map.serialize_entry(name, entry)?;
        }
        map.end()
    }
}
