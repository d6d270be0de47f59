use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::agent::RoleKey;
use crate::error::CrewError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn parse(value: &str) -> Result<Self, CrewError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(CrewError::config("task id cannot be empty"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(CrewError::config(format!(
                "task id '{trimmed}' must not contain whitespace"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human label: `respond_to_email` -> `Respond To Email`.
    pub fn title(&self) -> String {
        self.0
            .split(['_', '-'])
            .filter(|part| !part.is_empty())
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TaskId::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// What a task's raw backend output must look like before it counts as completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OutputContract {
    #[default]
    FreeText,
    /// Output must name exactly one of the labels, which becomes the task's
    /// recorded output. A reply naming several labels is malformed.
    OneOf(Vec<String>),
}

impl OutputContract {
    /// Returns the recorded output, or the reason it is malformed.
    pub fn apply(&self, raw: &str) -> Result<String, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err("empty output".to_string());
        }

        match self {
            OutputContract::FreeText => Ok(raw.to_string()),
            OutputContract::OneOf(labels) => {
                // quotes, markdown emphasis and trailing punctuation
                let bare = trimmed
                    .trim_matches(|ch: char| !ch.is_alphanumeric())
                    .to_lowercase();
                if let Some(label) = labels.iter().find(|label| label.to_lowercase() == bare) {
                    return Ok(label.clone());
                }

                let haystack = trimmed.to_lowercase();
                let mut seen = BTreeSet::new();
                let mentioned = labels
                    .iter()
                    .filter(|label| {
                        let needle = label.to_lowercase();
                        find_word(&haystack, &needle).is_some() && seen.insert(needle)
                    })
                    .collect::<Vec<_>>();

                match mentioned.as_slice() {
                    [label] => Ok((*label).clone()),
                    [] => Err(format!(
                        "expected one of [{}], got '{}'",
                        labels.join(", "),
                        truncate(trimmed, 120)
                    )),
                    several => Err(format!(
                        "ambiguous label, output names {}: '{}'",
                        several
                            .iter()
                            .map(|label| label.as_str())
                            .collect::<Vec<_>>()
                            .join(" and "),
                        truncate(trimmed, 120)
                    )),
                }
            }
        }
    }
}

fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let mut from = 0usize;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let end = start + needle.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|ch| !ch.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|ch| !ch.is_alphanumeric());
        if before_ok && after_ok {
            return Some(start);
        }
        from = end;
    }
    None
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out = text.chars().take(max_chars).collect::<String>();
    out.push_str("...");
    out
}

/// Completes a task with fixed text, without a backend call, when one of its
/// context tasks produced a given output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShortCircuit {
    pub when: TaskId,
    pub equals: String,
    pub output: String,
}

impl ShortCircuit {
    pub fn matches(&self, dependency_output: &str) -> bool {
        dependency_output.trim().eq_ignore_ascii_case(self.equals.trim())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    pub id: TaskId,
    pub description: String,
    pub expected_output: String,
    pub agent: RoleKey,
    pub context: Vec<TaskId>,
    pub output_file: Option<PathBuf>,
    pub contract: OutputContract,
    pub short_circuit: Option<ShortCircuit>,
}

impl TaskDescriptor {
    pub fn new(
        id: TaskId,
        agent: RoleKey,
        description: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            expected_output: expected_output.into(),
            agent,
            context: Vec::new(),
            output_file: None,
            contract: OutputContract::FreeText,
            short_circuit: None,
        }
    }

    pub fn with_context(mut self, dependency: TaskId) -> Self {
        self.context.push(dependency);
        self
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn with_contract(mut self, contract: OutputContract) -> Self {
        self.contract = contract;
        self
    }

    pub fn with_short_circuit(mut self, rule: ShortCircuit) -> Self {
        self.short_circuit = Some(rule);
        self
    }
}

/// Substitutes `{name}` placeholders from `inputs`.
///
/// Only identifier-shaped placeholders are substituted; any other brace text is
/// left alone. A placeholder with no matching input is a configuration error.
pub fn interpolate(template: &str, inputs: &BTreeMap<String, String>) -> Result<String, CrewError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        let close = after_open.find('}');
        let name = close.map(|idx| &after_open[..idx]);

        match name {
            Some(name) if is_placeholder_name(name) => {
                let value = inputs.get(name).ok_or_else(|| {
                    CrewError::config(format!(
                        "template references input '{{{name}}}' but no value was provided"
                    ))
                })?;
                out.push_str(value);
                // close is Some when name is Some
                rest = &after_open[name.len() + 1..];
            }
            _ => {
                out.push('{');
                rest = after_open;
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}

fn is_placeholder_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }
        _ => false,
    }
}
