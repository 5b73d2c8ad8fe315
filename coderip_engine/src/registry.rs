//! Per-object storage of named behaviors.
//!
//! Entries keep their registration order; disclosure and the briefing list
//! functions in that order.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How much of a behavior is visible, and whether it may be patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Sealed = 1,
    NamedOnly = 2,
    Readable = 3,
    Editable = 4,
}

impl PermissionLevel {
    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(PermissionLevel::Sealed),
            2 => Some(PermissionLevel::NamedOnly),
            3 => Some(PermissionLevel::Readable),
            4 => Some(PermissionLevel::Editable),
            _ => None,
        }
    }

    pub fn shows_name(self) -> bool {
        self >= PermissionLevel::NamedOnly
    }

    pub fn shows_body(self) -> bool {
        self >= PermissionLevel::Readable
    }

    pub fn label(self) -> &'static str {
        match self {
            PermissionLevel::Sealed => "sealed",
            PermissionLevel::NamedOnly => "named-only",
            PermissionLevel::Readable => "readable",
            PermissionLevel::Editable => "editable",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BehaviorEntry {
    pub name: String,
    pub permission: PermissionLevel,
    pub body: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BehaviorRegistry {
    entries: Vec<BehaviorEntry>,
}

impl BehaviorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a behavior.
    ///
    /// A new entry without a level starts sealed. Overwriting keeps the
    /// current level unless one is given. The body is not validated.
    pub fn register(
        &mut self,
        name: &str,
        body: &str,
        permission: Option<PermissionLevel>,
        description: Option<&str>,
    ) {
        let description = description
            .filter(|text| !text.trim().is_empty())
            .map(str::to_string);
        match self.get_mut(name) {
            Some(entry) => {
                entry.body = body.to_string();
                entry.description = description;
                if let Some(level) = permission {
                    entry.permission = level;
                }
            }
            None => self.entries.push(BehaviorEntry {
                name: name.to_string(),
                permission: permission.unwrap_or(PermissionLevel::Sealed),
                body: body.to_string(),
                description,
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&BehaviorEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut BehaviorEntry> {
        self.entries.iter_mut().find(|entry| entry.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Raise a behavior to `level`. Returns the previous level, or `None`
    /// when the behavior is missing. Never lowers a level.
    pub(crate) fn raise(&mut self, name: &str, level: PermissionLevel) -> Option<PermissionLevel> {
        let entry = self.get_mut(name)?;
        let previous = entry.permission;
        entry.permission = previous.max(level);
        Some(previous)
    }

    pub(crate) fn replace_body(&mut self, name: &str, body: String) -> bool {
        match self.get_mut(name) {
            Some(entry) => {
                entry.body = body;
                true
            }
            None => false,
        }
    }

    pub(crate) fn replace_description(&mut self, name: &str, description: Option<String>) {
        if let Some(entry) = self.get_mut(name) {
            entry.description = description.filter(|text| !text.trim().is_empty());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &BehaviorEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
