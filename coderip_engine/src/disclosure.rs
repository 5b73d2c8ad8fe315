//! Permission-filtered views of a behavior registry.

use coderip_analysis::markup::{extract_tokens, DescriptorToken};
use serde::Serialize;

use crate::registry::{BehaviorEntry, BehaviorRegistry, PermissionLevel};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionInfo {
    pub display_name: String,
    pub permission: PermissionLevel,
    pub sealed: bool,
    pub editable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<DescriptionView>,
}

/// Description shown once a function is readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DescriptionView {
    Markup {
        markup: String,
        tokens: Vec<DescriptorToken>,
    },
    /// The function is readable but has nothing written about it.
    Missing,
}

impl DescriptionView {
    pub fn tokens(&self) -> &[DescriptorToken] {
        match self {
            DescriptionView::Markup { tokens, .. } => tokens,
            DescriptionView::Missing => &[],
        }
    }
}

/// First character followed by one `*` per remaining character.
pub fn sealed_display_name(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => std::iter::once(first)
            .chain(chars.map(|_| '*'))
            .collect(),
        None => String::new(),
    }
}

pub fn displayed_name(entry: &BehaviorEntry) -> String {
    if entry.permission.shows_name() {
        entry.name.clone()
    } else {
        sealed_display_name(&entry.name)
    }
}

pub fn project_entry(entry: &BehaviorEntry) -> FunctionInfo {
    let visible = entry.permission.shows_body();
    let description = visible.then(|| match entry.description.as_deref() {
        Some(markup) if !markup.trim().is_empty() => DescriptionView::Markup {
            markup: markup.to_string(),
            tokens: extract_tokens(markup),
        },
        _ => DescriptionView::Missing,
    });
    FunctionInfo {
        display_name: displayed_name(entry),
        permission: entry.permission,
        sealed: !entry.permission.shows_name(),
        editable: entry.permission == PermissionLevel::Editable,
        body: visible.then(|| entry.body.clone()),
        description,
    }
}

/// Project every behavior, in registration order.
pub fn project(registry: &BehaviorRegistry) -> Vec<FunctionInfo> {
    registry.iter().map(project_entry).collect()
}

/// Find the behavior whose displayed form is `shown`. When two sealed names
/// collapse to the same mask the first registered wins.
pub fn resolve_display_name<'a>(
    registry: &'a BehaviorRegistry,
    shown: &str,
) -> Option<&'a BehaviorEntry> {
    registry.iter().find(|entry| displayed_name(entry) == shown)
}
