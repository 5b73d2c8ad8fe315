use std::collections::BTreeMap;

use coderip_analysis::markup::DescriptorToken;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectOutcome {
    Added,
    AlreadyHeld,
}

/// Collected descriptor tokens and stackable keys.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Inventory {
    tokens: Vec<DescriptorToken>,
    keys: BTreeMap<String, u32>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens dedupe by category and text; collecting again is not an error.
    pub fn collect(&mut self, token: DescriptorToken) -> CollectOutcome {
        if self.tokens.contains(&token) {
            return CollectOutcome::AlreadyHeld;
        }
        self.tokens.push(token);
        CollectOutcome::Added
    }

    pub fn tokens(&self) -> &[DescriptorToken] {
        &self.tokens
    }

    pub fn add_keys(&mut self, kind: &str, count: u32) -> u32 {
        if count == 0 {
            return self.key_count(kind);
        }
        let held = self.keys.entry(kind.to_string()).or_insert(0);
        *held = held.saturating_add(count);
        *held
    }

    pub fn key_count(&self, kind: &str) -> u32 {
        self.keys.get(kind).copied().unwrap_or(0)
    }

    /// Spend one key. The entry disappears when the last one is used.
    pub fn consume_key(&mut self, kind: &str) -> bool {
        let Some(held) = self.keys.get_mut(kind) else {
            return false;
        };
        *held -= 1;
        if *held == 0 {
            self.keys.remove(kind);
        }
        true
    }

    pub fn keys(&self) -> &BTreeMap<String, u32> {
        &self.keys
    }
}
