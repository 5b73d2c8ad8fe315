use std::{env, fs, path::Path};

use anyhow::{Context, Result};
use coderip_protocol::{DirectiveGrammar, GrammarVariant, DEFAULT_KEYWORD};
use serde::{Deserialize, Serialize};

/// Settings for the chat agent and its transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub api_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Number of user/assistant turns kept besides the system briefing.
    pub history_window: usize,
    pub persona: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.deepseek.com/v1/chat/completions".to_string(),
            api_key_env: "CODERIP_API_KEY".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            request_timeout_secs: 30,
            max_attempts: 3,
            retry_delay_ms: 1000,
            history_window: 20,
            persona: "Alex".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn api_key(&self) -> Option<String> {
        env::var(&self.api_key_env)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectiveConfig {
    pub keyword: String,
    pub variant: GrammarVariant,
    /// Reject patches whose resulting body does not parse.
    pub validate_syntax: bool,
}

impl Default for DirectiveConfig {
    fn default() -> Self {
        Self {
            keyword: DEFAULT_KEYWORD.to_string(),
            variant: GrammarVariant::default(),
            validate_syntax: true,
        }
    }
}

impl DirectiveConfig {
    pub fn grammar(&self) -> DirectiveGrammar {
        DirectiveGrammar::new(self.keyword.clone(), self.variant)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub width: f64,
    pub height: f64,
    pub seed: u64,
    /// Lua instructions allowed per behavior call.
    pub instruction_budget: u32,
    pub load_stage_one: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: 960.0,
            height: 720.0,
            seed: 1211,
            instruction_budget: 200_000,
            load_stage_one: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub agent: AgentConfig,
    pub directive: DirectiveConfig,
    pub world: WorldConfig,
}

impl GameConfig {
    /// Load from a JSON file; a missing path or file yields the defaults.
    pub fn from_json_file(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            log::info!("config {} not found; using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config json: {}", path.display()))?;
        Ok(config)
    }
}
