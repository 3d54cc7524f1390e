//! Runtime configuration, read from the environment (and `.env`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::scaling::Resolution;
use crate::types::{DEFAULT_KEEP_IMAGES, DEFAULT_MAX_STEPS, DEFAULT_MAX_TURNS};

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Actions executed per task before it fails with a budget error.
    pub max_steps: usize,
    /// Turn count the history is pruned to before each model call.
    pub max_turns: usize,
    /// Screenshots kept inline in the history; older ones are elided.
    pub keep_images: usize,
    /// Draw numbered element boxes into structured screenshots.
    pub draw_overlay: bool,
    /// Advertise a canonical logical resolution instead of the physical one.
    pub scaling: bool,
    /// Where screenshots are written; `None` keeps them in memory.
    pub artifacts_dir: Option<PathBuf>,
    /// Physical size to assume for the desktop surface.
    pub display_override: Option<Resolution>,
    pub model: ModelConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_turns: DEFAULT_MAX_TURNS,
            keep_images: DEFAULT_KEEP_IMAGES,
            draw_overlay: true,
            scaling: true,
            artifacts_dir: default_artifacts_dir(),
            display_override: None,
            model: ModelConfig::default(),
        }
    }
}

pub fn default_artifacts_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("gui-pilot").join("screenshots"))
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value for {}: '{}'", name, raw)),
        None => Ok(None),
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<bool>> {
    match lookup(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => anyhow::bail!("invalid value for {}: '{}', expected true or false", name, v),
        },
    }
}

impl AgentConfig {
    /// Reads the process environment. Call `dotenvy::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any variable source, starting from the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            config.model.api_key = key.trim().to_string();
        }
        if let Some(model) = lookup("ANTHROPIC_MODEL").filter(|v| !v.trim().is_empty()) {
            config.model.model = model.trim().to_string();
        }
        if let Some(url) = lookup("ANTHROPIC_BASE_URL").filter(|v| !v.trim().is_empty()) {
            config.model.base_url = url.trim().to_string();
        }
        if let Some(n) = parse_var(&lookup, "ANTHROPIC_MAX_TOKENS")? {
            config.model.max_tokens = n;
        }

        if let Some(n) = parse_var(&lookup, "AGENT_MAX_STEPS")? {
            config.max_steps = n;
        }
        if let Some(n) = parse_var(&lookup, "AGENT_MAX_TURNS")? {
            config.max_turns = n;
        }
        if let Some(n) = parse_var(&lookup, "AGENT_KEEP_IMAGES")? {
            config.keep_images = n;
        }
        if let Some(dir) = lookup("AGENT_ARTIFACTS_DIR").filter(|v| !v.trim().is_empty()) {
            config.artifacts_dir = Some(PathBuf::from(dir.trim()));
        }
        if let Some(flag) = parse_flag(&lookup, "AGENT_OVERLAY")? {
            config.draw_overlay = flag;
        }
        if let Some(flag) = parse_flag(&lookup, "AGENT_SCALING")? {
            config.scaling = flag;
        }

        let width: Option<u32> = parse_var(&lookup, "WIDTH")?;
        let height: Option<u32> = parse_var(&lookup, "HEIGHT")?;
        config.display_override = match (width, height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(Resolution::new(w, h)),
            (None, None) => None,
            _ => anyhow::bail!("WIDTH and HEIGHT must both be set to positive values"),
        };

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = AgentConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(config.max_steps, 25);
        assert_eq!(config.max_turns, 40);
        assert_eq!(config.keep_images, 1);
        assert!(config.scaling && config.draw_overlay);
        assert_eq!(config.model.model, DEFAULT_MODEL);
        assert!(config.display_override.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = AgentConfig::from_lookup(env(&[
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("AGENT_MAX_STEPS", "5"),
            ("AGENT_SCALING", "off"),
            ("AGENT_ARTIFACTS_DIR", "/tmp/shots"),
            ("WIDTH", "1440"),
            ("HEIGHT", "900"),
        ]))
        .unwrap();
        assert_eq!(config.model.api_key, "sk-test");
        assert_eq!(config.max_steps, 5);
        assert!(!config.scaling);
        assert_eq!(config.artifacts_dir, Some(PathBuf::from("/tmp/shots")));
        assert_eq!(config.display_override, Some(Resolution::new(1440, 900)));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(AgentConfig::from_lookup(env(&[("AGENT_MAX_STEPS", "many")])).is_err());
        assert!(AgentConfig::from_lookup(env(&[("AGENT_OVERLAY", "maybe")])).is_err());
        assert!(AgentConfig::from_lookup(env(&[("WIDTH", "1440")])).is_err());
    }

    #[test]
    fn api_key_is_not_serialized() {
        let mut config = AgentConfig::default();
        config.model.api_key = "sk-secret".into();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
