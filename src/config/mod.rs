//! Configuration loading: the static JSON prompt/model bundle and
//! environment-resolved secrets.
//!
//! The bundle is loaded exactly once at startup from `./config.json` (or
//! `$EROOM_CONFIG_PATH`) and threaded through the components at construction
//! time; there is no module-level mutable state. Secrets come from the
//! environment only.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;

/// Length of the access token generated when `EROOM_PRIVATE_KEY` is unset.
const GENERATED_TOKEN_LEN: usize = 32;

/// Number of `MESHY_KEY_<n>` environment slots probed at startup.
const MESHY_KEY_SLOTS: u32 = 3;

// ── Prompt/model bundle ─────────────────────────────────────────

/// System prompts for the two LLM roles.
#[derive(Debug, Clone, Deserialize)]
pub struct Prompts {
    /// System prompt for scenario generation.
    pub scenario: String,
    /// System prompt for unified script generation.
    pub unified_scripts: String,
}

/// Model name and sampling parameters.
#[derive(Clone, Deserialize)]
pub struct ModelParams {
    /// Provider model identifier.
    pub name: String,
    /// Response token ceiling for both roles.
    #[serde(rename = "maxTokens")]
    pub max_tokens: u32,
    /// Sampling temperature for scenario generation.
    #[serde(rename = "scenarioTemperature")]
    pub scenario_temperature: f32,
    /// Sampling temperature for script generation.
    #[serde(rename = "scriptTemperature")]
    pub script_temperature: f32,
}

impl std::fmt::Debug for ModelParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelParams")
            .field("name", &self.name)
            .field("max_tokens", &self.max_tokens)
            .field("scenario_temperature", &self.scenario_temperature)
            .field("script_temperature", &self.script_temperature)
            .finish()
    }
}

/// Static configuration bundle loaded once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// System prompts.
    pub prompts: Prompts,
    /// Model parameters.
    pub model: ModelParams,
}

impl ServerConfig {
    /// Load the bundle from `$EROOM_CONFIG_PATH` or `./config.json`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file is missing, unreadable, malformed, or
    /// carries blank prompts; all of these are startup failures.
    pub fn load() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded config bundle");
        Self::from_json(&contents)
    }

    /// Parse a JSON string into config (also used by tests).
    ///
    /// # Errors
    ///
    /// Returns an error on malformed JSON, missing keys, or blank prompts.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ServerConfig =
            serde_json::from_str(json).context("failed to parse config JSON")?;
        if config.prompts.scenario.trim().is_empty() {
            anyhow::bail!("config key prompts.scenario must not be blank");
        }
        if config.prompts.unified_scripts.trim().is_empty() {
            anyhow::bail!("config key prompts.unified_scripts must not be blank");
        }
        if config.model.name.trim().is_empty() {
            anyhow::bail!("config key model.name must not be blank");
        }
        Ok(config)
    }

    /// Resolve the config path using a custom env resolver (for testing).
    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(p) = env("EROOM_CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("config.json")
    }
}

// ── Secrets ─────────────────────────────────────────────────────

/// Secrets resolved from the environment at startup.
///
/// The Anthropic key is deliberately absent here: the LLM gateway reads
/// `ANTHROPIC_KEY` at first use so that a misconfigured key fails jobs,
/// not startup.
#[derive(Clone)]
pub struct Secrets {
    /// Shared access token matched against the `Authorization` header.
    pub api_token: String,
    /// Rotating Meshy bearer keys, in slot order.
    pub meshy_keys: Vec<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("api_token", &"__REDACTED__")
            .field("meshy_keys", &format!("{} key(s)", self.meshy_keys.len()))
            .finish()
    }
}

impl Secrets {
    /// Resolve secrets from the process environment.
    ///
    /// With no `EROOM_PRIVATE_KEY` a random per-process token is generated
    /// and logged so operators can still call the protected endpoints.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Resolve secrets using a custom env resolver (for testing).
    pub fn from_env_with(env: impl Fn(&str) -> Option<String>) -> Self {
        let api_token = match env("EROOM_PRIVATE_KEY") {
            Some(token) if !token.trim().is_empty() => token,
            _ => {
                let token: String = rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(GENERATED_TOKEN_LEN)
                    .map(char::from)
                    .collect();
                tracing::warn!(token = %token, "EROOM_PRIVATE_KEY not set -- generated a per-process access token");
                token
            }
        };

        let mut meshy_keys = Vec::new();
        for slot in 1..=MESHY_KEY_SLOTS {
            if let Some(key) = env(&format!("MESHY_KEY_{slot}")) {
                if !key.trim().is_empty() {
                    meshy_keys.push(key);
                }
            }
        }
        if meshy_keys.is_empty() {
            tracing::warn!("no MESHY_KEY_1..{MESHY_KEY_SLOTS} set -- mesh submissions will return error handles");
        }

        Self {
            api_token,
            meshy_keys,
        }
    }
}

/// Worker pool size from `EROOM_WORKERS` (default 1).
pub fn worker_count() -> usize {
    worker_count_with(|key| std::env::var(key).ok())
}

/// Worker pool size using a custom env resolver (for testing).
pub fn worker_count_with(env: impl Fn(&str) -> Option<String>) -> usize {
    env("EROOM_WORKERS")
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&n| n >= 1)
        .unwrap_or(1)
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_BUNDLE: &str = r#"{
        "prompts": {
            "scenario": "You design escape rooms.",
            "unified_scripts": "You write gameplay scripts."
        },
        "model": {
            "name": "claude-sonnet-4-20250514",
            "maxTokens": 8000,
            "scenarioTemperature": 0.9,
            "scriptTemperature": 0.2
        }
    }"#;

    #[test]
    fn test_parse_full_bundle() {
        let config = ServerConfig::from_json(FULL_BUNDLE).expect("should parse");
        assert_eq!(config.prompts.scenario, "You design escape rooms.");
        assert_eq!(config.prompts.unified_scripts, "You write gameplay scripts.");
        assert_eq!(config.model.name, "claude-sonnet-4-20250514");
        assert_eq!(config.model.max_tokens, 8000);
        assert!((config.model.scenario_temperature - 0.9).abs() < f32::EPSILON);
        assert!((config.model.script_temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let err = ServerConfig::from_json(r#"{"prompts": {"scenario": "s"}}"#)
            .err()
            .expect("should fail");
        assert!(err.to_string().contains("config"), "error was: {err}");
    }

    #[test]
    fn test_blank_prompt_is_an_error() {
        let json = r#"{
            "prompts": {"scenario": "  ", "unified_scripts": "x"},
            "model": {"name": "m", "maxTokens": 1, "scenarioTemperature": 1.0, "scriptTemperature": 1.0}
        }"#;
        let err = ServerConfig::from_json(json).err().expect("should fail");
        assert!(err.to_string().contains("prompts.scenario"));
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(ServerConfig::from_json("not json {{").is_err());
    }

    #[test]
    fn test_config_path_env_override() {
        let path = ServerConfig::config_path_with(|key| match key {
            "EROOM_CONFIG_PATH" => Some("/etc/eroom/bundle.json".to_owned()),
            _ => None,
        });
        assert_eq!(path, PathBuf::from("/etc/eroom/bundle.json"));
    }

    #[test]
    fn test_config_path_defaults_to_cwd() {
        let path = ServerConfig::config_path_with(|_| None);
        assert_eq!(path, PathBuf::from("config.json"));
    }

    #[test]
    fn test_secrets_use_private_key_when_set() {
        let secrets = Secrets::from_env_with(|key| match key {
            "EROOM_PRIVATE_KEY" => Some("sekrit".to_owned()),
            "MESHY_KEY_1" => Some("msy-a".to_owned()),
            "MESHY_KEY_3" => Some("msy-c".to_owned()),
            _ => None,
        });
        assert_eq!(secrets.api_token, "sekrit");
        assert_eq!(secrets.meshy_keys, vec!["msy-a", "msy-c"]);
    }

    #[test]
    fn test_secrets_generate_token_when_unset() {
        let secrets = Secrets::from_env_with(|_| None);
        assert_eq!(secrets.api_token.len(), GENERATED_TOKEN_LEN);
        assert!(secrets.api_token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(secrets.meshy_keys.is_empty());
    }

    #[test]
    fn test_secrets_debug_is_redacted() {
        let secrets = Secrets::from_env_with(|key| match key {
            "EROOM_PRIVATE_KEY" => Some("sekrit".to_owned()),
            _ => None,
        });
        let debug = format!("{secrets:?}");
        assert!(!debug.contains("sekrit"));
        assert!(debug.contains("__REDACTED__"));
    }

    #[test]
    fn test_worker_count_default_and_override() {
        assert_eq!(worker_count_with(|_| None), 1);
        assert_eq!(
            worker_count_with(|key| (key == "EROOM_WORKERS").then(|| "4".to_owned())),
            4
        );
        assert_eq!(
            worker_count_with(|key| (key == "EROOM_WORKERS").then(|| "0".to_owned())),
            1
        );
        assert_eq!(
            worker_count_with(|key| (key == "EROOM_WORKERS").then(|| "lots".to_owned())),
            1
        );
    }
}
