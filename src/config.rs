use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::{BotError, Result};

pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_LOG_FILE: &str = "sebastian_bot.log";

/// Fixed gameplay and runtime constants. Not mutable at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuning {
    pub obedience_decay: f64,
    pub soul_gain: f64,
    pub jealousy_decay: f64,
    pub bond_reward: f64,
    pub obedience_reward: f64,
    pub quest_steps: u32,
    pub story_event_interval: Duration,
    pub message_history_limit: usize,
    pub chat_timeout: Duration,
    pub image_timeout: Duration,
    pub command_cooldown: Duration,
    pub long_memory_limit: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Tuning {
            obedience_decay: 0.05,
            soul_gain: 0.03,
            jealousy_decay: 0.03,
            bond_reward: 0.5,
            obedience_reward: 0.3,
            quest_steps: 3,
            story_event_interval: Duration::from_secs(45 * 60),
            message_history_limit: 6,
            chat_timeout: Duration::from_secs(30),
            image_timeout: Duration::from_secs(60),
            command_cooldown: Duration::from_secs(10),
            long_memory_limit: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub port: u16,
    pub db_path: PathBuf,
    pub log_file: PathBuf,
    pub model: String,
    pub image_model: String,
    pub openai_base_url: String,
    pub tuning: Tuning,
}

impl Config {
    /// Read configuration from the process environment (after `.env`, if any).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|e| BotError::Parse(format!("PORT={}: {}", raw, e)))?,
            None => DEFAULT_PORT,
        };

        let db_path = get("SEBASTIAN_DB")
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        Ok(Config {
            discord_token: get("DISCORD_TOKEN"),
            openai_api_key: get("OPENAI_API_KEY"),
            port,
            db_path,
            log_file: get("SEBASTIAN_LOG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
            model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            image_model: get("OPENAI_IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            tuning: Tuning::default(),
        })
    }

    /// Both credentials are required before the bot may connect anywhere.
    pub fn validate_for_bot(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.discord_token.is_none() {
            missing.push("DISCORD_TOKEN".to_string());
        }
        if self.openai_api_key.is_none() {
            missing.push("OPENAI_API_KEY".to_string());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(BotError::Config(missing))
        }
    }

    pub fn require_openai_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| BotError::Config(vec!["OPENAI_API_KEY".to_string()]))
    }
}

fn default_db_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sebastian")
        .join("sebastian.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 10000);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.tuning.quest_steps, 3);
        assert_eq!(config.tuning.long_memory_limit, 20);
        assert!(config.db_path.ends_with("sebastian/sebastian.db"));
    }

    #[test]
    fn test_missing_credentials_are_all_reported() {
        let config = Config::from_lookup(lookup(&[("OPENAI_API_KEY", "  ")])).unwrap();
        match config.validate_for_bot() {
            Err(BotError::Config(missing)) => {
                assert_eq!(missing, vec!["DISCORD_TOKEN", "OPENAI_API_KEY"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_complete_environment_validates() {
        let config = Config::from_lookup(lookup(&[
            ("DISCORD_TOKEN", "discord"),
            ("OPENAI_API_KEY", "sk-test"),
            ("PORT", "8080"),
            ("SEBASTIAN_DB", "/tmp/manor.db"),
        ]))
        .unwrap();
        assert!(config.validate_for_bot().is_ok());
        assert_eq!(config.port, 8080);
        assert_eq!(config.db_path, PathBuf::from("/tmp/manor.db"));
        assert_eq!(config.require_openai_key().unwrap(), "sk-test");
    }

    #[test]
    fn test_invalid_port_is_a_parse_error() {
        let result = Config::from_lookup(lookup(&[("PORT", "manor")]));
        assert!(matches!(result, Err(BotError::Parse(_))));
    }
}
