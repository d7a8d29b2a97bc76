//! Configuration loading and validation.

use crate::conversation::prompt::{DEFAULT_PERSONA, default_quiet_topics};
use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Chatter configuration. Built once at startup and handed to the scheduler.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat platform connection.
    pub discord: DiscordConfig,

    /// Completion service connection and sampling ranges.
    pub llm: LlmConfig,

    /// Generator limits.
    pub generation: GenerationConfig,

    /// Cycle timing.
    pub schedule: ScheduleConfig,

    /// Persona and quiet-chat prompts.
    pub persona: PersonaConfig,

    /// Seed for the shared randomness source. Random when unset.
    pub seed: Option<u64>,
}

/// Chat platform configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub api_base: String,
    pub channel_id: String,
    pub token: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            api_base: "https://discord.com/api/v9".into(),
            channel_id: String::new(),
            token: String::new(),
        }
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("api_base", &self.api_base)
            .field("channel_id", &self.channel_id)
            .field("token", &"[redacted]")
            .finish()
    }
}

/// Completion service configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible base URL (the `/chat/completions` path is appended).
    pub base_url: String,

    pub api_key: String,

    /// Allow-list of model identifiers. One is drawn per attempt.
    pub models: Vec<String>,

    pub min_temperature: f64,
    pub max_temperature: f64,

    pub min_max_tokens: u32,
    pub max_max_tokens: u32,

    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".into(),
            api_key: String::new(),
            models: vec![
                "llama-3.1-8b-instant".into(),
                "llama-3.3-70b-versatile".into(),
            ],
            min_temperature: 0.9,
            max_temperature: 1.0,
            min_max_tokens: 60,
            max_max_tokens: 100,
            timeout_secs: 60,
        }
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .field("models", &self.models)
            .field("temperature", &(self.min_temperature..=self.max_temperature))
            .field("max_tokens", &(self.min_max_tokens..=self.max_max_tokens))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Generator behavior.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Completion attempts per cycle, rejections included.
    pub max_attempts: u32,

    /// Delay after a failed completion call before the next attempt.
    pub retry_delay_secs: u64,

    /// Candidates scoring strictly above this against any recent output are rejected.
    pub similarity_threshold: f64,

    /// Hard cap on posted message length, in characters.
    pub max_message_chars: usize,

    /// How many of our own outputs to remember for the repetition check.
    pub recent_output_capacity: usize,

    /// History entries included in the prompt.
    pub context_messages: usize,

    /// Own outputs quoted back in the "don't repeat" instruction.
    pub avoid_repeat_count: usize,

    /// History entries inspected for a reply target.
    pub mention_window: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_secs: 2,
            similarity_threshold: 0.7,
            max_message_chars: 200,
            recent_output_capacity: 10,
            context_messages: 5,
            avoid_repeat_count: 3,
            mention_window: 5,
        }
    }
}

impl GenerationConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Cycle timing.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Messages fetched per cycle.
    pub history_limit: u32,

    pub min_interval_secs: u64,
    pub max_interval_secs: u64,

    /// Pause after a cycle fails unexpectedly.
    pub recovery_delay_secs: u64,

    /// Drop our own messages from the fetched history.
    pub skip_own_messages: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            history_limit: 8,
            min_interval_secs: 60,
            max_interval_secs: 300,
            recovery_delay_secs: 10,
            skip_own_messages: false,
        }
    }
}

impl ScheduleConfig {
    pub fn recovery_delay(&self) -> Duration {
        Duration::from_secs(self.recovery_delay_secs)
    }
}

/// Persona block and quiet-chat topic prompts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    pub system_prompt: String,
    pub quiet_topics: Vec<String>,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_PERSONA.to_string(),
            quiet_topics: default_quiet_topics(),
        }
    }
}

impl Config {
    /// Load configuration from the optional file at `path` (or the default
    /// location when it exists), then overlay the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(|| {
            let default_path = Self::default_config_path()?;
            default_path.exists().then_some(default_path)
        });

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// `$XDG_CONFIG_HOME/chatter/config.toml` or the platform equivalent.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chatter").join("config.toml"))
    }

    /// Parse a TOML config file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Load {
            path: path.display().to_string(),
            source: Arc::new(source),
        })?;
        let config = toml::from_str(&raw).map_err(|error| ConfigError::Parse {
            path: path.display().to_string(),
            message: error.to_string(),
        })?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> std::result::Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|error| ConfigError::Parse {
            path: "<inline>".into(),
            message: error.to_string(),
        })
    }

    /// Overlay credentials and the channel id from the environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(token) = non_empty("DISCORD_TOKEN") {
            self.discord.token = token.trim().to_string();
        }
        if let Some(channel_id) = non_empty("CHANNEL_ID") {
            self.discord.channel_id = channel_id.trim().to_string();
        }
        if let Some(api_key) = non_empty("GROQ_API_KEY") {
            self.llm.api_key = api_key.trim().to_string();
        }
    }

    /// Check required keys and range sanity.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.discord.token.is_empty() {
            return Err(ConfigError::MissingKey("DISCORD_TOKEN".into()));
        }
        if self.discord.channel_id.is_empty() {
            return Err(ConfigError::MissingKey("CHANNEL_ID".into()));
        }
        if self.llm.api_key.is_empty() {
            return Err(ConfigError::MissingKey("GROQ_API_KEY".into()));
        }

        if self.llm.models.iter().all(|model| model.trim().is_empty()) {
            return Err(ConfigError::Invalid("llm.models must name at least one model".into()));
        }
        if self.llm.min_temperature.is_nan()
            || self.llm.max_temperature.is_nan()
            || self.llm.min_temperature > self.llm.max_temperature
        {
            return Err(ConfigError::Invalid(
                "llm.min_temperature must not exceed llm.max_temperature".into(),
            ));
        }
        if self.llm.min_max_tokens == 0 || self.llm.min_max_tokens > self.llm.max_max_tokens {
            return Err(ConfigError::Invalid(
                "llm max_tokens range must be non-empty and start above zero".into(),
            ));
        }

        let generation = &self.generation;
        if generation.max_attempts == 0 {
            return Err(ConfigError::Invalid("generation.max_attempts must be at least 1".into()));
        }
        if generation.recent_output_capacity == 0 {
            return Err(ConfigError::Invalid(
                "generation.recent_output_capacity must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&generation.similarity_threshold) {
            return Err(ConfigError::Invalid(
                "generation.similarity_threshold must be within [0, 1]".into(),
            ));
        }
        // Room for at least one character plus the truncation marker.
        if generation.max_message_chars < 4 {
            return Err(ConfigError::Invalid(
                "generation.max_message_chars must be at least 4".into(),
            ));
        }

        let schedule = &self.schedule;
        if schedule.history_limit == 0 {
            return Err(ConfigError::Invalid("schedule.history_limit must be at least 1".into()));
        }
        if schedule.min_interval_secs > schedule.max_interval_secs {
            return Err(ConfigError::Invalid(
                "schedule.min_interval_secs must not exceed schedule.max_interval_secs".into(),
            ));
        }

        if self.persona.quiet_topics.is_empty() {
            return Err(ConfigError::Invalid("persona.quiet_topics must not be empty".into()));
        }

        Ok(())
    }
}
