//! Configuration loading and validation.
//!
//! Sources are layered: built-in defaults, then an optional TOML file, then
//! environment variables. Keys are flat and share their names with the
//! environment variables (`BOT_PROMPT` in the environment, `bot_prompt` in
//! the file).

use crate::error::{ConfigError, Result};
use crate::llm::CompletionParams;

use serde::Deserialize;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Persona used when `BOT_PROMPT` is not set.
pub const DEFAULT_PERSONA: &str = "You are a friendly bot in a Twitch chat. Keep answers short, \
     stay respectful, and do not discuss religion or politics.";

/// Which OpenAI endpoint family the backend talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiStyle {
    /// `/v1/chat/completions` with role-tagged messages.
    #[default]
    Chat,
    /// Legacy `/v1/completions` with a flattened transcript prompt.
    Completions,
}

impl ApiStyle {
    /// Parse the `GPT_MODE` value (`CHAT` or `PROMPT`).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CHAT" => Some(ApiStyle::Chat),
            "PROMPT" | "COMPLETIONS" => Some(ApiStyle::Completions),
            _ => None,
        }
    }
}

/// Twitch account and channel list.
#[derive(Debug, Clone, PartialEq)]
pub struct TwitchConfig {
    pub username: String,
    pub oauth_token: Option<String>,
    pub channels: Vec<String>,
}

/// Model backend selection and decoding parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub api_style: ApiStyle,
    pub model_name: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub params: CompletionParams,
    /// Hard ceiling on a single model call.
    pub call_timeout: Duration,
}

/// Global call-rate gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CooldownConfig {
    pub window: Duration,
    /// Send a "please wait" notice when a command is throttled.
    pub notify: bool,
}

/// Spontaneous interjection behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct InterjectionConfig {
    /// Chance in percent (0..=100) that a candidate message gets a reply.
    pub percent: u8,
    /// Fixed prompt sent instead of the chat message, if set.
    pub prompt: Option<String>,
}

/// Outbound pacing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatchConfig {
    pub max_segment_len: usize,
    pub message_delay: Duration,
}

/// Complete bot configuration. Immutable; replaced wholesale on update.
#[derive(Debug, Clone, PartialEq)]
pub struct BotConfig {
    pub twitch: TwitchConfig,
    pub model: ModelConfig,
    pub persona: String,
    /// Maximum number of user/assistant pairs kept in memory.
    pub history_limit: usize,
    /// Number of recent turns included in each prompt.
    pub recent_window: usize,
    pub cooldown: CooldownConfig,
    /// Lowercased command tokens, e.g. `!gpt`.
    pub command_tokens: Vec<String>,
    pub interjection: InterjectionConfig,
    pub send_username: bool,
    pub language_adaptive: bool,
    pub tts_enabled: bool,
    pub dispatch: DispatchConfig,
    /// When false, inbound events are ignored and in-flight calls cancelled.
    pub active: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self::from_raw(RawConfig::default()).expect("hardcoded defaults are valid")
    }
}

/// Flat, serde-facing view of every configuration source.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct RawConfig {
    gpt_mode: String,
    history_length: usize,
    openai_api_key: Option<String>,
    openai_base_url: String,
    model_name: String,
    twitch_user: String,
    twitch_auth: Option<String>,
    command_name: Vec<String>,
    channels: Vec<String>,
    send_username: bool,
    enable_tts: bool,
    bot_prompt: String,
    random_int: u32,
    cooldown_ms: u64,
    cooldown_notice: bool,
    recent_window: usize,
    language_adaptive: bool,
    max_segment_len: usize,
    message_delay_ms: u64,
    call_timeout_secs: u64,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    max_tokens: u32,
    interjection_prompt: Option<String>,
    bot_active: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            gpt_mode: "CHAT".into(),
            history_length: 5,
            openai_api_key: None,
            openai_base_url: "https://api.openai.com".into(),
            model_name: "gpt-3.5-turbo".into(),
            twitch_user: "relaybot".into(),
            twitch_auth: None,
            command_name: vec!["!gpt".into()],
            channels: Vec::new(),
            send_username: true,
            enable_tts: false,
            bot_prompt: DEFAULT_PERSONA.into(),
            random_int: 50,
            cooldown_ms: 10_000,
            cooldown_notice: true,
            recent_window: 6,
            language_adaptive: false,
            max_segment_len: 399,
            message_delay_ms: 1_000,
            call_timeout_secs: 30,
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.5,
            presence_penalty: 0.6,
            max_tokens: 100,
            interjection_prompt: None,
            bot_active: true,
        }
    }
}

impl BotConfig {
    /// Load configuration from the optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Load configuration with an explicit environment map instead of the
    /// process environment. `None` reads the real environment.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::new(
                &path.to_string_lossy(),
                config::FileFormat::Toml,
            ));
        }

        let environment = config::Environment::default()
            .try_parsing(true)
            .ignore_empty(true)
            .list_separator(",")
            .with_list_parse_key("command_name")
            .with_list_parse_key("channels")
            .source(env);
        builder = builder.add_source(environment);

        let raw: RawConfig = builder
            .build()
            .and_then(|merged| merged.try_deserialize())
            .map_err(|source| ConfigError::Load {
                path: path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "environment".into()),
                source: Arc::new(source),
            })?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let api_style = ApiStyle::parse(&raw.gpt_mode).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "GPT_MODE must be CHAT or PROMPT, got {:?}",
                raw.gpt_mode
            ))
        })?;

        let persona = raw.bot_prompt.trim().to_string();
        if persona.is_empty() {
            return Err(ConfigError::Invalid("BOT_PROMPT must not be empty".into()).into());
        }

        let percent = u8::try_from(raw.random_int)
            .ok()
            .filter(|percent| *percent <= 100)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "RANDOM_INT must be between 0 and 100, got {}",
                    raw.random_int
                ))
            })?;

        if raw.max_segment_len == 0 {
            return Err(ConfigError::Invalid("MAX_SEGMENT_LEN must be positive".into()).into());
        }

        if raw.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid("CALL_TIMEOUT_SECS must be positive".into()).into());
        }

        if !(0.0..=2.0).contains(&raw.temperature) {
            return Err(ConfigError::Invalid(format!(
                "TEMPERATURE must be between 0 and 2, got {}",
                raw.temperature
            ))
            .into());
        }

        let command_tokens = raw
            .command_name
            .iter()
            .map(|token| token.trim().to_lowercase())
            .filter(|token| !token.is_empty())
            .collect();

        let channels = raw
            .channels
            .iter()
            .map(|channel| {
                let channel = channel.trim();
                channel.strip_prefix('#').unwrap_or(channel).to_lowercase()
            })
            .filter(|channel| !channel.is_empty())
            .collect();

        Ok(Self {
            twitch: TwitchConfig {
                username: raw.twitch_user.trim().to_string(),
                oauth_token: non_empty(raw.twitch_auth),
                channels,
            },
            model: ModelConfig {
                api_style,
                model_name: raw.model_name,
                api_key: non_empty(raw.openai_api_key),
                base_url: raw.openai_base_url,
                params: CompletionParams {
                    temperature: raw.temperature,
                    top_p: raw.top_p,
                    frequency_penalty: raw.frequency_penalty,
                    presence_penalty: raw.presence_penalty,
                    max_tokens: raw.max_tokens,
                },
                call_timeout: Duration::from_secs(raw.call_timeout_secs),
            },
            persona,
            history_limit: raw.history_length,
            recent_window: raw.recent_window,
            cooldown: CooldownConfig {
                window: Duration::from_millis(raw.cooldown_ms),
                notify: raw.cooldown_notice,
            },
            command_tokens,
            interjection: InterjectionConfig {
                percent,
                prompt: non_empty(raw.interjection_prompt),
            },
            send_username: raw.send_username,
            language_adaptive: raw.language_adaptive,
            tts_enabled: raw.enable_tts,
            dispatch: DispatchConfig {
                max_segment_len: raw.max_segment_len,
                message_delay: Duration::from_millis(raw.message_delay_ms),
            },
            active: raw.bot_active,
        })
    }

    /// Check the credentials needed to actually connect. Not part of
    /// `load` so that tests and dry runs work without secrets.
    pub fn require_credentials(&self) -> Result<()> {
        if self.twitch.oauth_token.is_none() {
            return Err(ConfigError::MissingKey("TWITCH_AUTH".into()).into());
        }
        if self.model.api_key.is_none() {
            return Err(ConfigError::MissingKey("OPENAI_API_KEY".into()).into());
        }
        if self.twitch.channels.is_empty() {
            return Err(ConfigError::Invalid("CHANNELS must list at least one channel".into()).into());
        }
        Ok(())
    }

    /// Default config file location: `<config dir>/relaybot/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("relaybot").join("config.toml"))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
