//! relaybot: a chat bot that relays Twitch chat to an LLM and paces the
//! reply back into the channel.

pub mod agent;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod logging;
pub mod messaging;
pub mod prompts;
pub mod settings;

#[cfg(test)]
mod test_utils;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Chat channel identifier (Twitch channel login, without the leading `#`).
pub type ChannelName = String;

/// Author of an inbound chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatUser {
    /// Login name as reported by the platform.
    pub name: String,
    /// Set by the transport when the message was sent by the bot account.
    pub is_self: bool,
}

impl ChatUser {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_self: false,
        }
    }
}

/// Inbound chat event from the transport. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub channel: ChannelName,
    pub user: ChatUser,
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Platform-specific details (message id, user id, display name).
    pub metadata: HashMap<String, serde_json::Value>,
}

impl InboundEvent {
    pub fn new(channel: impl Into<String>, user: ChatUser, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            user,
            text: text.into(),
            timestamp: chrono::Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Display name for attribution, falling back to the login name.
    pub fn display_name(&self) -> &str {
        self.metadata
            .get("sender_display_name")
            .and_then(|value| value.as_str())
            .unwrap_or(&self.user.name)
    }
}

/// Out-of-band notifications for collaborators (TTS, UI push).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BotEvent {
    /// A model reply was delivered to a channel.
    ReplySent { channel: ChannelName, text: String },
    /// TTS is enabled and a reply is ready to be voiced.
    TtsRequested {
        channel: ChannelName,
        text: String,
        user: String,
    },
    /// A new configuration snapshot took effect.
    ConfigReloaded,
}
