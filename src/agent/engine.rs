//! The orchestration engine: turns one inbound chat event into at most one
//! model call and an outbound plan.
//!
//! The engine owns the conversation store and the cooldown gate. It never
//! touches the transport; the bot loop delivers the plans it returns.

use crate::InboundEvent;
use crate::agent::classifier::{Interaction, InterjectionSampler, classify};
use crate::agent::cooldown::{Admission, CooldownGate};
use crate::config::BotConfig;
use crate::conversation::{ConversationStore, Turn, build_prompt};
use crate::error::{LlmError, Result};
use crate::llm::{CompletionParams, ModelBackend};
use crate::logging::truncate_for_log;
use crate::messaging::dispatch::{OutboundPlan, plan};
use crate::prompts::{PromptEngine, sanitize_language};
use crate::settings::SettingsStore;

use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use std::sync::Arc;

/// Sent to chat when a command arrives during the cooldown window.
pub const THROTTLE_NOTICE: &str = "Please wait a moment before trying again.";

/// Sent to chat when the model call fails.
pub const FALLBACK_REPLY: &str = "Sorry, something went wrong. Please try again later.";

/// Token ceiling for the language detection sub-call.
const LANGUAGE_DETECTION_MAX_TOKENS: u32 = 10;

/// Longest reply preview written to the logs.
const LOG_PREVIEW_CHARS: usize = 80;

/// Why the engine is calling the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionKind {
    Command,
    Interjection,
}

/// Result of one `respond` call. None of these are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Replied(String),
    Throttled { remaining: Duration },
    EmptyReply,
    CallFailed { reason: String },
    Cancelled,
}

/// Everything the bot loop needs after one event.
#[derive(Debug)]
pub struct EventResult {
    pub interaction: Interaction,
    /// `None` when no call was attempted.
    pub outcome: Option<Outcome>,
    pub plan: OutboundPlan,
}

impl EventResult {
    fn skipped(interaction: Interaction) -> Self {
        Self {
            interaction,
            outcome: None,
            plan: OutboundPlan::default(),
        }
    }

    /// The model reply, if the call produced one.
    pub fn reply(&self) -> Option<&str> {
        match &self.outcome {
            Some(Outcome::Replied(reply)) => Some(reply),
            _ => None,
        }
    }
}

pub struct Engine {
    settings: Arc<SettingsStore>,
    backend: Arc<dyn ModelBackend>,
    store: ConversationStore,
    cooldown: CooldownGate,
    sampler: InterjectionSampler,
    prompts: PromptEngine,
    /// Snapshot the store and gate were last synced to.
    applied: Arc<BotConfig>,
}

impl Engine {
    pub fn new(settings: Arc<SettingsStore>, backend: Arc<dyn ModelBackend>) -> Result<Self> {
        let config = settings.current();

        Ok(Self {
            store: ConversationStore::new(config.persona.clone(), config.history_limit),
            cooldown: CooldownGate::new(config.cooldown.window),
            sampler: InterjectionSampler::from_os_rng(),
            prompts: PromptEngine::new()?,
            applied: config,
            settings,
            backend,
        })
    }

    /// Replace the interjection sampler, e.g. with a seeded one.
    pub fn with_sampler(mut self, sampler: InterjectionSampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn cooldown(&self) -> &CooldownGate {
        &self.cooldown
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// Load the current snapshot and apply pending resets and any persona,
    /// history limit or cooldown window change it carries.
    fn sync_config(&mut self) -> Arc<BotConfig> {
        let config = self.settings.current();
        let reset = self.settings.take_reset();

        if reset.history {
            self.store.clear();
            tracing::info!("conversation history reset");
        }
        if reset.cooldown {
            self.cooldown.reset();
            tracing::info!("cooldown reset");
        }

        if !Arc::ptr_eq(&config, &self.applied) {
            if config.persona != self.applied.persona {
                self.store.replace_persona(config.persona.clone());
                tracing::info!("persona replaced");
            }
            if config.history_limit != self.applied.history_limit {
                self.store.set_history_limit(config.history_limit);
            }
            self.cooldown.set_window(config.cooldown.window);
            self.applied = Arc::clone(&config);
        }

        config
    }

    /// Call the model for `text` on behalf of `user`, subject to the
    /// cooldown. Records the exchange in the conversation store; never
    /// sends anything.
    pub async fn respond(
        &mut self,
        kind: InteractionKind,
        text: &str,
        user: &str,
        cancel: &CancellationToken,
    ) -> Outcome {
        let config = self.sync_config();
        self.respond_with(&config, kind, text, user, cancel).await
    }

    async fn respond_with(
        &mut self,
        config: &BotConfig,
        kind: InteractionKind,
        text: &str,
        user: &str,
        cancel: &CancellationToken,
    ) -> Outcome {
        let text = text.trim();
        if text.is_empty() {
            return Outcome::EmptyReply;
        }

        if let Admission::Rejected { remaining } = self.cooldown.try_admit(Instant::now()) {
            tracing::debug!(
                ?kind,
                %user,
                remaining_ms = remaining.as_millis() as u64,
                "cooldown active, call rejected"
            );
            return Outcome::Throttled { remaining };
        }

        let user_text = if config.send_username {
            self.prompts
                .render_attribution(user, text)
                .unwrap_or_else(|error| {
                    tracing::warn!(%error, "attribution template failed, sending bare text");
                    text.to_string()
                })
        } else {
            text.to_string()
        };

        let language_hint = if config.language_adaptive {
            self.detect_language(config, text, cancel).await
        } else {
            None
        };

        if cancel.is_cancelled() {
            tracing::info!(?kind, "model call cancelled before start");
            return Outcome::Cancelled;
        }

        let messages = build_prompt(
            self.store.persona(),
            language_hint.as_deref(),
            self.store.recent_window(config.recent_window),
            &user_text,
        );

        if let Err(error) = self.store.append_user(user_text) {
            tracing::error!(%error, "user turn rejected by conversation store");
            return Outcome::CallFailed {
                reason: error.to_string(),
            };
        }
        self.store.enforce_bound();

        tracing::debug!(
            ?kind,
            %user,
            backend = self.backend.name(),
            messages = messages.len(),
            "calling model"
        );

        let timeout = config.model.call_timeout;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(?kind, "model call cancelled");
                return Outcome::Cancelled;
            }
            result = tokio::time::timeout(
                timeout,
                self.backend.complete(&messages, &config.model.params),
            ) => result,
        };

        let reply = match result {
            Err(_elapsed) => {
                let error = LlmError::Timeout {
                    secs: timeout.as_secs(),
                };
                tracing::warn!(%error, ?kind, "model call failed");
                return Outcome::CallFailed {
                    reason: error.to_string(),
                };
            }
            Ok(Err(error)) => {
                tracing::warn!(%error, ?kind, "model call failed");
                return Outcome::CallFailed {
                    reason: error.to_string(),
                };
            }
            Ok(Ok(reply)) => reply.map(|reply| reply.trim().to_string()),
        };

        let Some(reply) = reply.filter(|reply| !reply.is_empty()) else {
            tracing::info!(?kind, "model returned no text");
            return Outcome::EmptyReply;
        };

        if let Err(error) = self.store.append_assistant(reply.as_str()) {
            tracing::error!(%error, "assistant turn rejected by conversation store");
        }
        self.store.enforce_bound();

        let (preview, _) = truncate_for_log(&reply, LOG_PREVIEW_CHARS);
        tracing::info!(?kind, %user, reply = %preview, "model replied");

        Outcome::Replied(reply)
    }

    /// Ask the model which language `text` is written in. Any failure means
    /// "use the default language".
    async fn detect_language(
        &self,
        config: &BotConfig,
        text: &str,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let messages = [
            Turn::system(self.prompts.language_detection()),
            Turn::user(text),
        ];
        let params = CompletionParams::classification(LANGUAGE_DETECTION_MAX_TOKENS);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            result = tokio::time::timeout(
                config.model.call_timeout,
                self.backend.complete(&messages, &params),
            ) => result,
        };

        let raw = match result {
            Ok(Ok(Some(raw))) => raw,
            Ok(Ok(None)) => {
                tracing::debug!("language detection returned no text");
                return None;
            }
            Ok(Err(error)) => {
                tracing::warn!(%error, "language detection failed, using default language");
                return None;
            }
            Err(_elapsed) => {
                tracing::warn!("language detection timed out, using default language");
                return None;
            }
        };

        let Some(language) = sanitize_language(&raw) else {
            tracing::debug!(reply = %raw, "language detection reply is not a language name");
            return None;
        };

        match self.prompts.render_language_instruction(&language) {
            Ok(instruction) => {
                tracing::debug!(%language, "responding in detected language");
                Some(instruction)
            }
            Err(error) => {
                tracing::warn!(%error, "language instruction template failed");
                None
            }
        }
    }

    /// Classify `event`, call the model if warranted, and plan what to send.
    pub async fn handle_event(
        &mut self,
        event: &InboundEvent,
        cancel: &CancellationToken,
    ) -> EventResult {
        let config = self.sync_config();
        let interaction = classify(event, &config.twitch.username, &config.command_tokens);

        if !config.active {
            tracing::trace!(channel = %event.channel, "bot inactive, event ignored");
            return EventResult::skipped(interaction);
        }

        let request = match &interaction {
            Interaction::SelfEcho | Interaction::Ignored => None,
            Interaction::Command { name, args } if args.is_empty() => {
                tracing::debug!(command = %name, user = %event.user.name, "command without text ignored");
                None
            }
            Interaction::Command { args, .. } => Some((InteractionKind::Command, args.clone())),
            Interaction::SpontaneousCandidate(text) => self
                .sampler
                .should_interject(config.interjection.percent)
                .then(|| {
                    let text = config
                        .interjection
                        .prompt
                        .clone()
                        .unwrap_or_else(|| text.clone());
                    (InteractionKind::Interjection, text)
                }),
        };

        let Some((kind, text)) = request else {
            return EventResult::skipped(interaction);
        };

        let outcome = self
            .respond_with(&config, kind, &text, &event.user.name, cancel)
            .await;

        let outbound = match (&outcome, kind) {
            (Outcome::Replied(reply), _) => Some(reply.as_str()),
            (Outcome::Throttled { .. }, InteractionKind::Command) if config.cooldown.notify => {
                Some(THROTTLE_NOTICE)
            }
            (Outcome::CallFailed { .. }, _) => Some(FALLBACK_REPLY),
            _ => None,
        };

        let plan = outbound
            .map(|text| {
                plan(
                    &event.channel,
                    text,
                    config.dispatch.max_segment_len,
                    config.dispatch.message_delay,
                )
            })
            .unwrap_or_default();

        EventResult {
            interaction,
            outcome: Some(outcome),
            plan,
        }
    }
}
