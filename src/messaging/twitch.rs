//! Twitch chat transport using twitch-irc.

use crate::error::MessagingError;
use crate::messaging::traits::{InboundStream, Messaging};
use crate::{ChatUser, InboundEvent};

use twitch_irc::login::StaticLoginCredentials;
use twitch_irc::message::{PrivmsgMessage, ServerMessage};
use twitch_irc::{ClientConfig, SecureTCPTransport, TwitchIRCClient};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};

type IrcClient = TwitchIRCClient<SecureTCPTransport, StaticLoginCredentials>;

/// Twitch chat adapter state.
pub struct TwitchAdapter {
    username: String,
    oauth_token: String,
    channels: Vec<String>,
    client: Arc<RwLock<Option<IrcClient>>>,
    shutdown_tx: Arc<RwLock<Option<mpsc::Sender<()>>>>,
}

impl TwitchAdapter {
    pub fn new(
        username: impl Into<String>,
        oauth_token: impl Into<String>,
        channels: Vec<String>,
    ) -> Self {
        Self {
            username: username.into(),
            oauth_token: oauth_token.into(),
            channels,
            client: Arc::new(RwLock::new(None)),
            shutdown_tx: Arc::new(RwLock::new(None)),
        }
    }

    /// Join every channel, logging failures. Returns the first failure.
    fn join_all(client: &IrcClient, channels: &[String]) -> Option<MessagingError> {
        let mut first_failure = None;
        for channel in channels {
            let channel_login = channel_login(channel);
            if let Err(error) = client.join(channel_login.to_owned()) {
                tracing::error!(channel = %channel_login, %error, "failed to join twitch channel");
                first_failure.get_or_insert(MessagingError::JoinFailed {
                    channel: channel_login.to_owned(),
                    reason: error.to_string(),
                });
            }
        }
        first_failure
    }
}

/// Tokens are often pasted with the `oauth:` prefix chat clients use.
fn bare_token(token: &str) -> &str {
    token.strip_prefix("oauth:").unwrap_or(token)
}

fn channel_login(channel: &str) -> &str {
    channel.strip_prefix('#').unwrap_or(channel)
}

fn to_event(privmsg: PrivmsgMessage, bot_username: &str) -> InboundEvent {
    let is_self = privmsg.sender.login.eq_ignore_ascii_case(bot_username);

    let mut metadata = HashMap::new();
    metadata.insert(
        "twitch_message_id".into(),
        serde_json::Value::String(privmsg.message_id),
    );
    metadata.insert(
        "twitch_user_id".into(),
        serde_json::Value::String(privmsg.sender.id),
    );
    metadata.insert(
        "sender_display_name".into(),
        serde_json::Value::String(privmsg.sender.name),
    );

    InboundEvent {
        channel: privmsg.channel_login,
        user: ChatUser {
            name: privmsg.sender.login,
            is_self,
        },
        text: privmsg.message_text,
        timestamp: privmsg.server_timestamp,
        metadata,
    }
}

impl Messaging for TwitchAdapter {
    fn name(&self) -> &str {
        "twitch"
    }

    async fn start(&self) -> crate::Result<InboundStream> {
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        *self.shutdown_tx.write().await = Some(shutdown_tx);

        let credentials = StaticLoginCredentials::new(
            self.username.clone(),
            Some(bare_token(&self.oauth_token).to_string()),
        );
        let config = ClientConfig::new_simple(credentials);

        let (mut incoming, client) = IrcClient::new(config);

        // Join failures are logged per channel and do not abort start-up.
        Self::join_all(&client, &self.channels);

        tracing::info!(
            username = %self.username,
            channels = ?self.channels,
            "twitch connected"
        );

        *self.client.write().await = Some(client);

        let bot_username = self.username.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("twitch message loop shutting down");
                        break;
                    }
                    message = incoming.recv() => {
                        let Some(message) = message else {
                            tracing::info!("twitch incoming stream ended");
                            break;
                        };

                        let ServerMessage::Privmsg(privmsg) = message else {
                            continue;
                        };

                        // Own messages are forwarded flagged; the classifier drops them.
                        let event = to_event(privmsg, &bot_username);

                        if let Err(error) = inbound_tx.send(event).await {
                            tracing::warn!(
                                %error,
                                "failed to forward twitch message (receiver dropped)"
                            );
                            return;
                        }
                    }
                }
            }
        });

        let stream = tokio_stream::wrappers::ReceiverStream::new(inbound_rx);
        Ok(Box::pin(stream))
    }

    async fn join(&self, channels: &[String]) -> crate::Result<()> {
        let client_guard = self.client.read().await;
        let client = client_guard
            .as_ref()
            .ok_or(MessagingError::NotConnected { adapter: "twitch" })?;

        match Self::join_all(client, channels) {
            Some(failure) => Err(failure.into()),
            None => Ok(()),
        }
    }

    async fn send(&self, channel: &str, text: &str) -> crate::Result<()> {
        let client_guard = self.client.read().await;
        let client = client_guard
            .as_ref()
            .ok_or(MessagingError::NotConnected { adapter: "twitch" })?;

        let channel = channel_login(channel);
        client
            .say(channel.to_owned(), text.to_owned())
            .await
            .map_err(|error| MessagingError::SendFailed {
                channel: channel.to_owned(),
                reason: error.to_string(),
            })?;

        Ok(())
    }

    async fn health_check(&self) -> crate::Result<()> {
        let client_guard = self.client.read().await;
        if client_guard.is_none() {
            return Err(MessagingError::NotConnected { adapter: "twitch" }.into());
        }
        Ok(())
    }

    async fn shutdown(&self) -> crate::Result<()> {
        if let Some(tx) = self.shutdown_tx.read().await.as_ref() {
            tx.send(()).await.ok();
        }

        // Dropping the client closes its connections.
        *self.client.write().await = None;

        tracing::info!("twitch adapter shut down");
        Ok(())
    }
}
