//! Test doubles shared by the engine and bot loop tests.

use crate::conversation::Turn;
use crate::error::{LlmError, MessagingError};
use crate::llm::{CompletionParams, ModelBackend};
use crate::messaging::traits::{InboundStream, Messaging};

use async_trait::async_trait;
use parking_lot::Mutex;

use std::collections::VecDeque;

/// Scripted answer for one backend call.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Empty,
    Fail(String),
    /// Never completes; only a timeout or cancellation ends the call.
    Hang,
}

impl MockReply {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Backend that replays scripted replies and records every request.
/// Runs out of script as `Text("ok")`.
#[derive(Default)]
pub struct MockBackend {
    replies: Mutex<VecDeque<MockReply>>,
    calls: Mutex<Vec<(Vec<Turn>, CompletionParams)>>,
}

impl MockBackend {
    pub fn new(replies: impl IntoIterator<Item = MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<(Vec<Turn>, CompletionParams)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        messages: &[Turn],
        params: &CompletionParams,
    ) -> Result<Option<String>, LlmError> {
        self.calls.lock().push((messages.to_vec(), *params));
        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| MockReply::text("ok"));

        match reply {
            MockReply::Text(text) => Ok(Some(text)),
            MockReply::Empty => Ok(None),
            MockReply::Fail(reason) => Err(LlmError::ProviderRequest(reason)),
            MockReply::Hang => futures::future::pending().await,
        }
    }
}

/// Transport that records every sent line.
#[derive(Default)]
pub struct MockTransport {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail_sends: bool,
}

impl MockTransport {
    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, text)| text.clone()).collect()
    }
}

impl Messaging for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn start(&self) -> crate::Result<InboundStream> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn join(&self, _channels: &[String]) -> crate::Result<()> {
        Ok(())
    }

    async fn send(&self, channel: &str, text: &str) -> crate::Result<()> {
        if self.fail_sends {
            return Err(MessagingError::SendFailed {
                channel: channel.to_string(),
                reason: "mock send failure".into(),
            }
            .into());
        }
        self.sent.lock().push((channel.to_string(), text.to_string()));
        Ok(())
    }

    async fn health_check(&self) -> crate::Result<()> {
        Ok(())
    }
}
