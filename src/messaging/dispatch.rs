//! Response chunking and paced delivery.
//!
//! `plan` turns one reply into an ordered list of chat lines, each small
//! enough for the channel and scheduled `index * delay` after delivery
//! starts. `deliver` executes a plan against a transport.

use crate::ChannelName;
use crate::messaging::traits::Messaging;

use std::time::Duration;

/// One outbound chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMessage {
    pub channel: ChannelName,
    pub text: String,
    /// Offset from the start of delivery.
    pub delay: Duration,
}

/// Ordered outbound lines for one reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundPlan {
    messages: Vec<PlannedMessage>,
}

impl OutboundPlan {
    pub fn messages(&self) -> &[PlannedMessage] {
        &self.messages
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlannedMessage> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Concatenated text of every line, space separated.
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|message| message.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl IntoIterator for OutboundPlan {
    type Item = PlannedMessage;
    type IntoIter = std::vec::IntoIter<PlannedMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}

impl<'a> IntoIterator for &'a OutboundPlan {
    type Item = &'a PlannedMessage;
    type IntoIter = std::slice::Iter<'a, PlannedMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// Split `text` into lines of at most `max_segment_len` characters and
/// schedule them `message_delay` apart. Empty text yields an empty plan.
pub fn plan(
    channel: &str,
    text: &str,
    max_segment_len: usize,
    message_delay: Duration,
) -> OutboundPlan {
    let messages = split_message(text, max_segment_len)
        .into_iter()
        .enumerate()
        .map(|(index, text)| PlannedMessage {
            channel: channel.to_string(),
            text,
            delay: message_delay * index as u32,
        })
        .collect();

    OutboundPlan { messages }
}

/// Split a message into chunks of at most `max_len` characters.
/// Tries to split at newlines, then whitespace, then hard-cuts.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text.trim();

    while !remaining.is_empty() {
        let Some((cut, next)) = remaining.char_indices().nth(max_len) else {
            chunks.push(remaining.to_string());
            break;
        };

        let window = &remaining[..cut];
        let split_at = if next.is_whitespace() {
            cut
        } else {
            window
                .rfind('\n')
                .or_else(|| window.rfind(char::is_whitespace))
                .filter(|&index| index > 0)
                .unwrap_or(cut)
        };

        let chunk = remaining[..split_at].trim_end();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

/// Send every line in order, waiting until each line's offset has elapsed.
/// Stops at the first send error. Dropping the future abandons the rest.
pub async fn deliver<M: Messaging>(transport: &M, plan: &OutboundPlan) -> crate::Result<()> {
    let start = tokio::time::Instant::now();

    for (index, message) in plan.iter().enumerate() {
        tokio::time::sleep_until(start + message.delay).await;

        if let Err(error) = transport.send(&message.channel, &message.text).await {
            tracing::warn!(
                %error,
                adapter = transport.name(),
                channel = %message.channel,
                sent = index,
                remaining = plan.len() - index,
                "delivery stopped on send error"
            );
            return Err(error);
        }
    }

    tracing::debug!(lines = plan.len(), "reply delivered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MessagingError;
    use crate::messaging::traits::InboundStream;

    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(Duration, String)>>,
        fail_on: Option<usize>,
        started: Mutex<Option<tokio::time::Instant>>,
    }

    impl Messaging for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        async fn start(&self) -> crate::Result<InboundStream> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn join(&self, _channels: &[String]) -> crate::Result<()> {
            Ok(())
        }

        async fn send(&self, channel: &str, text: &str) -> crate::Result<()> {
            let now = tokio::time::Instant::now();
            let started = *self.started.lock().get_or_insert(now);
            let mut sent = self.sent.lock();
            if self.fail_on == Some(sent.len()) {
                return Err(MessagingError::SendFailed {
                    channel: channel.into(),
                    reason: "rate limited".into(),
                }
                .into());
            }
            sent.push((now - started, text.to_string()));
            Ok(())
        }

        async fn health_check(&self) -> crate::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn long_text_is_split_with_growing_delays() {
        let text = "a".repeat(1000);
        let plan = plan("chan", &text, 399, Duration::from_millis(1000));

        let lengths: Vec<usize> = plan.iter().map(|m| m.text.chars().count()).collect();
        assert_eq!(lengths, vec![399, 399, 202]);

        let delays: Vec<Duration> = plan.iter().map(|m| m.delay).collect();
        assert_eq!(
            delays,
            vec![
                Duration::ZERO,
                Duration::from_millis(1000),
                Duration::from_millis(2000)
            ]
        );

        let joined: String = plan.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(joined, text);
    }

    #[test]
    fn short_text_is_one_immediate_message() {
        let plan = plan("chan", "  hello there  ", 399, Duration::from_secs(1));
        assert_eq!(
            plan.messages(),
            &[PlannedMessage {
                channel: "chan".into(),
                text: "hello there".into(),
                delay: Duration::ZERO,
            }]
        );
    }

    #[test]
    fn prefers_newline_then_whitespace() {
        let chunks = split_message("first line\nsecond part here", 20);
        assert_eq!(chunks, vec!["first line", "second part here"]);

        let chunks = split_message("one two three four", 9);
        assert_eq!(chunks, vec!["one two", "three", "four"]);
    }

    #[test]
    fn cuts_exactly_at_a_following_space() {
        let chunks = split_message("abcde fghij", 5);
        assert_eq!(chunks, vec!["abcde", "fghij"]);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "ğüşöçı".repeat(10);
        let chunks = split_message(&text, 7);

        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 7));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn no_empty_segments() {
        assert!(plan("chan", "", 399, Duration::from_secs(1)).is_empty());
        assert!(plan("chan", " \n\t ", 399, Duration::from_secs(1)).is_empty());

        let chunks = split_message("word     \n\n\n     word", 4);
        assert_eq!(chunks, vec!["word", "word"]);
    }

    #[tokio::test(start_paused = true)]
    async fn deliver_paces_messages() {
        let transport = RecordingTransport::default();
        let plan = plan("chan", &"b".repeat(30), 10, Duration::from_secs(1));

        deliver(&transport, &plan).await.expect("delivers");

        let sent = transport.sent.lock();
        let offsets: Vec<Duration> = sent.iter().map(|(offset, _)| *offset).collect();
        assert_eq!(
            offsets,
            vec![Duration::ZERO, Duration::from_secs(1), Duration::from_secs(2)]
        );
        assert!(sent.iter().all(|(_, text)| text == &"b".repeat(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn deliver_stops_at_first_error() {
        let transport = RecordingTransport {
            fail_on: Some(1),
            ..Default::default()
        };
        let plan = plan("chan", &"c".repeat(30), 10, Duration::from_secs(1));

        let error = deliver(&transport, &plan).await.expect_err("second send fails");
        assert!(error.to_string().contains("rate limited"));
        assert_eq!(transport.sent.lock().len(), 1);
    }
}
