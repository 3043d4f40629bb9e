//! Interaction classifier: decides what an inbound chat event is.

use crate::InboundEvent;

use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng as _};

/// What the engine should do with an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    /// Sent by the bot itself. Always ignored.
    SelfEcho,
    /// Explicit command; `name` is the matched configured token.
    Command { name: String, args: String },
    /// Plain chat that may get a spontaneous reply.
    SpontaneousCandidate(String),
    /// Nothing to do (empty text, unknown `!`/`/` command).
    Ignored,
}

/// Classify an event against the bot's username and command tokens.
/// Tokens are expected lowercased; matching is case-insensitive and the
/// longest matching token wins.
pub fn classify(event: &InboundEvent, bot_username: &str, command_tokens: &[String]) -> Interaction {
    if event.user.is_self || event.user.name.eq_ignore_ascii_case(bot_username) {
        return Interaction::SelfEcho;
    }

    let text = event.text.trim();
    if text.is_empty() {
        return Interaction::Ignored;
    }

    let matched = command_tokens
        .iter()
        .filter(|token| !token.is_empty())
        .filter_map(|token| strip_token(text, token).map(|rest| (token, rest)))
        .max_by_key(|(token, _)| token.chars().count());

    if let Some((token, rest)) = matched {
        return Interaction::Command {
            name: token.clone(),
            args: rest.trim().to_string(),
        };
    }

    if text.starts_with('!') || text.starts_with('/') {
        return Interaction::Ignored;
    }

    Interaction::SpontaneousCandidate(text.to_string())
}

/// Strip `token` from the front of `text`, comparing lowercased chars.
/// Lowercasing may change a char's UTF-8 length, so byte offsets of the
/// token cannot be used to slice `text`.
fn strip_token<'a>(text: &'a str, token: &str) -> Option<&'a str> {
    let mut wanted = token.chars().flat_map(char::to_lowercase).peekable();

    for (index, character) in text.char_indices() {
        if wanted.peek().is_none() {
            return Some(&text[index..]);
        }
        for lowered in character.to_lowercase() {
            if wanted.next() != Some(lowered) {
                return None;
            }
        }
    }

    wanted.peek().is_none().then_some(&text[text.len()..])
}

/// Weighted coin for spontaneous interjections. Every draw is independent.
#[derive(Debug)]
pub struct InterjectionSampler {
    rng: StdRng,
}

impl InterjectionSampler {
    pub fn from_os_rng() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Reproducible sampler for tests and replays.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw from `[0, 100)`; interject iff the draw is below `percent`.
    pub fn should_interject(&mut self, percent: u8) -> bool {
        let draw: u8 = self.rng.random_range(0..100);
        draw < percent
    }
}

impl Default for InterjectionSampler {
    fn default() -> Self {
        Self::from_os_rng()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChatUser;

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|token| token.to_string()).collect()
    }

    fn event_from(user: &str, text: &str) -> InboundEvent {
        InboundEvent::new("somechannel", ChatUser::new(user), text)
    }

    #[test]
    fn command_with_arguments() {
        let interaction = classify(&event_from("viewer", "!gpt hello"), "bot", &tokens(&["!gpt"]));
        assert_eq!(
            interaction,
            Interaction::Command {
                name: "!gpt".into(),
                args: "hello".into()
            }
        );
    }

    #[test]
    fn command_match_handles_non_ascii_case_folding() {
        // 'İ' lowercases to two chars and changes UTF-8 length.
        let interaction = classify(
            &event_from("viewer", "!İSTE bir şey"),
            "bot",
            &tokens(&["!i̇ste"]),
        );
        assert_eq!(
            interaction,
            Interaction::Command {
                name: "!i̇ste".into(),
                args: "bir şey".into()
            }
        );
    }

    #[test]
    fn partial_token_is_not_a_command() {
        let interaction = classify(&event_from("viewer", "!gp"), "bot", &tokens(&["!gpt"]));
        assert_eq!(interaction, Interaction::Ignored);
    }

    #[test]
    fn command_match_is_case_insensitive() {
        let interaction = classify(
            &event_from("viewer", "!GPT   what's up  "),
            "bot",
            &tokens(&["!gpt"]),
        );
        assert_eq!(
            interaction,
            Interaction::Command {
                name: "!gpt".into(),
                args: "what's up".into()
            }
        );
    }

    #[test]
    fn longest_token_wins() {
        let interaction = classify(
            &event_from("viewer", "!gpt4 tell me"),
            "bot",
            &tokens(&["!gpt", "!gpt4"]),
        );
        assert_eq!(
            interaction,
            Interaction::Command {
                name: "!gpt4".into(),
                args: "tell me".into()
            }
        );
    }

    #[test]
    fn plain_text_is_a_candidate() {
        let interaction = classify(&event_from("viewer", "hello"), "bot", &tokens(&["!gpt"]));
        assert_eq!(interaction, Interaction::SpontaneousCandidate("hello".into()));
    }

    #[test]
    fn own_messages_are_self_echo() {
        let by_name = classify(&event_from("RelayBot", "!gpt hello"), "relaybot", &tokens(&["!gpt"]));
        assert_eq!(by_name, Interaction::SelfEcho);

        let mut flagged = event_from("someone", "hello");
        flagged.user.is_self = true;
        assert_eq!(classify(&flagged, "relaybot", &tokens(&["!gpt"])), Interaction::SelfEcho);
    }

    #[test]
    fn unknown_commands_and_blank_text_are_ignored() {
        let command_tokens = tokens(&["!gpt"]);
        assert_eq!(
            classify(&event_from("viewer", "!uptime"), "bot", &command_tokens),
            Interaction::Ignored
        );
        assert_eq!(
            classify(&event_from("viewer", "/me dances"), "bot", &command_tokens),
            Interaction::Ignored
        );
        assert_eq!(
            classify(&event_from("viewer", "   "), "bot", &command_tokens),
            Interaction::Ignored
        );
    }

    #[test]
    fn non_ascii_text_does_not_panic() {
        let interaction = classify(&event_from("viewer", "ğü"), "bot", &tokens(&["!gpt"]));
        assert_eq!(interaction, Interaction::SpontaneousCandidate("ğü".into()));
    }

    #[test]
    fn zero_percent_never_interjects() {
        let mut sampler = InterjectionSampler::seeded(7);
        assert!((0..1_000).all(|_| !sampler.should_interject(0)));
    }

    #[test]
    fn hundred_percent_always_interjects() {
        let mut sampler = InterjectionSampler::seeded(7);
        assert!((0..1_000).all(|_| sampler.should_interject(100)));
    }

    #[test]
    fn fifty_percent_is_roughly_half() {
        let mut sampler = InterjectionSampler::seeded(42);
        let hits = (0..1_000).filter(|_| sampler.should_interject(50)).count();
        assert!((400..=600).contains(&hits), "got {hits} hits");
    }
}
