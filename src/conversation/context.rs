//! Context assembly: persona + language hint + recent window + new user turn.

use crate::conversation::store::Turn;

/// Build the message list for one model call.
///
/// The language hint only lives in this prompt; it never reaches the store.
pub fn build_prompt<'a>(
    persona: &str,
    language_hint: Option<&str>,
    window: impl Iterator<Item = &'a Turn>,
    user_text: &str,
) -> Vec<Turn> {
    let system = match language_hint {
        Some(hint) if !hint.trim().is_empty() => format!("{persona}\n\n{hint}"),
        _ => persona.to_string(),
    };

    let mut messages = vec![Turn::system(system)];
    messages.extend(window.cloned());
    messages.push(Turn::user(user_text));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ConversationStore, Role};

    #[test]
    fn prompt_is_persona_window_then_user() {
        let mut store = ConversationStore::new("be a pirate", 5);
        store.append_user("hi").expect("append");
        store.append_assistant("ahoy").expect("append");
        store.append_user("how are you").expect("append");
        store.append_assistant("shipshape").expect("append");

        let prompt = build_prompt(store.persona(), None, store.recent_window(2), "next?");

        let roles: Vec<Role> = prompt.iter().map(Turn::role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(prompt[0].content(), "be a pirate");
        assert_eq!(prompt[1].content(), "how are you");
        assert_eq!(prompt[3].content(), "next?");
    }

    #[test]
    fn language_hint_is_folded_into_system_turn() {
        let store = ConversationStore::new("be a pirate", 5);

        let prompt = build_prompt(
            store.persona(),
            Some("Respond in Turkish."),
            store.recent_window(4),
            "merhaba",
        );

        assert_eq!(prompt.len(), 2);
        assert_eq!(prompt[0].content(), "be a pirate\n\nRespond in Turkish.");
        assert_eq!(store.persona(), "be a pirate");
    }
}
