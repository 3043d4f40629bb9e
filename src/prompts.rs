//! Prompt templates rendered with minijinja.

use crate::error::LlmError;

use minijinja::{Environment, context};

const ATTRIBUTION: &str = "Message from user {{ username }}: {{ text }}";

const LANGUAGE_DETECTION: &str = "Identify the language of the chat message you receive. \
     Reply with only the name of the language in English, nothing else.";

const LANGUAGE_INSTRUCTION: &str = "Respond in {{ language }}.";

/// Longest plausible language name; anything longer is a model ramble.
const MAX_LANGUAGE_CHARS: usize = 32;

/// Renders the small fixed prompts the engine needs.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self, LlmError> {
        let mut env = Environment::new();
        env.add_template("attribution", ATTRIBUTION)?;
        env.add_template("language_instruction", LANGUAGE_INSTRUCTION)?;
        Ok(Self { env })
    }

    /// Prefix a chat message with its author.
    pub fn render_attribution(&self, username: &str, text: &str) -> Result<String, LlmError> {
        let template = self.env.get_template("attribution")?;
        Ok(template.render(context! { username => username, text => text })?)
    }

    /// System prompt for the language detection sub-call.
    pub fn language_detection(&self) -> &'static str {
        LANGUAGE_DETECTION
    }

    pub fn render_language_instruction(&self, language: &str) -> Result<String, LlmError> {
        let template = self.env.get_template("language_instruction")?;
        Ok(template.render(context! { language => language })?)
    }
}

/// Reduce a detection reply to a bare language name, or `None` if the
/// reply does not look like one.
pub fn sanitize_language(raw: &str) -> Option<String> {
    let line = raw.lines().next()?.trim();
    let name = line.trim_end_matches(['.', '!']).trim();

    let plausible = !name.is_empty()
        && name.chars().count() <= MAX_LANGUAGE_CHARS
        && name
            .chars()
            .all(|c| c.is_alphabetic() || c == ' ' || c == '-' || c == '(' || c == ')');

    plausible.then(|| name.to_string())
}
