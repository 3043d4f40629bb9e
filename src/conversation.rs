//! Conversation history and prompt context.

pub mod context;
pub mod store;

pub use context::build_prompt;
pub use store::{ConversationStore, Role, Turn};
