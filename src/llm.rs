//! LLM backend abstraction and the OpenAI-compatible provider.

pub mod backend;
pub mod openai;

pub use backend::{CompletionParams, ModelBackend};
pub use openai::OpenAiBackend;
