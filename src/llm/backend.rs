//! The model backend seam used by the engine.

use crate::conversation::Turn;
use crate::error::LlmError;

use async_trait::async_trait;
use serde::Serialize;

/// Decoding parameters passed through to the provider unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompletionParams {
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    /// Hard ceiling on generated tokens.
    pub max_tokens: u32,
}

impl CompletionParams {
    /// Deterministic, tiny-budget parameters for classification sub-calls.
    pub fn classification(max_tokens: u32) -> Self {
        Self {
            temperature: 0.0,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            max_tokens,
        }
    }
}

/// A text-completion backend.
///
/// `Ok(None)` means the provider answered but produced no text; the engine
/// treats that as an empty reply rather than a failure.
#[async_trait]
pub trait ModelBackend: Send + Sync + 'static {
    /// Short label for logs.
    fn name(&self) -> &str;

    async fn complete(
        &self,
        messages: &[Turn],
        params: &CompletionParams,
    ) -> Result<Option<String>, LlmError>;
}
