//! Provider adapters.
//!
//! A uniform `generate` / `stream` capability over chat-completion-shaped
//! endpoints. Adapters translate message shapes, classify failures into
//! the canonical error classes, and never retry internally. Retry and
//! failover belong to the router.

pub mod chat;
pub mod embedding;
pub mod errors;
pub mod resilient;

use aide_types::prelude::{
    GenerationParams, Message, ProviderError, TerminalReason, TokenUsage,
};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Rough chars-per-token ratio used for admission estimates before the
/// real usage comes back.
const TOKEN_ESTIMATION_FACTOR: f64 = 4.0;

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// A single reply from a provider endpoint.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    pub terminal_reason: TerminalReason,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Logical provider name from the configuration.
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Cheap availability check: credential presence, plus a fast
    /// liveness probe for local endpoints only.
    async fn is_available(&self) -> bool;

    async fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<ProviderReply, ProviderError>;

    /// Lazy token sequence; yields text fragments until the endpoint
    /// signals termination.
    async fn stream(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<TokenStream, ProviderError>;
}

/// Estimate the token cost of a request for rate-limit admission.
pub fn estimate_tokens(messages: &[Message]) -> u64 {
    let chars: usize = messages.iter().map(|m| m.content.len()).sum();
    (chars as f64 / TOKEN_ESTIMATION_FACTOR).ceil() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_scales_with_content_length() {
        assert_eq!(estimate_tokens(&[]), 0);
        assert_eq!(estimate_tokens(&[Message::user("abcd")]), 1);
        assert_eq!(
            estimate_tokens(&[Message::user("abcd"), Message::system("efgh")]),
            2
        );
        assert_eq!(estimate_tokens(&[Message::user("abcde")]), 2);
    }
}
