//! Relaxed wire types for chat-completion endpoints.
//!
//! Endpoints that speak the chat-completion shape differ in the optional
//! fields they attach. These types use `#[serde(default)]` liberally and
//! keep finish reasons as strings so one provider's extension never
//! aborts parsing of another's reply.

use aide_types::prelude::TokenUsage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One streamed SSE chunk.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResilientChatChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ResilientStreamChoice>,
    #[serde(default)]
    pub usage: Option<ResilientUsage>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResilientStreamChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ResilientDelta,
    /// Kept as a string: providers emit values outside the standard set.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ResilientDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    /// Chain-of-thought text some hosts interleave; ignored downstream.
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

/// A non-streaming chat completion.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResilientChatCompletion {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ResilientCompletionChoice>,
    #[serde(default)]
    pub usage: Option<ResilientUsage>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResilientCompletionChoice {
    #[serde(default)]
    pub index: u32,
    pub message: ResilientCompletionMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ResilientCompletionMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResilientUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    /// Providers attach cached-token and timing breakdowns here; tolerated
    /// but unused.
    #[serde(default)]
    pub prompt_tokens_details: Option<Value>,
    #[serde(default)]
    pub completion_tokens_details: Option<Value>,
}

impl From<ResilientUsage> for TokenUsage {
    fn from(val: ResilientUsage) -> Self {
        TokenUsage {
            prompt_tokens: val.prompt_tokens,
            completion_tokens: val.completion_tokens,
            total_tokens: val.total_tokens,
        }
    }
}

/// Error body variants seen across chat-completion hosts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ProviderErrorBody {
    Standard { error: StandardErrorDetail },
    Simple { detail: String },
}

#[derive(Debug, Deserialize)]
pub struct StandardErrorDetail {
    pub message: String,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub code: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_with_extension_fields_still_parses() {
        let raw = r#"{
            "id": "cmpl-1",
            "object": "chat.completion.chunk",
            "created": 1,
            "model": "m",
            "system_fingerprint": "fp",
            "x_host": {"queue_time": 0.01},
            "choices": [{
                "index": 0,
                "delta": {"content": "Hi", "reasoning_content": "thinking"},
                "finish_reason": null,
                "logprobs": null
            }]
        }"#;
        let chunk: ResilientChatChunk = serde_json::from_str(raw).expect("parse");
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hi"));
    }

    #[test]
    fn nonstandard_finish_reason_is_tolerated() {
        let raw = r#"{"choices": [{"index": 0, "delta": {}, "finish_reason": "eos_token"}]}"#;
        let chunk: ResilientChatChunk = serde_json::from_str(raw).expect("parse");
        assert_eq!(chunk.choices[0].finish_reason.as_deref(), Some("eos_token"));
    }

    #[test]
    fn usage_breakdown_fields_are_tolerated() {
        let raw = r#"{
            "choices": [],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 5,
                "total_tokens": 15,
                "prompt_tokens_details": {"cached_tokens": 4}
            }
        }"#;
        let completion: ResilientChatCompletion = serde_json::from_str(raw).expect("parse");
        let usage = TokenUsage::from(completion.usage.expect("usage"));
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn error_bodies_parse_both_shapes() {
        let standard: ProviderErrorBody =
            serde_json::from_str(r#"{"error": {"message": "bad key", "code": 401}}"#)
                .expect("standard");
        assert!(matches!(standard, ProviderErrorBody::Standard { .. }));

        let simple: ProviderErrorBody =
            serde_json::from_str(r#"{"detail": "not found"}"#).expect("simple");
        assert!(matches!(simple, ProviderErrorBody::Simple { .. }));
    }
}
