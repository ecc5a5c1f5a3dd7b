//! Chat-completion adapter.
//!
//! One adapter covers every configured endpoint that speaks the
//! chat-completion protocol: hosted providers differ only in credential,
//! base URL, token-limit field naming and referrer headers, all of which
//! come from `ProviderConfig`. Local endpoints get a liveness probe
//! instead of a credential check.

use crate::clients::errors::map_openai_error;
use crate::clients::resilient::{ResilientChatChunk, ResilientChatCompletion};
use crate::clients::{ProviderAdapter, ProviderReply, TokenStream};
use crate::core::config::ProviderConfig;
use aide_types::prelude::{
    GenerationParams, Message, ProviderError, ProviderErrorKind, Role, TerminalReason, TokenUsage,
};
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

const LIVENESS_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Standard request plus provider-specific extra fields, serialized flat.
#[derive(Serialize, Debug, Clone)]
pub struct ExtendedChatCompletionRequest {
    #[serde(flatten)]
    pub standard_request: CreateChatCompletionRequest,
    #[serde(flatten)]
    pub extra_fields: HashMap<String, Value>,
}

pub struct ChatCompletionAdapter {
    name: String,
    model: String,
    endpoint: String,
    client: Client<OpenAIConfig>,
    probe: reqwest::Client,
    has_credential: bool,
    local: bool,
    use_max_tokens: bool,
    default_temperature: Option<f32>,
    default_max_tokens: Option<u32>,
    default_timeout: Duration,
}

/// Endpoints outside the `max_completion_tokens` family take the older
/// `max_tokens` field. Detection follows the endpoint URL.
fn endpoint_uses_max_tokens(endpoint: &str) -> bool {
    let endpoint = endpoint.to_lowercase();
    !(endpoint.contains("api.openai.com") || endpoint.contains("groq"))
}

impl ChatCompletionAdapter {
    pub fn from_config(config: &ProviderConfig) -> Self {
        let api_key = config.api_key();
        let has_credential = api_key.is_some();

        let openai_config = OpenAIConfig::new()
            .with_api_base(config.endpoint.trim_end_matches('/'))
            .with_api_key(api_key.unwrap_or_default());

        let client = match &config.referrer {
            Some(referrer) => {
                let mut headers = reqwest::header::HeaderMap::new();
                if let Ok(value) = referrer.site_url.parse() {
                    headers.insert("HTTP-Referer", value);
                }
                if let Ok(value) = referrer.site_name.parse() {
                    headers.insert("X-Title", value);
                }
                let http_client = reqwest::Client::builder()
                    .default_headers(headers)
                    .build()
                    .unwrap_or_default();
                Client::with_config(openai_config).with_http_client(http_client)
            }
            None => Client::with_config(openai_config),
        };

        info!(
            provider = %config.name,
            endpoint = %config.endpoint,
            model = %config.model,
            local = config.is_local_endpoint(),
            "Configured chat-completion adapter"
        );

        ChatCompletionAdapter {
            name: config.name.clone(),
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client,
            probe: reqwest::Client::new(),
            has_credential,
            local: config.is_local_endpoint(),
            use_max_tokens: endpoint_uses_max_tokens(&config.endpoint),
            default_temperature: config.temperature,
            default_max_tokens: config.max_output_tokens,
            default_timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn build_request(
        &self,
        messages: &[Message],
        params: &GenerationParams,
        stream: bool,
    ) -> Result<ExtendedChatCompletionRequest, ProviderError> {
        let converted = convert_messages(messages).map_err(|e| map_openai_error(&self.name, e))?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(converted);
        if let Some(temperature) = params.temperature.or(self.default_temperature) {
            args.temperature(temperature);
        }

        let mut extra_fields = HashMap::new();
        if let Some(max_tokens) = params.max_output_tokens.or(self.default_max_tokens) {
            if self.use_max_tokens {
                extra_fields.insert("max_tokens".to_string(), Value::from(max_tokens));
            } else {
                args.max_completion_tokens(max_tokens);
            }
        }
        if stream {
            args.stream(true);
            if !self.use_max_tokens {
                extra_fields.insert(
                    "stream_options".to_string(),
                    serde_json::json!({"include_usage": true}),
                );
            }
        }

        let standard_request = args.build().map_err(|e| map_openai_error(&self.name, e))?;
        Ok(ExtendedChatCompletionRequest {
            standard_request,
            extra_fields,
        })
    }

    fn call_timeout(&self, params: &GenerationParams) -> Duration {
        params
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
    }
}

#[async_trait]
impl ProviderAdapter for ChatCompletionAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn is_available(&self) -> bool {
        if !self.local {
            return self.has_credential;
        }
        let probe_url = format!("{}/models", self.endpoint);
        match self
            .probe
            .get(&probe_url)
            .timeout(LIVENESS_PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<ProviderReply, ProviderError> {
        let request = self.build_request(messages, params, false)?;
        debug!(provider = %self.name, "Dispatching chat completion");

        let chat = self.client.chat();
        let call = chat
            .create_byot::<ExtendedChatCompletionRequest, ResilientChatCompletion>(request);
        let response = tokio::time::timeout(self.call_timeout(params), call)
            .await
            .map_err(|_| {
                ProviderError::new(
                    &self.name,
                    ProviderErrorKind::Timeout,
                    "provider call exceeded its deadline",
                )
            })?
            .map_err(|e| map_openai_error(&self.name, e))?;

        let choice = response.choices.into_iter().next();
        let (content, finish_reason) = match choice {
            Some(choice) => (
                choice.message.content.unwrap_or_default(),
                choice.finish_reason,
            ),
            None => (String::new(), None),
        };

        Ok(ProviderReply {
            content,
            model: response.model.unwrap_or_else(|| self.model.clone()),
            usage: response.usage.map(TokenUsage::from),
            terminal_reason: parse_terminal_reason(finish_reason.as_deref()),
        })
    }

    async fn stream(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<TokenStream, ProviderError> {
        let request = self.build_request(messages, params, true)?;
        debug!(provider = %self.name, "Opening chat completion stream");

        let chat = self.client.chat();
        let open = chat
            .create_stream_byot::<ExtendedChatCompletionRequest, ResilientChatChunk>(request);
        let stream = tokio::time::timeout(self.call_timeout(params), open)
            .await
            .map_err(|_| {
                ProviderError::new(
                    &self.name,
                    ProviderErrorKind::Timeout,
                    "stream initialization exceeded its deadline",
                )
            })?
            .map_err(|e| map_openai_error(&self.name, e))?;

        let provider = self.name.clone();
        let mapped = stream.filter_map(move |chunk| {
            let provider = provider.clone();
            async move {
                match chunk {
                    Ok(chunk) => {
                        let fragment: String = chunk
                            .choices
                            .into_iter()
                            .filter_map(|choice| choice.delta.content)
                            .collect();
                        if fragment.is_empty() {
                            None
                        } else {
                            Some(Ok(fragment))
                        }
                    }
                    Err(e) => Some(Err(map_openai_error(&provider, e))),
                }
            }
        });
        Ok(Box::pin(mapped))
    }
}

fn convert_messages(
    messages: &[Message],
) -> Result<Vec<ChatCompletionRequestMessage>, async_openai::error::OpenAIError> {
    let mut converted = Vec::with_capacity(messages.len());
    for message in messages {
        let chat_message = match message.role {
            Role::System => ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(message.content.as_str())
                    .build()?,
            ),
            Role::User => ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content.as_str())
                    .build()?,
            ),
            Role::Assistant => ChatCompletionRequestMessage::Assistant(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(message.content.as_str())
                    .build()?,
            ),
        };
        converted.push(chat_message);
    }
    Ok(converted)
}

fn parse_terminal_reason(finish_reason: Option<&str>) -> TerminalReason {
    match finish_reason {
        Some("length") => TerminalReason::Length,
        _ => TerminalReason::Complete,
    }
}
