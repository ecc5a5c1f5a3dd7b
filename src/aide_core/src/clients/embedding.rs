//! Embedding backend for the semantic cache tier.
//!
//! Reuses a configured provider's endpoint and credential to encode text
//! through the embeddings API. Deterministic for a fixed model; the model
//! identifier is stored with every semantic entry so lookups can skip
//! vectors from a different model.

use crate::cache::semantic::EmbeddingBackend;
use crate::clients::errors::map_openai_error;
use crate::core::config::ProviderConfig;
use aide_types::prelude::{ProviderError, ProviderErrorKind};
use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::CreateEmbeddingRequestArgs;
use async_trait::async_trait;

pub struct RemoteEmbeddingBackend {
    provider: String,
    model: String,
    client: Client<OpenAIConfig>,
}

impl RemoteEmbeddingBackend {
    pub fn from_config(provider: &ProviderConfig, model: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_base(provider.endpoint.trim_end_matches('/'))
            .with_api_key(provider.api_key().unwrap_or_default());
        RemoteEmbeddingBackend {
            provider: provider.name.clone(),
            model: model.to_string(),
            client: Client::with_config(config),
        }
    }
}

#[async_trait]
impl EmbeddingBackend for RemoteEmbeddingBackend {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn encode(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(text)
            .build()
            .map_err(|e| map_openai_error(&self.provider, e))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| map_openai_error(&self.provider, e))?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                ProviderError::new(
                    &self.provider,
                    ProviderErrorKind::Invalid,
                    "embedding response carried no data",
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_config(endpoint: &str) -> ProviderConfig {
        // The credential comes from a variable every test process has.
        ProviderConfig {
            name: "fast-remote".into(),
            endpoint: endpoint.to_string(),
            api_key_env: Some("PATH".into()),
            model: "test-model".into(),
            temperature: None,
            max_output_tokens: None,
            timeout_secs: 5,
            max_requests_per_window: 100,
            max_tokens_per_window: 100_000,
            window_secs: 60,
            referrer: None,
        }
    }

    #[tokio::test]
    async fn encode_returns_the_vector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "object": "list",
                "data": [{
                    "object": "embedding",
                    "index": 0,
                    "embedding": [0.25, -0.5, 1.0]
                }],
                "model": "embed-small",
                "usage": {"prompt_tokens": 3, "total_tokens": 3}
            })))
            .mount(&server)
            .await;

        let backend =
            RemoteEmbeddingBackend::from_config(&provider_config(&server.uri()), "embed-small");
        assert_eq!(backend.model_id(), "embed-small");
        let vector = backend.encode("what is the weather").await.expect("vector");
        assert_eq!(vector, vec![0.25, -0.5, 1.0]);
    }

    #[tokio::test]
    async fn empty_data_maps_to_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "object": "list",
                "data": [],
                "model": "embed-small",
                "usage": {"prompt_tokens": 0, "total_tokens": 0}
            })))
            .mount(&server)
            .await;

        let backend =
            RemoteEmbeddingBackend::from_config(&provider_config(&server.uri()), "embed-small");
        let error = backend.encode("anything").await.expect_err("error");
        assert_eq!(error.kind, ProviderErrorKind::Invalid);
        assert_eq!(error.provider, "fast-remote");
    }

    #[tokio::test]
    async fn server_errors_map_to_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "error": {"message": "overloaded", "type": "server_error", "code": "503"}
            })))
            .mount(&server)
            .await;

        let backend =
            RemoteEmbeddingBackend::from_config(&provider_config(&server.uri()), "embed-small");
        let error = backend.encode("anything").await.expect_err("error");
        assert_eq!(error.kind, ProviderErrorKind::Transient);
    }
}
