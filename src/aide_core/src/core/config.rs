//! Configuration surface for the core.
//!
//! A single structured document enumerating providers, cache settings,
//! router policy, executor bounds and monitor thresholds. Credentials are
//! resolved from the environment via `api_key_env`, never stored inline.

use aide_types::prelude::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantConfig {
    /// Vocative name stripped by the canonicalizer.
    #[serde(default = "default_assistant_name")]
    pub assistant_name: String,
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Logical name referenced by the task-preference table
    /// ("fast-remote", "high-context-remote", "local").
    pub name: String,
    /// Chat-completion-shaped endpoint base URL.
    pub endpoint: String,
    /// Environment variable holding the bearer credential. Local
    /// endpoints may omit it.
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_requests_per_window")]
    pub max_requests_per_window: u32,
    #[serde(default = "default_max_tokens_per_window")]
    pub max_tokens_per_window: u64,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Referrer-identity headers some aggregator endpoints require.
    #[serde(default)]
    pub referrer: Option<ReferrerIdentity>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReferrerIdentity {
    pub site_url: String,
    pub site_name: String,
}

impl ProviderConfig {
    /// Local endpoints get a fast liveness probe instead of a credential
    /// check.
    pub fn is_local_endpoint(&self) -> bool {
        let endpoint = self.endpoint.to_lowercase();
        endpoint.contains("localhost") || endpoint.contains("127.0.0.1")
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_l1_capacity")]
    pub l1_capacity: usize,
    /// Path to the SQLite store; omit to run without L2.
    #[serde(default)]
    pub l2_path: Option<PathBuf>,
    #[serde(default = "default_l2_max_entries")]
    pub l2_max_entries: u64,
    #[serde(default = "default_l2_cleanup_interval_secs")]
    pub l2_cleanup_interval_secs: u64,
    #[serde(default)]
    pub semantic_enabled: bool,
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f32,
    #[serde(default = "default_semantic_capacity")]
    pub semantic_capacity: usize,
    /// Configured provider whose endpoint and credential serve the
    /// embedding calls.
    #[serde(default)]
    pub semantic_provider: Option<String>,
    #[serde(default = "default_semantic_model")]
    pub semantic_model: String,
    #[serde(default = "default_true")]
    pub templates_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            l1_capacity: default_l1_capacity(),
            l2_path: None,
            l2_max_entries: default_l2_max_entries(),
            l2_cleanup_interval_secs: default_l2_cleanup_interval_secs(),
            semantic_enabled: false,
            semantic_threshold: default_semantic_threshold(),
            semantic_capacity: default_semantic_capacity(),
            semantic_provider: None,
            semantic_model: default_semantic_model(),
            templates_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct RouterConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    /// Consecutive failures before a provider is marked unavailable.
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
            max_failures: default_max_failures(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_thread_pool_size")]
    pub thread_pool_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            max_parallel: default_max_parallel(),
            thread_pool_size: default_thread_pool_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct MonitorConfig {
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    #[serde(default = "default_gc_threshold_mb")]
    pub gc_threshold_mb: u64,
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            sample_interval_secs: default_sample_interval_secs(),
            history_size: default_history_size(),
            gc_threshold_mb: default_gc_threshold_mb(),
            max_memory_mb: default_max_memory_mb(),
        }
    }
}

impl AssistantConfig {
    pub fn load(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: AssistantConfig = serde_json::from_str(&raw)
            .map_err(|e| CoreError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.providers.is_empty() {
            return Err(CoreError::Config("no providers configured".to_string()));
        }
        let mut seen = std::collections::HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(CoreError::Config("provider with empty name".to_string()));
            }
            if !seen.insert(provider.name.as_str()) {
                return Err(CoreError::Config(format!(
                    "duplicate provider name: {}",
                    provider.name
                )));
            }
            if provider.endpoint.trim().is_empty() {
                return Err(CoreError::Config(format!(
                    "provider {} has an empty endpoint",
                    provider.name
                )));
            }
        }
        if let Some(name) = &self.cache.semantic_provider {
            if !self.providers.iter().any(|p| &p.name == name) {
                return Err(CoreError::Config(format!(
                    "semantic_provider {} is not a configured provider",
                    name
                )));
            }
        }
        Ok(())
    }
}

fn default_assistant_name() -> String {
    "aide".to_string()
}
fn default_true() -> bool {
    true
}
fn default_provider_timeout_secs() -> u64 {
    30
}
fn default_max_requests_per_window() -> u32 {
    1000
}
fn default_max_tokens_per_window() -> u64 {
    100_000
}
fn default_window_secs() -> u64 {
    60
}
fn default_l1_capacity() -> usize {
    100
}
fn default_l2_max_entries() -> u64 {
    10_000
}
fn default_l2_cleanup_interval_secs() -> u64 {
    3600
}
fn default_semantic_threshold() -> f32 {
    0.92
}
fn default_semantic_capacity() -> usize {
    1000
}
fn default_semantic_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_backoff_ms() -> u64 {
    1000
}
fn default_max_failures() -> u32 {
    3
}
fn default_deadline_secs() -> u64 {
    30
}
fn default_max_parallel() -> usize {
    5
}
fn default_thread_pool_size() -> usize {
    4
}
fn default_sample_interval_secs() -> u64 {
    10
}
fn default_history_size() -> usize {
    100
}
fn default_gc_threshold_mb() -> u64 {
    512
}
fn default_max_memory_mb() -> u64 {
    1024
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_json() -> &'static str {
        r#"{
            "providers": [
                {
                    "name": "fast-remote",
                    "endpoint": "https://api.groq.com/openai/v1",
                    "api_key_env": "FAST_REMOTE_API_KEY",
                    "model": "llama-3.3-70b-versatile"
                }
            ]
        }"#
    }

    #[test]
    fn minimal_document_fills_defaults() {
        let config: AssistantConfig = serde_json::from_str(minimal_json()).expect("parse");
        config.validate().expect("valid");
        assert_eq!(config.assistant_name, "aide");
        assert_eq!(config.cache.l1_capacity, 100);
        assert_eq!(config.router.max_retries, 3);
        assert_eq!(config.executor.max_parallel, 5);
        assert_eq!(config.monitor.gc_threshold_mb, 512);
        assert_eq!(config.providers[0].window_secs, 60);
    }

    #[test]
    fn empty_provider_list_is_a_config_error() {
        let config: AssistantConfig =
            serde_json::from_str(r#"{"providers": []}"#).expect("parse");
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_provider_names_are_rejected() {
        let json = r#"{
            "providers": [
                {"name": "a", "endpoint": "https://x", "model": "m"},
                {"name": "a", "endpoint": "https://y", "model": "m"}
            ]
        }"#;
        let config: AssistantConfig = serde_json::from_str(json).expect("parse");
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_semantic_provider_is_rejected() {
        let json = r#"{
            "providers": [{"name": "a", "endpoint": "https://x", "model": "m"}],
            "cache": {"semantic_enabled": true, "semantic_provider": "missing"}
        }"#;
        let config: AssistantConfig = serde_json::from_str(json).expect("parse");
        assert!(config.validate().is_err());
    }

    #[test]
    fn local_endpoint_detection() {
        let provider = ProviderConfig {
            name: "local".into(),
            endpoint: "http://localhost:11434/v1".into(),
            api_key_env: None,
            model: "llama3.2".into(),
            temperature: None,
            max_output_tokens: None,
            timeout_secs: 60,
            max_requests_per_window: 1000,
            max_tokens_per_window: 100_000,
            window_secs: 60,
            referrer: None,
        };
        assert!(provider.is_local_endpoint());
    }
}
