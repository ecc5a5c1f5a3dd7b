//! The assistant core: a single composition root built at startup.
//!
//! Wires the cache tiers, provider adapters, router, streaming
//! coordinator, parallel executor and resource monitor together and
//! exposes the inbound API collaborators call: `generate`, `stream`,
//! `parallel`, `invalidate`, `status` and `reset_provider`.

use crate::cache::semantic::EmbeddingBackend;
use crate::cache::IntelligentCache;
use crate::clients::chat::ChatCompletionAdapter;
use crate::clients::embedding::RemoteEmbeddingBackend;
use crate::clients::{ProviderAdapter, TokenStream};
use crate::core::config::AssistantConfig;
use crate::core::metrics::Metrics;
use crate::exec::parallel::BoxedTask;
use crate::exec::{ParallelExecutor, ResourceMonitor};
use crate::routing::router::StreamHandle;
use crate::routing::{ProviderState, Router};
use crate::streaming::{
    DEFAULT_MIN_SENTENCE_LENGTH, DEFAULT_QUEUE_CAPACITY, InterruptHandle, SentenceConsumer,
    StreamOutcome, StreamingCoordinator,
};
use aide_types::prelude::{
    CacheCategory, CoreResult, Fingerprint, GenerationParams, Message, RequestHints, Response,
    StatusReport, StreamState, TaskType, TerminalReason,
};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::info;

pub struct Assistant {
    cache: Arc<IntelligentCache>,
    router: Arc<Router>,
    executor: Arc<ParallelExecutor>,
    monitor: Arc<ResourceMonitor>,
    metrics: Arc<Metrics>,
}

impl Assistant {
    /// Build the core from configuration. Fails fast on configuration
    /// errors; provider health is discovered at request time.
    pub async fn build(config: AssistantConfig) -> CoreResult<Self> {
        config.validate()?;

        let embedding_backend: Option<Box<dyn EmbeddingBackend>> =
            if config.cache.semantic_enabled {
                config
                    .cache
                    .semantic_provider
                    .as_ref()
                    .and_then(|name| config.providers.iter().find(|p| &p.name == name))
                    .map(|provider| {
                        Box::new(RemoteEmbeddingBackend::from_config(
                            provider,
                            &config.cache.semantic_model,
                        )) as Box<dyn EmbeddingBackend>
                    })
            } else {
                None
            };

        let cache = Arc::new(
            IntelligentCache::build(&config.cache, &config.assistant_name, embedding_backend)
                .await?,
        );

        let providers: Vec<Arc<ProviderState>> = config
            .providers
            .iter()
            .map(|provider_config| {
                let adapter: Arc<dyn ProviderAdapter> =
                    Arc::new(ChatCompletionAdapter::from_config(provider_config));
                Arc::new(ProviderState::new(adapter, provider_config, &config.router))
            })
            .collect();

        let metrics = Arc::new(Metrics::new());
        let router = Arc::new(Router::new(
            providers,
            Arc::clone(&cache),
            config.router,
            Arc::clone(&metrics),
        ));
        let monitor = ResourceMonitor::new(
            config.monitor,
            Arc::clone(&metrics.current_active_requests),
        );
        monitor.start();

        let executor = Arc::new(ParallelExecutor::new(
            config.executor.max_parallel,
            config.executor.thread_pool_size,
        ));

        info!(
            providers = router.providers().len(),
            "Assistant core assembled"
        );
        Ok(Assistant {
            cache,
            router,
            executor,
            monitor,
            metrics,
        })
    }

    /// One-shot generation through the cache and router.
    pub async fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
        hints: &RequestHints,
    ) -> CoreResult<Response> {
        self.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .current_active_requests
            .fetch_add(1, Ordering::Relaxed);

        let result = self.router.generate(messages, params, hints).await;

        self.metrics
            .current_active_requests
            .fetch_sub(1, Ordering::Relaxed);
        match &result {
            Ok(response) => {
                self.metrics
                    .requests_succeeded
                    .fetch_add(1, Ordering::Relaxed);
                if let Some(tokens) = response.tokens_used {
                    self.metrics
                        .tokens_processed
                        .fetch_add(u64::from(tokens), Ordering::Relaxed);
                }
            }
            Err(_) => {
                self.metrics.requests_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Open a streaming session. The returned session exposes the
    /// interrupt handle and is then either driven through the sentence
    /// pipeline (`run`) or consumed as raw fragments (`into_parts`).
    pub async fn stream(
        &self,
        messages: &[Message],
        params: &GenerationParams,
        hints: &RequestHints,
    ) -> CoreResult<StreamSession> {
        self.metrics.streams_total.fetch_add(1, Ordering::Relaxed);
        let StreamHandle {
            provider,
            model,
            task_type,
            cached,
            tokens,
        } = self.router.stream(messages, params, hints).await?;

        let id = uuid::Uuid::new_v4();
        info!(stream_id = %id, provider = %provider, cached, "Stream session opened");
        Ok(StreamSession {
            id,
            provider,
            model,
            task_type,
            cached,
            messages: messages.to_vec(),
            category: hints.category.unwrap_or(CacheCategory::General),
            use_cache: hints.use_cache,
            tokens,
            coordinator: StreamingCoordinator::new(
                DEFAULT_MIN_SENTENCE_LENGTH,
                DEFAULT_QUEUE_CAPACITY,
            ),
            cache: Arc::clone(&self.cache),
        })
    }

    /// Bounded parallel execution of independent tasks; results in
    /// submission order.
    pub async fn parallel<T: Send + 'static>(
        &self,
        tasks: Vec<BoxedTask<T>>,
        timeout: Option<Duration>,
    ) -> Vec<CoreResult<T>> {
        self.metrics
            .parallel_executions_total
            .fetch_add(1, Ordering::Relaxed);
        self.executor.execute(tasks, timeout).await
    }

    pub async fn parallel_prioritized<T: Send + 'static>(
        &self,
        tasks: Vec<(i32, BoxedTask<T>)>,
        timeout: Option<Duration>,
    ) -> Vec<CoreResult<T>> {
        self.metrics
            .parallel_executions_total
            .fetch_add(1, Ordering::Relaxed);
        self.executor.execute_prioritized(tasks, timeout).await
    }

    pub fn cancel_all(&self) {
        self.executor.cancel_all();
    }

    pub fn fingerprint(&self, messages: &[Message]) -> Fingerprint {
        self.cache.fingerprint(messages)
    }

    pub async fn invalidate_fingerprint(&self, fingerprint: &str) -> u64 {
        self.cache.invalidate_fingerprint(fingerprint).await
    }

    pub async fn invalidate_category(&self, category: CacheCategory) -> u64 {
        self.cache.invalidate_category(category).await
    }

    pub async fn clear_cache(&self) -> u64 {
        self.cache.clear_all().await
    }

    pub async fn sweep_cache(&self) -> u64 {
        self.cache.sweep().await
    }

    pub fn register_template(&self, key: &str, response: &str) {
        self.cache.register_template(key, response);
    }

    /// Aggregate, on-demand status over providers, cache and resources.
    pub fn status(&self) -> StatusReport {
        let providers: BTreeMap<String, _> = self
            .router
            .providers()
            .iter()
            .map(|state| (state.adapter.name().to_string(), state.status_view()))
            .collect();
        StatusReport {
            providers,
            cache: self.cache.stats(),
            resources: self.monitor.current(),
        }
    }

    pub fn reset_provider(&self, name: &str) -> bool {
        self.router.reset_provider(name)
    }

    pub fn monitor(&self) -> &Arc<ResourceMonitor> {
        &self.monitor
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn shutdown(&self) {
        self.executor.cancel_all();
        self.monitor.stop();
        info!("Assistant core shut down");
    }
}

/// One open streaming response.
pub struct StreamSession {
    pub id: uuid::Uuid,
    pub provider: String,
    pub model: String,
    pub task_type: TaskType,
    pub cached: bool,
    messages: Vec<Message>,
    category: CacheCategory,
    use_cache: bool,
    tokens: TokenStream,
    coordinator: StreamingCoordinator,
    cache: Arc<IntelligentCache>,
}

impl StreamSession {
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.coordinator.handle()
    }

    pub fn state(&self) -> StreamState {
        self.coordinator.state()
    }

    /// Drive the sentence pipeline to its end. A cleanly completed
    /// stream is written back to the cache like any live response.
    pub async fn run(self, consumer: Option<Arc<dyn SentenceConsumer>>) -> StreamOutcome {
        let outcome = self.coordinator.run(self.tokens, consumer).await;
        info!(
            stream_id = %self.id,
            state = ?outcome.state,
            sentences = outcome.report.total_sentences,
            "Stream session finished"
        );

        if outcome.state == StreamState::Completed && self.use_cache && !self.cached {
            let response = Response {
                content: outcome.full_text.clone(),
                provider: self.provider.clone(),
                model: self.model.clone(),
                tokens_used: None,
                terminal_reason: TerminalReason::Complete,
                task_type: Some(self.task_type),
                cached: false,
                cache_tier: None,
            };
            self.cache
                .put(&self.messages, &response, self.category, None)
                .await;
        }
        outcome
    }

    /// Raw fragment surface for callers that run their own chunking.
    /// Interruption is observed between fragments.
    pub fn into_parts(self) -> (TokenStream, InterruptHandle) {
        let handle = self.coordinator.handle();
        let gate = handle.clone();
        let gated = self
            .tokens
            .take_while(move |_| futures::future::ready(!gate.is_interrupted()));
        (Box::pin(gated), handle)
    }
}
