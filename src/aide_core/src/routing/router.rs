//! Provider selection, retry, failover and cache write-back.
//!
//! The router owns the only failover decision in the system: callers see
//! at most one terminal error per invocation. Selection walks the
//! task-preference table, filtering out providers that are unconfigured,
//! unavailable, inside their backoff deadline, or over quota. Within one
//! candidate, transient failures are retried with exponential backoff;
//! rate-limit and auth failures skip ahead immediately.

use crate::cache::{IntelligentCache, epoch_secs};
use crate::clients::{ProviderAdapter, TokenStream, estimate_tokens};
use crate::core::config::RouterConfig;
use crate::core::metrics::Metrics;
use crate::routing::ProviderState;
use crate::routing::classifier::TaskClassifier;
use crate::routing::ledger::backoff_secs;
use aide_types::prelude::{
    CacheCategory, CoreError, CoreResult, GenerationParams, Message, ProviderError,
    ProviderErrorKind, RequestHints, Response, Role, TaskType, TerminalReason,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Preference order per task type, indexed by ordinal. Loaded once;
/// read-only thereafter. The configured provider set is a strict subset.
static TASK_ROUTING: [&[&str]; 6] = [
    &["fast-remote", "high-context-remote", "local"], // fast-query
    &["high-context-remote", "fast-remote", "local"], // complex-reasoning
    &["fast-remote", "high-context-remote", "local"], // coding
    &["high-context-remote", "fast-remote", "local"], // creative
    &["fast-remote", "high-context-remote", "local"], // conversation
    &["fast-remote", "high-context-remote", "local"], // unknown
];

fn task_ordinal(task: TaskType) -> usize {
    match task {
        TaskType::FastQuery => 0,
        TaskType::ComplexReasoning => 1,
        TaskType::Coding => 2,
        TaskType::Creative => 3,
        TaskType::Conversation => 4,
        TaskType::Unknown => 5,
    }
}

/// An open token stream together with the provenance the caller needs.
pub struct StreamHandle {
    pub provider: String,
    pub model: String,
    pub task_type: TaskType,
    pub cached: bool,
    pub tokens: TokenStream,
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("task_type", &self.task_type)
            .field("cached", &self.cached)
            .finish()
    }
}

pub struct Router {
    providers: Vec<Arc<ProviderState>>,
    by_name: HashMap<String, Arc<ProviderState>>,
    cache: Arc<IntelligentCache>,
    config: RouterConfig,
    metrics: Arc<Metrics>,
}

impl Router {
    pub fn new(
        providers: Vec<Arc<ProviderState>>,
        cache: Arc<IntelligentCache>,
        config: RouterConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        let by_name = providers
            .iter()
            .map(|p| (p.adapter.name().to_string(), Arc::clone(p)))
            .collect();
        Router {
            providers,
            by_name,
            cache,
            config,
            metrics,
        }
    }

    pub fn provider(&self, name: &str) -> Option<&Arc<ProviderState>> {
        self.by_name.get(name)
    }

    pub fn providers(&self) -> &[Arc<ProviderState>] {
        &self.providers
    }

    /// Administrative reinstatement of a provider marked unavailable.
    pub fn reset_provider(&self, name: &str) -> bool {
        match self.by_name.get(name) {
            Some(state) => state.health.reset(),
            None => false,
        }
    }

    /// Generate a response, consulting the cache first and failing over
    /// across providers. The overall deadline bounds the whole invocation.
    pub async fn generate(
        &self,
        messages: &[Message],
        params: &GenerationParams,
        hints: &RequestHints,
    ) -> CoreResult<Response> {
        let deadline = Duration::from_secs(params.timeout_secs.unwrap_or(self.config.deadline_secs));
        match tokio::time::timeout(deadline, self.generate_inner(messages, params, hints)).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Timeout(format!(
                "router deadline of {:?} elapsed",
                deadline
            ))),
        }
    }

    async fn generate_inner(
        &self,
        messages: &[Message],
        params: &GenerationParams,
        hints: &RequestHints,
    ) -> CoreResult<Response> {
        if hints.use_cache {
            if let Some(hit) = self
                .cache
                .get(messages, hints.skip_semantic, hints.category)
                .await
            {
                debug!(tier = ?hit.cache_tier, "Returning cached response");
                return Ok(hit);
            }
        }

        if messages.is_empty() {
            return Err(CoreError::Config(
                "cannot generate from an empty message list".to_string(),
            ));
        }

        let task_type = self.resolve_task(messages, hints);
        let candidates = self.candidate_list(messages, task_type, hints).await;
        if candidates.is_empty() {
            return Err(CoreError::AllProvidersFailed {
                attempted: Vec::new(),
                last: None,
            });
        }

        let estimated_tokens = estimate_tokens(messages);
        let mut attempted = Vec::new();
        let mut last_error = None;

        'providers: for (candidate_index, state) in candidates.into_iter().enumerate() {
            if candidate_index > 0 {
                self.metrics
                    .failovers_total
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            let name = state.adapter.name().to_string();
            attempted.push(name.clone());

            for attempt in 0..self.config.max_retries {
                if attempt > 0 {
                    self.metrics
                        .retries_total
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                }
                debug!(provider = %name, attempt = attempt + 1, "Dispatching generate");
                match state.adapter.generate(messages, params).await {
                    Ok(reply) => {
                        let now = epoch_secs();
                        let tokens = reply
                            .usage
                            .map(|u| u64::from(u.total_tokens))
                            .unwrap_or(estimated_tokens);
                        state.ledger.record(tokens, now);
                        state.record_totals(tokens);
                        state.health.record_success();

                        let response = Response {
                            content: reply.content,
                            provider: name.clone(),
                            model: reply.model,
                            tokens_used: reply.usage.map(|u| u.total_tokens),
                            terminal_reason: reply.terminal_reason,
                            task_type: Some(task_type),
                            cached: false,
                            cache_tier: None,
                        };

                        if hints.use_cache {
                            let category =
                                hints.category.unwrap_or(CacheCategory::General);
                            self.cache.put(messages, &response, category, None).await;
                        }
                        info!(provider = %name, task = task_type.as_str(), "Generated response");
                        return Ok(response);
                    }
                    Err(error) => {
                        let now = epoch_secs();
                        warn!(
                            provider = %name,
                            attempt = attempt + 1,
                            kind = ?error.kind,
                            "Provider attempt failed: {}",
                            error.message
                        );
                        match error.kind {
                            ProviderErrorKind::RateLimited => {
                                // Saturate the local window; not a health event.
                                state.ledger.saturate(now);
                                last_error = Some(error);
                                continue 'providers;
                            }
                            ProviderErrorKind::Auth => {
                                state.health.mark_unavailable(&error.message, now);
                                last_error = Some(error);
                                continue 'providers;
                            }
                            ProviderErrorKind::Invalid => {
                                // The request itself is faulty; failover
                                // would repeat the mistake.
                                return Err(CoreError::Provider(error));
                            }
                            ProviderErrorKind::Transient | ProviderErrorKind::Timeout => {
                                state.health.record_failure(&error.message, now);
                                last_error = Some(error);
                                if attempt + 1 < self.config.max_retries {
                                    let pause = backoff_secs(
                                        self.config.base_backoff_ms as f64 / 1000.0,
                                        attempt + 1,
                                    );
                                    tokio::time::sleep(Duration::from_secs_f64(pause)).await;
                                }
                            }
                        }
                    }
                }
            }
        }

        Err(CoreError::AllProvidersFailed {
            attempted,
            last: last_error,
        })
    }

    /// Streaming variant: same selection, but a provider failure after
    /// the stream opens is not failed over, since partial output has
    /// already escaped to the caller. The overall deadline bounds
    /// selection and stream-open; token arrival is gated per-fragment by
    /// the adapter.
    pub async fn stream(
        &self,
        messages: &[Message],
        params: &GenerationParams,
        hints: &RequestHints,
    ) -> CoreResult<StreamHandle> {
        let deadline = Duration::from_secs(params.timeout_secs.unwrap_or(self.config.deadline_secs));
        match tokio::time::timeout(deadline, self.stream_inner(messages, params, hints)).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Timeout(format!(
                "router deadline of {:?} elapsed",
                deadline
            ))),
        }
    }

    async fn stream_inner(
        &self,
        messages: &[Message],
        params: &GenerationParams,
        hints: &RequestHints,
    ) -> CoreResult<StreamHandle> {
        if hints.use_cache {
            if let Some(hit) = self
                .cache
                .get(messages, hints.skip_semantic, hints.category)
                .await
            {
                debug!("Serving stream from cache");
                let content = hit.content.clone();
                let tokens: TokenStream =
                    Box::pin(futures::stream::iter([Ok::<String, ProviderError>(content)]));
                return Ok(StreamHandle {
                    provider: hit.provider,
                    model: hit.model,
                    task_type: hit.task_type.unwrap_or(TaskType::Unknown),
                    cached: true,
                    tokens,
                });
            }
        }

        if messages.is_empty() {
            return Err(CoreError::Config(
                "cannot stream from an empty message list".to_string(),
            ));
        }

        let task_type = self.resolve_task(messages, hints);
        let candidates = self.candidate_list(messages, task_type, hints).await;
        let estimated_tokens = estimate_tokens(messages);
        let mut attempted = Vec::new();
        let mut last_error = None;

        for state in candidates {
            let name = state.adapter.name().to_string();
            attempted.push(name.clone());

            match state.adapter.stream(messages, params).await {
                Ok(tokens) => {
                    let now = epoch_secs();
                    state.ledger.record(estimated_tokens, now);
                    state.record_totals(estimated_tokens);
                    state.health.record_success();
                    info!(provider = %name, task = task_type.as_str(), "Opened token stream");
                    return Ok(StreamHandle {
                        provider: name,
                        model: state.adapter.model().to_string(),
                        task_type,
                        cached: false,
                        tokens,
                    });
                }
                Err(error) => {
                    let now = epoch_secs();
                    warn!(provider = %name, kind = ?error.kind, "Stream open failed: {}", error.message);
                    match error.kind {
                        ProviderErrorKind::RateLimited => state.ledger.saturate(now),
                        ProviderErrorKind::Auth => {
                            state.health.mark_unavailable(&error.message, now)
                        }
                        ProviderErrorKind::Invalid => {
                            return Err(CoreError::Provider(error));
                        }
                        _ => state.health.record_failure(&error.message, now),
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(CoreError::AllProvidersFailed {
            attempted,
            last: last_error,
        })
    }

    fn resolve_task(&self, messages: &[Message], hints: &RequestHints) -> TaskType {
        if let Some(task) = hints.task_type {
            return task;
        }
        messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| TaskClassifier::classify(&m.content))
            .unwrap_or(TaskType::Unknown)
    }

    /// Ordered candidate list: the preferred provider (when known) heads
    /// the list; the task-preference table supplies the rest. Candidates
    /// are dropped when unavailable, in backoff, or over quota.
    async fn candidate_list(
        &self,
        messages: &[Message],
        task_type: TaskType,
        hints: &RequestHints,
    ) -> Vec<Arc<ProviderState>> {
        let now = epoch_secs();
        let estimated_tokens = estimate_tokens(messages);

        let mut ordered: Vec<&str> = Vec::new();
        if let Some(preferred) = hints.preferred_provider.as_deref() {
            if self.by_name.contains_key(preferred) {
                ordered.push(preferred);
            }
        }
        for &name in TASK_ROUTING[task_ordinal(task_type)] {
            if !ordered.contains(&name) {
                ordered.push(name);
            }
        }
        // Configured providers outside the static table still join the
        // tail in configuration order.
        for state in &self.providers {
            let name = state.adapter.name();
            if !ordered.contains(&name) {
                ordered.push(name);
            }
        }

        let mut candidates = Vec::new();
        for name in ordered {
            let Some(state) = self.by_name.get(name) else {
                continue;
            };
            if !state.health.is_available() {
                debug!(provider = name, "Skipping unavailable provider");
                continue;
            }
            if state.health.in_backoff(now) {
                debug!(provider = name, "Skipping provider in backoff");
                continue;
            }
            if !state.ledger.can_admit(estimated_tokens, now) {
                debug!(provider = name, "Skipping provider over quota");
                continue;
            }
            if !state.adapter.is_available().await {
                debug!(provider = name, "Skipping provider reporting unavailable");
                continue;
            }
            candidates.push(Arc::clone(state));
        }
        candidates
    }
}

/// Drain a stream handle into a single response, for callers that want
/// the streaming selection path but a materialised result.
pub async fn collect_stream(handle: StreamHandle) -> CoreResult<Response> {
    let mut tokens = handle.tokens;
    let mut content = String::new();
    let mut terminal_reason = TerminalReason::Complete;
    while let Some(item) = tokens.next().await {
        match item {
            Ok(fragment) => content.push_str(&fragment),
            Err(error) => {
                warn!(provider = %handle.provider, "Stream failed mid-flight: {}", error);
                terminal_reason = TerminalReason::Error;
                break;
            }
        }
    }
    Ok(Response {
        content,
        provider: handle.provider,
        model: handle.model,
        tokens_used: None,
        terminal_reason,
        task_type: Some(handle.task_type),
        cached: handle.cached,
        cache_tier: None,
    })
}
