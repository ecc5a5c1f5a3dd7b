//! Streaming coordinator.
//!
//! Pipes a provider token stream through the sentence tokenizer and
//! publishes completed sentences to a bounded queue. A single consumer
//! task drains the queue and invokes the downstream callback
//! sequentially, so callbacks never overlap within one stream. The
//! bounded queue gives natural back-pressure: a slow consumer blocks the
//! producer's enqueue, throttling further token reads.
//!
//! Every termination path (completed, interrupted, error) ends with the
//! sentinel chunk (`index == -1`, `is_final == true`).

use crate::cache::epoch_millis;
use crate::clients::TokenStream;
use crate::streaming::sentencizer::SentenceTokenizer;
use aide_types::prelude::{ProviderError, SentenceChunk, StreamReport, StreamState};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info, warn};

pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

/// Downstream sentence consumer (speech synthesis, UI, ...). Errors are
/// logged by the coordinator and never terminate the stream.
#[async_trait]
pub trait SentenceConsumer: Send + Sync {
    async fn consume(
        &self,
        chunk: SentenceChunk,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Cloneable handle that requests cooperative interruption.
#[derive(Clone)]
pub struct InterruptHandle {
    interrupted: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so an interrupt raised while the
        // ingest loop is mid-iteration is still observed at its next
        // suspension point.
        self.notify.notify_one();
        debug!("Stream interruption requested");
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct MetricsInner {
    start: Option<Instant>,
    first_token: Option<Instant>,
    first_sentence: Option<Instant>,
    end: Option<Instant>,
    total_tokens: u64,
    total_sentences: u64,
    total_characters: u64,
}

impl MetricsInner {
    fn report(&self) -> StreamReport {
        let since_start = |instant: Option<Instant>| {
            match (self.start, instant) {
                (Some(start), Some(t)) => Some(t.saturating_duration_since(start).as_millis() as u64),
                _ => None,
            }
        };
        StreamReport {
            time_to_first_token_ms: since_start(self.first_token),
            time_to_first_sentence_ms: since_start(self.first_sentence),
            total_time_ms: since_start(self.end),
            total_tokens: self.total_tokens,
            total_sentences: self.total_sentences,
            total_characters: self.total_characters,
        }
    }
}

/// Outcome of one coordinated stream.
pub struct StreamOutcome {
    pub full_text: String,
    pub state: StreamState,
    pub report: StreamReport,
    pub error: Option<ProviderError>,
}

pub struct StreamingCoordinator {
    min_sentence_length: usize,
    queue_capacity: usize,
    state: Arc<Mutex<StreamState>>,
    metrics: Arc<Mutex<MetricsInner>>,
    interrupted: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StreamingCoordinator {
    pub fn new(min_sentence_length: usize, queue_capacity: usize) -> Self {
        StreamingCoordinator {
            min_sentence_length,
            queue_capacity: queue_capacity.max(1),
            state: Arc::new(Mutex::new(StreamState::Idle)),
            metrics: Arc::new(Mutex::new(MetricsInner::default())),
            interrupted: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn handle(&self) -> InterruptHandle {
        InterruptHandle {
            interrupted: Arc::clone(&self.interrupted),
            notify: Arc::clone(&self.notify),
        }
    }

    pub fn state(&self) -> StreamState {
        *self.state.lock().expect("stream state lock poisoned")
    }

    pub fn report(&self) -> StreamReport {
        self.metrics.lock().expect("metrics lock poisoned").report()
    }

    fn set_state(&self, state: StreamState) {
        *self.state.lock().expect("stream state lock poisoned") = state;
    }

    /// Drive the token stream to completion, interruption or error.
    pub async fn run(
        &self,
        mut tokens: TokenStream,
        consumer: Option<Arc<dyn SentenceConsumer>>,
    ) -> StreamOutcome {
        self.set_state(StreamState::Streaming);
        {
            let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
            *metrics = MetricsInner::default();
            metrics.start = Some(Instant::now());
        }

        let (tx, rx) = mpsc::channel::<SentenceChunk>(self.queue_capacity);
        let consumer_task = spawn_consumer(rx, consumer, Arc::clone(&self.interrupted));

        let mut tokenizer = SentenceTokenizer::new(self.min_sentence_length);
        let mut full_text = String::new();
        let mut sentence_index: i64 = 0;
        let mut stream_error: Option<ProviderError> = None;

        loop {
            let item = tokio::select! {
                _ = self.notify.notified() => None,
                item = tokens.next() => item,
            };
            if self.interrupted.load(Ordering::SeqCst) {
                self.set_state(StreamState::Interrupted);
                break;
            }
            let Some(item) = item else {
                break;
            };
            match item {
                Ok(fragment) => {
                    {
                        let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
                        if metrics.total_tokens == 0 {
                            metrics.first_token = Some(Instant::now());
                        }
                        metrics.total_tokens += 1;
                    }
                    full_text.push_str(&fragment);

                    for sentence in tokenizer.push(&fragment) {
                        let chunk =
                            self.emit_sentence(sentence, &mut sentence_index, false);
                        if tx.send(chunk).await.is_err() {
                            warn!("Sentence consumer task ended early");
                            break;
                        }
                    }
                }
                Err(provider_error) => {
                    error!("Stream failed mid-flight: {}", provider_error);
                    stream_error = Some(provider_error);
                    self.set_state(StreamState::Error);
                    break;
                }
            }
        }

        // Flush the tail only on a clean close.
        if self.state() == StreamState::Streaming {
            if let Some(tail) = tokenizer.flush() {
                let chunk = self.emit_sentence(tail, &mut sentence_index, true);
                let _ = tx.send(chunk).await;
            }
            self.set_state(StreamState::Completed);
        }

        // End-of-stream sentinel on every path.
        let _ = tx
            .send(SentenceChunk {
                text: String::new(),
                index: -1,
                is_final: true,
                timestamp_ms: epoch_millis(),
            })
            .await;
        drop(tx);
        if let Err(e) = consumer_task.await {
            warn!(error = %e, "Consumer task join failed");
        }

        {
            let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
            metrics.end = Some(Instant::now());
        }

        let state = self.state();
        let report = self.report();
        info!(
            state = ?state,
            sentences = report.total_sentences,
            tokens = report.total_tokens,
            "Stream finished"
        );
        StreamOutcome {
            full_text,
            state,
            report,
            error: stream_error,
        }
    }

    fn emit_sentence(
        &self,
        text: String,
        sentence_index: &mut i64,
        is_final: bool,
    ) -> SentenceChunk {
        {
            let mut metrics = self.metrics.lock().expect("metrics lock poisoned");
            if metrics.total_sentences == 0 {
                metrics.first_sentence = Some(Instant::now());
            }
            metrics.total_sentences += 1;
            metrics.total_characters += text.chars().count() as u64;
        }
        let chunk = SentenceChunk {
            text,
            index: *sentence_index,
            is_final,
            timestamp_ms: epoch_millis(),
        };
        *sentence_index += 1;
        chunk
    }
}

impl Default for StreamingCoordinator {
    fn default() -> Self {
        StreamingCoordinator::new(
            crate::streaming::sentencizer::DEFAULT_MIN_SENTENCE_LENGTH,
            DEFAULT_QUEUE_CAPACITY,
        )
    }
}

fn spawn_consumer(
    mut rx: mpsc::Receiver<SentenceChunk>,
    consumer: Option<Arc<dyn SentenceConsumer>>,
    interrupted: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(chunk) = rx.recv().await {
            let is_sentinel = chunk.is_sentinel();
            // After an interrupt, unconsumed sentences are dropped; only
            // the sentinel still reaches the consumer.
            if !is_sentinel && interrupted.load(Ordering::SeqCst) {
                continue;
            }
            if let Some(consumer) = &consumer {
                if let Err(e) = consumer.consume(chunk).await {
                    error!(error = %e, "Sentence consumer callback failed");
                }
            }
            if is_sentinel {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingConsumer {
        chunks: Arc<StdMutex<Vec<SentenceChunk>>>,
        interrupt_after: Option<(u64, InterruptHandle)>,
        fail_on: Option<i64>,
    }

    #[async_trait]
    impl SentenceConsumer for RecordingConsumer {
        async fn consume(
            &self,
            chunk: SentenceChunk,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let seen = {
                let mut chunks = self.chunks.lock().expect("chunks lock");
                chunks.push(chunk.clone());
                chunks.iter().filter(|c| !c.is_sentinel()).count() as u64
            };
            if let Some((after, handle)) = &self.interrupt_after {
                if seen >= *after {
                    handle.interrupt();
                }
            }
            if self.fail_on == Some(chunk.index) {
                return Err("consumer exploded".into());
            }
            Ok(())
        }
    }

    fn token_stream(fragments: Vec<Result<&'static str, ProviderError>>) -> TokenStream {
        Box::pin(futures::stream::iter(
            fragments
                .into_iter()
                .map(|r| r.map(str::to_string))
                .collect::<Vec<_>>(),
        ))
    }

    #[tokio::test]
    async fn canonical_sequence_emits_two_sentences() {
        let coordinator = StreamingCoordinator::default();
        let chunks = Arc::new(StdMutex::new(Vec::new()));
        let consumer = Arc::new(RecordingConsumer {
            chunks: Arc::clone(&chunks),
            interrupt_after: None,
            fail_on: None,
        });

        let outcome = coordinator
            .run(
                token_stream(vec![
                    Ok("He"),
                    Ok("llo"),
                    Ok(" world"),
                    Ok(". How "),
                    Ok("are you"),
                    Ok("?"),
                ]),
                Some(consumer),
            )
            .await;

        assert_eq!(outcome.state, StreamState::Completed);
        assert_eq!(outcome.full_text, "Hello world. How are you?");
        assert_eq!(outcome.report.total_tokens, 6);
        assert_eq!(outcome.report.total_sentences, 2);
        assert_eq!(outcome.report.total_characters, 24);

        let seen = chunks.lock().expect("chunks lock").clone();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].text, "Hello world.");
        assert_eq!(seen[0].index, 0);
        assert_eq!(seen[1].text, "How are you?");
        assert_eq!(seen[1].index, 1);
        assert!(seen[2].is_sentinel());
        assert!(seen[2].is_final);
    }

    #[tokio::test]
    async fn indices_increase_without_gaps() {
        let coordinator = StreamingCoordinator::default();
        let chunks = Arc::new(StdMutex::new(Vec::new()));
        let consumer = Arc::new(RecordingConsumer {
            chunks: Arc::clone(&chunks),
            interrupt_after: None,
            fail_on: None,
        });

        coordinator
            .run(
                token_stream(vec![Ok(
                    "One full sentence here. Another one right after it. And a final trailer",
                )]),
                Some(consumer),
            )
            .await;

        let seen = chunks.lock().expect("chunks lock").clone();
        let indices: Vec<i64> = seen
            .iter()
            .filter(|c| !c.is_sentinel())
            .map(|c| c.index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
        // The flushed trailer is the final real chunk.
        assert!(seen[indices.len() - 1].is_final);
    }

    #[tokio::test]
    async fn interrupt_stops_after_two_sentences() {
        let coordinator = StreamingCoordinator::default();
        let chunks = Arc::new(StdMutex::new(Vec::new()));
        let consumer = Arc::new(RecordingConsumer {
            chunks: Arc::clone(&chunks),
            interrupt_after: Some((2, coordinator.handle())),
            fail_on: None,
        });

        // Two sentences then an endless source that never closes.
        let endless = futures::stream::iter(vec![
            Ok("First sentence arrives. Second sentence arrives. ".to_string()),
        ])
        .chain(futures::stream::pending());

        let outcome = coordinator
            .run(Box::pin(endless), Some(consumer))
            .await;

        assert_eq!(outcome.state, StreamState::Interrupted);
        assert_eq!(outcome.report.total_sentences, 2);

        let seen = chunks.lock().expect("chunks lock").clone();
        let real: Vec<_> = seen.iter().filter(|c| !c.is_sentinel()).collect();
        assert_eq!(real.len(), 2);
        assert!(seen.last().expect("sentinel").is_sentinel());
    }

    #[tokio::test]
    async fn midflight_error_surfaces_state_and_sentinel() {
        let coordinator = StreamingCoordinator::default();
        let chunks = Arc::new(StdMutex::new(Vec::new()));
        let consumer = Arc::new(RecordingConsumer {
            chunks: Arc::clone(&chunks),
            interrupt_after: None,
            fail_on: None,
        });

        let outcome = coordinator
            .run(
                token_stream(vec![
                    Ok("A good start to the answer. "),
                    Err(ProviderError::new(
                        "fast-remote",
                        aide_types::prelude::ProviderErrorKind::Transient,
                        "connection reset",
                    )),
                ]),
                Some(consumer),
            )
            .await;

        assert_eq!(outcome.state, StreamState::Error);
        assert!(outcome.error.is_some());

        let seen = chunks.lock().expect("chunks lock").clone();
        assert!(seen.last().expect("sentinel").is_sentinel());
    }

    #[tokio::test]
    async fn consumer_failure_does_not_stop_the_stream() {
        let coordinator = StreamingCoordinator::default();
        let chunks = Arc::new(StdMutex::new(Vec::new()));
        let consumer = Arc::new(RecordingConsumer {
            chunks: Arc::clone(&chunks),
            interrupt_after: None,
            fail_on: Some(0),
        });

        let outcome = coordinator
            .run(
                token_stream(vec![Ok(
                    "First sentence arrives here. Second sentence arrives here.",
                )]),
                Some(consumer),
            )
            .await;

        assert_eq!(outcome.state, StreamState::Completed);
        let seen = chunks.lock().expect("chunks lock").clone();
        let real = seen.iter().filter(|c| !c.is_sentinel()).count();
        assert_eq!(real, 2);
    }

    #[tokio::test]
    async fn empty_stream_emits_only_the_sentinel() {
        let coordinator = StreamingCoordinator::default();
        let chunks = Arc::new(StdMutex::new(Vec::new()));
        let consumer = Arc::new(RecordingConsumer {
            chunks: Arc::clone(&chunks),
            interrupt_after: None,
            fail_on: None,
        });

        let outcome = coordinator.run(token_stream(vec![]), Some(consumer)).await;

        assert_eq!(outcome.state, StreamState::Completed);
        assert_eq!(outcome.report.total_sentences, 0);
        let seen = chunks.lock().expect("chunks lock").clone();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].is_sentinel());
    }
}
