use serde::{Deserialize, Serialize};

/// State of a streaming session.
#[derive(Deserialize, Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Idle,
    Streaming,
    Paused,
    Interrupted,
    Completed,
    Error,
}

/// One detected sentence, handed to the downstream consumer in index order.
///
/// The end-of-stream sentinel carries `index == -1` and `is_final == true`
/// on every termination path.
#[derive(Deserialize, Clone, Debug, Serialize, PartialEq)]
pub struct SentenceChunk {
    pub text: String,
    pub index: i64,
    pub is_final: bool,
    pub timestamp_ms: u64,
}

impl SentenceChunk {
    pub fn is_sentinel(&self) -> bool {
        self.index == -1
    }
}

/// Serializable snapshot of a stream's latency and volume counters.
///
/// All derived latencies are clamped to be non-negative.
#[derive(Deserialize, Clone, Copy, Debug, Serialize, PartialEq, Default)]
pub struct StreamReport {
    pub time_to_first_token_ms: Option<u64>,
    pub time_to_first_sentence_ms: Option<u64>,
    pub total_time_ms: Option<u64>,
    pub total_tokens: u64,
    pub total_sentences: u64,
    pub total_characters: u64,
}

impl StreamReport {
    pub fn tokens_per_second(&self) -> f64 {
        match self.total_time_ms {
            Some(ms) if ms > 0 => self.total_tokens as f64 * 1000.0 / ms as f64,
            _ => 0.0,
        }
    }
}
