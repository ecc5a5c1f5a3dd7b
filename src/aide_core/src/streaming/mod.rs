//! Sentence-chunked streaming: boundary detection and coordination.

pub mod coordinator;
pub mod sentencizer;

pub use coordinator::{
    DEFAULT_QUEUE_CAPACITY, InterruptHandle, SentenceConsumer, StreamOutcome,
    StreamingCoordinator,
};
pub use sentencizer::{DEFAULT_MIN_SENTENCE_LENGTH, SentenceTokenizer};
