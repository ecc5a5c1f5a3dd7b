pub use crate::domain::cache::{CacheCategory, CacheStats, CacheTier};
pub use crate::domain::common::{Fingerprint, ProviderName};
pub use crate::domain::message::{Message, Role, TokenUsage};
pub use crate::domain::request::{GenerationParams, RequestHints};
pub use crate::domain::response::{Response, TerminalReason};
pub use crate::domain::status::{ProviderStatusView, ResourceSnapshot, StatusReport};
pub use crate::domain::stream::{SentenceChunk, StreamReport, StreamState};
pub use crate::domain::task::TaskType;
pub use crate::error::{CoreError, CoreResult, ProviderError, ProviderErrorKind};
