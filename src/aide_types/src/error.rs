use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// Classification of a provider-side failure, derived from the transport
/// outcome or the endpoint's status code.
#[derive(Deserialize, Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Network timeout, 5xx, transport reset. Retried in place.
    Transient,
    /// 429 or locally exhausted quota. Skip to the next candidate.
    RateLimited,
    /// 401/403 or missing credential. Provider is taken out of rotation.
    Auth,
    /// Other 4xx: the request itself is faulty. No failover.
    Invalid,
    /// The per-call deadline elapsed inside the adapter.
    Timeout,
}

/// A failure surfaced by a provider adapter, tagged with the provider it
/// came from.
#[derive(Deserialize, Clone, Debug, Serialize, PartialEq)]
pub struct ProviderError {
    pub provider: String,
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        ProviderError {
            provider: provider.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::Transient | ProviderErrorKind::Timeout
        )
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:?}: {}", self.provider, self.kind, self.message)
    }
}

impl Error for ProviderError {}

/// Errors surfaced by the core to its callers. The Router is the only
/// component that decides failover, so callers see at most one of these
/// per invocation.
#[derive(Debug)]
pub enum CoreError {
    /// No providers configured or an invalid cache path. Fatal at startup.
    Config(String),
    /// A single provider failed with no failover applicable.
    Provider(ProviderError),
    /// Every candidate was skipped or failed; the last underlying error is
    /// attached.
    AllProvidersFailed {
        attempted: Vec<String>,
        last: Option<ProviderError>,
    },
    /// The overall deadline elapsed; in-flight work was cancelled.
    Timeout(String),
    /// The stream was interrupted by the caller.
    Interrupted,
    /// L2/L3 backend failure. Logged by the cache and degraded, surfaced
    /// only through administrative paths.
    CacheBackend(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::Config(msg) => write!(f, "configuration error: {}", msg),
            CoreError::Provider(e) => write!(f, "provider error: {}", e),
            CoreError::AllProvidersFailed { attempted, last } => {
                write!(f, "all providers failed (tried: {})", attempted.join(", "))?;
                if let Some(last) = last {
                    write!(f, "; last error: {}", last)?;
                }
                Ok(())
            }
            CoreError::Timeout(msg) => write!(f, "timeout: {}", msg),
            CoreError::Interrupted => write!(f, "stream interrupted"),
            CoreError::CacheBackend(msg) => write!(f, "cache backend error: {}", msg),
        }
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CoreError::Provider(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProviderError> for CoreError {
    fn from(e: ProviderError) -> Self {
        CoreError::Provider(e)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
