//! Error types for SWR operations

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Storage layer errors raised by underlying cache implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Cache lock poisoned")]
    LockPoisoned,

    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Deserialization failed for key {key}: {reason}")]
    Deserialization { key: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Decorated cache {decorator} references unknown cache pool {pool}")]
    UnknownPool { decorator: String, pool: String },

    #[error("Failed to parse configuration: {reason}")]
    Parse { reason: String },

    #[error("Failed to read configuration from {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Master error type for all non-compute SWR errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SwrError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid argument {argument}: {reason}")]
    InvalidArgument { argument: String, reason: String },
}

impl SwrError {
    pub fn invalid_argument(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for SWR operations.
pub type SwrResult<T> = Result<T, SwrError>;

// ============================================================================
// COMPUTE ERRORS
// ============================================================================

/// Failure raised by a compute callback.
///
/// The variant decides whether a failed forced refresh may fall back to the
/// previously cached value. `Fatal` errors never allow it; `Unavailable`
/// errors allow it only when `allow_stale` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputeError<E> {
    /// The resource behind the computation is unavailable.
    Unavailable { source: E, allow_stale: bool },
    /// Any other failure.
    Fatal(E),
}

impl<E> ComputeError<E> {
    /// An unavailable resource that permits serving the stale value.
    pub fn unavailable(source: E) -> Self {
        Self::Unavailable {
            source,
            allow_stale: true,
        }
    }

    /// An unavailable resource that still forbids stale serving.
    pub fn unavailable_strict(source: E) -> Self {
        Self::Unavailable {
            source,
            allow_stale: false,
        }
    }

    pub fn fatal(source: E) -> Self {
        Self::Fatal(source)
    }

    /// Whether a forced refresh failing with this error may return the stale value.
    pub fn allows_stale_fallback(&self) -> bool {
        matches!(
            self,
            Self::Unavailable {
                allow_stale: true,
                ..
            }
        )
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Borrow the callback's own error.
    pub fn inner(&self) -> &E {
        match self {
            Self::Unavailable { source, .. } | Self::Fatal(source) => source,
        }
    }

    pub fn into_inner(self) -> E {
        match self {
            Self::Unavailable { source, .. } | Self::Fatal(source) => source,
        }
    }
}

impl<E: fmt::Display> fmt::Display for ComputeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { source, .. } => write!(f, "Resource unavailable: {}", source),
            Self::Fatal(source) => write!(f, "{}", source),
        }
    }
}

impl<E> StdError for ComputeError<E>
where
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner())
    }
}

/// Error returned by a fetch-or-compute call.
///
/// Either the compute callback failed, or the cache itself did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError<E> {
    Compute(ComputeError<E>),
    Cache(SwrError),
}

impl<E> CacheError<E> {
    /// The compute failure, if this error came from the callback.
    pub fn as_compute(&self) -> Option<&ComputeError<E>> {
        match self {
            Self::Compute(err) => Some(err),
            Self::Cache(_) => None,
        }
    }

    pub fn into_compute(self) -> Option<ComputeError<E>> {
        match self {
            Self::Compute(err) => Some(err),
            Self::Cache(_) => None,
        }
    }

    pub fn allows_stale_fallback(&self) -> bool {
        self.as_compute()
            .is_some_and(ComputeError::allows_stale_fallback)
    }
}

impl<E> From<ComputeError<E>> for CacheError<E> {
    fn from(err: ComputeError<E>) -> Self {
        Self::Compute(err)
    }
}

impl<E> From<SwrError> for CacheError<E> {
    fn from(err: SwrError) -> Self {
        Self::Cache(err)
    }
}

impl<E> From<StorageError> for CacheError<E> {
    fn from(err: StorageError) -> Self {
        Self::Cache(SwrError::Storage(err))
    }
}

impl<E: fmt::Display> fmt::Display for CacheError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compute(err) => write!(f, "Compute error: {}", err),
            Self::Cache(err) => write!(f, "Cache error: {}", err),
        }
    }
}

impl<E> StdError for CacheError<E>
where
    E: StdError + 'static,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Compute(err) => Some(err),
            Self::Cache(err) => Some(err),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
