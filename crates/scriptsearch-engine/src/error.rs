//! Error types for scriptsearch-engine

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Cause of a failure while executing a statement against the structured store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreFault {
    /// A relation (table) referenced by the predicate does not exist
    MissingRelation(String),
    /// A field (column) referenced by the predicate does not exist
    MissingField(String),
    /// Any other execution fault
    Other(String),
}

impl fmt::Display for StoreFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreFault::MissingRelation(name) => write!(f, "missing relation '{}'", name),
            StoreFault::MissingField(name) => write!(f, "missing field '{}'", name),
            StoreFault::Other(message) => write!(f, "{}", message),
        }
    }
}

impl StoreFault {
    /// Classify a rusqlite error by the store's own message
    pub fn classify(err: &rusqlite::Error) -> Self {
        let message = err.to_string();
        if let Some(name) = name_after(&message, "no such table: ") {
            return StoreFault::MissingRelation(name);
        }
        if let Some(name) = name_after(&message, "no such column: ") {
            return StoreFault::MissingField(name);
        }
        StoreFault::Other(message)
    }
}

/// First token following `marker` in a store message
fn name_after(message: &str, marker: &str) -> Option<String> {
    message
        .split(marker)
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .map(str::to_string)
}

/// Errors that can occur in scriptsearch-engine operations
#[derive(Error, Debug)]
pub enum SearchError {
    /// Malformed query, rejected before any I/O
    #[error("invalid query: {0}")]
    Validation(String),

    /// The structured store cannot be opened
    #[error("structured store unavailable at '{path}': {reason}")]
    StoreUnavailable { path: PathBuf, reason: String },

    /// Internal invariant violation while composing predicates
    #[error("failed to build query: {0}")]
    QueryBuild(String),

    /// Statement execution failed in the structured store
    #[error("{context} failed: {fault}")]
    StoreExecution { context: String, fault: StoreFault },

    // =========================================================================
    // Enhancement-stage errors (absorbed by the similarity adapter)
    // =========================================================================
    /// Embedding error
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Embedding provider unavailable
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Embedding dimension mismatch
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// OpenAI authentication failed
    #[error("OpenAI authentication failed: {0}")]
    OpenAIAuth(String),

    /// OpenAI rate limited
    #[error("OpenAI rate limited, retry after {retry_after:?} seconds")]
    OpenAIRateLimit { retry_after: Option<u64> },

    /// OpenAI model not found
    #[error("OpenAI model not found: {0}")]
    OpenAIInvalidModel(String),

    /// Vector store error
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SearchError {
    /// Create a Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a QueryBuild error.
    pub fn query_build(message: impl Into<String>) -> Self {
        Self::QueryBuild(message.into())
    }

    /// Create a StoreUnavailable error.
    pub fn store_unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a rusqlite execution error with the failing predicate's context.
    pub fn store_execution(context: impl Into<String>, err: &rusqlite::Error) -> Self {
        Self::StoreExecution {
            context: context.into(),
            fault: StoreFault::classify(err),
        }
    }

    /// Whether this error must be surfaced to the caller of `search`.
    ///
    /// Provider and vector-store errors are absorbed by the similarity stage.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SearchError::Validation(_)
                | SearchError::StoreUnavailable { .. }
                | SearchError::QueryBuild(_)
                | SearchError::StoreExecution { .. }
        )
    }
}

/// Result type for scriptsearch-engine operations
pub type Result<T> = std::result::Result<T, SearchError>;
