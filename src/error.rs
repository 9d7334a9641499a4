//! Error types for the memory store.

use thiserror::Error;

/// Store result type alias
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the store and its tiers
#[derive(Debug, Error)]
pub enum StoreError {
    /// Memory or session absent
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Write or end attempted on a session that is not active
    #[error("session is not active: {0}")]
    SessionNotActive(String),

    /// The embedding provider failed; nothing was written
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Dimension mismatch or zero-norm vector
    #[error("invalid vector: {0}")]
    InvalidVector(String),

    /// Search against an index holding no vectors
    #[error("index is empty")]
    EmptyIndex,

    /// Session-end migration left some memories behind in the hot tier
    #[error("session {session_id}: {} memories failed to migrate", failed_ids.len())]
    PartialMigration {
        session_id: String,
        failed_ids: Vec<String>,
    },

    /// SQLite failure
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Metadata encode/decode failure
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Configuration file failure
    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Unknown key or unusable value in the configuration
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn memory_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "memory",
            id: id.into(),
        }
    }

    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "session",
            id: id.into(),
        }
    }

    pub fn invalid_vector(reason: impl Into<String>) -> Self {
        Self::InvalidVector(reason.into())
    }

    /// True for the not-found family, regardless of entity kind
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
