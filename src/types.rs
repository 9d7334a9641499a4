use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form metadata attached to memories and sessions
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A memory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing, default)]
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    /// Build a fresh memory with a new id and both timestamps set to now
    pub fn new(
        text: impl Into<String>,
        embedding: Vec<f32>,
        metadata: Metadata,
        session_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            embedding,
            metadata,
            session_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a patch in place. Metadata keys are merged, not replaced.
    pub(crate) fn apply(&mut self, patch: &MemoryPatch) {
        if let Some(text) = &patch.text {
            self.text = text.clone();
        }
        if let Some(embedding) = &patch.embedding {
            self.embedding = embedding.clone();
        }
        if let Some(metadata) = &patch.metadata {
            for (k, v) in metadata {
                self.metadata.insert(k.clone(), v.clone());
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update for a memory
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    pub text: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub metadata: Option<Metadata>,
}

impl MemoryPatch {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.embedding.is_none() && self.metadata.is_none()
    }
}

/// Search result with relevance score in [0, 100]
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub memory: Memory,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A grouping of short-lived memories
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
}

impl Session {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: SessionStatus::Active,
            metadata,
            created_at: Utc::now(),
            ended_at: None,
            summary: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}

/// Which tier currently holds a memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Hot { session_id: String },
    Cold,
}

/// Outcome of moving a session's hot memories to the cold tier
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub session_id: String,
    pub migrated: Vec<String>,
}

/// Statistics about the store
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub hot_memories: usize,
    pub cold_memories: usize,
    pub active_sessions: usize,
    pub completed_sessions: usize,
    pub index_kind: String,
}
