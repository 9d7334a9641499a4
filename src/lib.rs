//! Tiered memory store with vector-similarity retrieval.
//!
//! Session-scoped memories live in a TTL-bound hot tier; everything else, and
//! every session's surviving memories once the session ends, lives in a
//! SQLite-backed cold tier with a nearest-neighbour index. [`TieredMemoryStore`]
//! is the entry point.

pub mod cold;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod hot;
pub mod index;
pub mod scoring;
pub mod session;
pub mod store;
pub mod types;

pub use config::StoreConfig;
pub use embeddings::{Embedder, LiteEmbedder, ServerEmbedder};
pub use error::{Result, StoreError};
pub use index::{IndexKind, VectorIndex};
pub use store::TieredMemoryStore;
pub use types::{
    Location, Memory, MemoryPatch, Metadata, MigrationReport, SearchResult, Session,
    SessionStatus, StoreStats,
};
