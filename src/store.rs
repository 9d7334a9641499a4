//! The tiered store: routes operations between the hot and cold tiers and
//! moves a session's memories to the cold tier when the session ends.
//!
//! Lock order is registry -> pointer table -> tier -> index. Session-scoped
//! creates run inside [`SessionRegistry::with_active`], so a create either
//! lands before `end_session` flips the session (and is migrated) or fails
//! with `SessionNotActive`. Migration holds the pointer table's write lock,
//! so gets and searches never see a memory in neither or both tiers.

use crate::cold::ColdTier;
use crate::config::{StoreConfig, CONFIG_FILE, DB_FILE, STORE_DIR};
use crate::db::Database;
use crate::embeddings::{get_embedder, Embedder};
use crate::error::{Result, StoreError};
use crate::hot::HotTier;
use crate::scoring::{self, normalized};
use crate::session::SessionRegistry;
use crate::types::{
    Location, Memory, MemoryPatch, Metadata, MigrationReport, SearchResult, Session, StoreStats,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct TieredMemoryStore {
    config: StoreConfig,
    path: Option<PathBuf>,
    embedder: Box<dyn Embedder>,
    sessions: SessionRegistry,
    hot: HotTier,
    cold: ColdTier,
    pointers: RwLock<HashMap<String, Location>>,
}

impl TieredMemoryStore {
    /// Assemble a store from explicit parts
    pub fn new(config: StoreConfig, db: Arc<Database>, embedder: Box<dyn Embedder>) -> Result<Self> {
        let cold = ColdTier::open(db.clone(), config.dimension, config.index)?;
        let sessions = SessionRegistry::open(db)?;
        let hot = HotTier::new(config.dimension, config.hot_ttl());
        let pointers = cold
            .list(None)
            .into_iter()
            .map(|m| (m.id, Location::Cold))
            .collect();

        Ok(Self {
            config,
            path: None,
            embedder,
            sessions,
            hot,
            cold,
            pointers: RwLock::new(pointers),
        })
    }

    /// A store backed by an in-memory database (for testing)
    pub fn in_memory(config: StoreConfig, embedder: Box<dyn Embedder>) -> Result<Self> {
        Self::new(config, Arc::new(Database::in_memory()?), embedder)
    }

    /// Open the store living in `store_path` (a `.strata` directory)
    pub fn open_at(store_path: &Path) -> Result<Self> {
        if !store_path.is_dir() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("store directory does not exist: {}", store_path.display()),
            )));
        }
        let config = StoreConfig::load(&store_path.join(CONFIG_FILE))?;
        let db = Arc::new(Database::open(&store_path.join(DB_FILE))?);
        let embedder = get_embedder(&config.embedding_model, config.dimension);

        let mut store = Self::new(config, db, embedder)?;
        store.path = Some(store_path.to_path_buf());
        Ok(store)
    }

    /// Create `<path>/.strata` with a default config and open it
    pub fn init(path: &Path) -> Result<Self> {
        let store_path = path.join(STORE_DIR);
        fs::create_dir_all(&store_path)?;
        let config_path = store_path.join(CONFIG_FILE);
        if !config_path.exists() {
            StoreConfig::default().save(&config_path)?;
        }
        Self::open_at(&store_path)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn check_vector(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.config.dimension {
            return Err(StoreError::invalid_vector(format!(
                "expected dimension {}, got {}",
                self.config.dimension,
                embedding.len()
            )));
        }
        normalized(embedding).map(|_| ())
    }

    // =========================================================================
    // Memories
    // =========================================================================

    /// Embed `text` and store it; returns the new id
    pub fn create_memory(
        &self,
        text: &str,
        metadata: Metadata,
        session_id: Option<&str>,
    ) -> Result<String> {
        let embedding = self.embedder.embed(text)?;
        self.create_memory_with_embedding(text, embedding, metadata, session_id)
    }

    /// Store a memory with a precomputed embedding; returns the new id.
    ///
    /// With a session id the memory goes to the hot tier, which requires the
    /// session to exist and be active. Otherwise it goes to the cold tier.
    pub fn create_memory_with_embedding(
        &self,
        text: &str,
        embedding: Vec<f32>,
        metadata: Metadata,
        session_id: Option<&str>,
    ) -> Result<String> {
        self.check_vector(&embedding)?;
        let memory = Memory::new(text, embedding, metadata, session_id.map(str::to_string));
        let id = memory.id.clone();

        match session_id {
            Some(sid) => self.sessions.with_active(sid, || {
                let mut pointers = self.pointers.write();
                self.hot.put(sid, memory, None)?;
                pointers.insert(
                    id.clone(),
                    Location::Hot {
                        session_id: sid.to_string(),
                    },
                );
                Ok(())
            })?,
            None => {
                let mut pointers = self.pointers.write();
                self.cold.put(memory)?;
                pointers.insert(id.clone(), Location::Cold);
            }
        }

        debug!(%id, ?session_id, "memory created");
        Ok(id)
    }

    /// Which tier holds a memory
    pub fn locate(&self, id: &str) -> Result<Location> {
        self.pointers
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::memory_not_found(id))
    }

    pub fn get_memory(&self, id: &str) -> Result<Memory> {
        let pointers = self.pointers.read();
        match pointers.get(id) {
            Some(Location::Hot { session_id }) => self.hot.get(session_id, id),
            Some(Location::Cold) => self.cold.get(id),
            None => Err(StoreError::memory_not_found(id)),
        }
    }

    /// Patch a memory wherever it lives.
    ///
    /// New text without an explicit embedding is re-embedded before any state
    /// is touched. Metadata keys are merged into the existing map.
    pub fn update_memory(&self, id: &str, mut patch: MemoryPatch) -> Result<Memory> {
        if patch.embedding.is_none() {
            if let Some(text) = &patch.text {
                let embedding = self.embedder.embed(text)?;
                patch.embedding = Some(embedding);
            }
        }
        if let Some(embedding) = &patch.embedding {
            self.check_vector(embedding)?;
        }

        let pointers = self.pointers.read();
        let updated = match pointers.get(id) {
            Some(Location::Hot { session_id }) => self.hot.update(session_id, id, &patch)?,
            Some(Location::Cold) => self.cold.update(id, &patch)?,
            None => None,
        };
        updated.ok_or_else(|| StoreError::memory_not_found(id))
    }

    pub fn delete_memory(&self, id: &str) -> Result<()> {
        let mut pointers = self.pointers.write();
        let removed = match pointers.get(id) {
            Some(Location::Hot { session_id }) => self.hot.delete(session_id, id),
            Some(Location::Cold) => self.cold.delete(id)?,
            None => return Err(StoreError::memory_not_found(id)),
        };
        // An expired hot entry leaves a stale pointer behind; drop it either way.
        pointers.remove(id);

        if removed {
            debug!(%id, "memory deleted");
            Ok(())
        } else {
            Err(StoreError::memory_not_found(id))
        }
    }

    /// Memories of one session across both tiers, or every cold memory
    pub fn list_memories(&self, session_id: Option<&str>) -> Result<Vec<Memory>> {
        let Some(sid) = session_id else {
            return Ok(self.cold.list(None));
        };
        self.sessions.get(sid)?;

        let _pointers = self.pointers.read();
        let mut memories = self.hot.list_by_session(sid);
        memories.extend(self.cold.list(Some(sid)));
        memories.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(memories)
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Embed `query` and search; see [`search_by_embedding`](Self::search_by_embedding)
    pub fn search(&self, query: &str, k: usize, session_id: Option<&str>) -> Result<Vec<SearchResult>> {
        let embedding = self.embedder.embed(query)?;
        self.search_by_embedding(&embedding, k, session_id)
    }

    /// Top `k` memories by score.
    ///
    /// With a session id both tiers are queried, since the session's memories
    /// may already have migrated; without one only the cold tier is.
    pub fn search_by_embedding(
        &self,
        query: &[f32],
        k: usize,
        session_id: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        self.check_vector(query)?;
        if let Some(sid) = session_id {
            self.sessions.get(sid)?;
        }

        let _pointers = self.pointers.read();
        let mut results = self.cold.search(query, k)?;
        if let Some(sid) = session_id {
            results.extend(self.hot.search(sid, query, k)?);
        }
        drop(_pointers);

        let mut best: HashMap<String, SearchResult> = HashMap::with_capacity(results.len());
        for result in results {
            match best.get(&result.memory.id) {
                Some(existing) if existing.score >= result.score => {}
                _ => {
                    best.insert(result.memory.id.clone(), result);
                }
            }
        }
        let mut merged: Vec<SearchResult> = best.into_values().collect();
        scoring::rank(&mut merged, k);
        Ok(merged)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    pub fn create_session(&self, metadata: Metadata) -> Result<Session> {
        let session = self.sessions.create(metadata)?;
        debug!(id = %session.id, "session created");
        Ok(session)
    }

    pub fn get_session(&self, id: &str) -> Result<Session> {
        self.sessions.get(id)
    }

    pub fn list_sessions(&self) -> Vec<Session> {
        self.sessions.list()
    }

    /// Complete a session and move its surviving hot memories to the cold tier.
    ///
    /// Memories that expired before this call are gone and are not migrated.
    /// If some inserts fail, those memories stay in the hot tier with a fresh
    /// TTL and the call fails with `PartialMigration`; see
    /// [`retry_migration`](Self::retry_migration).
    pub fn end_session(&self, id: &str, summary: Option<String>) -> Result<MigrationReport> {
        self.sessions.end(id, summary)?;
        let report = self.migrate(id)?;
        info!(session_id = id, migrated = report.migrated.len(), "session ended");
        Ok(report)
    }

    /// Migrate whatever a completed session still has in the hot tier
    pub fn retry_migration(&self, id: &str) -> Result<MigrationReport> {
        let session = self.sessions.get(id)?;
        if session.is_active() {
            debug!(session_id = id, "session still active, nothing to migrate");
            return Ok(MigrationReport {
                session_id: id.to_string(),
                migrated: Vec::new(),
            });
        }
        self.migrate(id)
    }

    fn migrate(&self, session_id: &str) -> Result<MigrationReport> {
        let mut pointers = self.pointers.write();
        let mut report = MigrationReport {
            session_id: session_id.to_string(),
            migrated: Vec::new(),
        };
        let mut failed_ids = Vec::new();

        for memory in self.hot.drain_session(session_id) {
            let id = memory.id.clone();
            match self.cold.put(memory.clone()) {
                Ok(()) => {
                    pointers.insert(id.clone(), Location::Cold);
                    report.migrated.push(id);
                }
                Err(e) => {
                    warn!(session_id, %id, error = %e, "memory failed to migrate");
                    self.hot.put(session_id, memory, None)?;
                    failed_ids.push(id);
                }
            }
        }

        // Whatever still points at this session's hot tier expired before the drain.
        pointers.retain(|id, location| match location {
            Location::Hot { session_id: sid } => sid.as_str() != session_id || failed_ids.contains(id),
            Location::Cold => true,
        });

        if failed_ids.is_empty() {
            Ok(report)
        } else {
            Err(StoreError::PartialMigration {
                session_id: session_id.to_string(),
                failed_ids,
            })
        }
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Sweep expired hot memories and their pointers; returns how many went
    pub fn purge_expired(&self) -> usize {
        let mut pointers = self.pointers.write();
        let purged = self.hot.purge_expired();
        for (_, id) in &purged {
            pointers.remove(id);
        }
        purged.len()
    }

    pub fn stats(&self) -> StoreStats {
        let (active_sessions, completed_sessions) = self.sessions.counts();
        StoreStats {
            hot_memories: self.hot.len(),
            cold_memories: self.cold.len(),
            active_sessions,
            completed_sessions,
            index_kind: self.cold.index_kind().label(),
        }
    }
}
