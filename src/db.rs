use crate::error::Result;
use crate::types::{Memory, Metadata, Session, SessionStatus};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::Path;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding BLOB NOT NULL,
    session_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_session ON memories(session_id);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    ended_at TEXT,
    summary TEXT
);
"#;

/// SQLite backing for cold-tier rows and session records
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database file
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // -------------------------------------------------------------------------
    // Embedding serialization
    // -------------------------------------------------------------------------

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(data: &[u8]) -> Vec<f32> {
        data.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Memories
    // -------------------------------------------------------------------------

    /// Insert a memory row, replacing any row with the same id
    pub fn put_memory(&self, memory: &Memory) -> Result<()> {
        let metadata = serde_json::to_string(&memory.metadata)?;
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO memories (id, text, metadata, embedding, session_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                memory.id,
                memory.text,
                metadata,
                Self::serialize_embedding(&memory.embedding),
                memory.session_id,
                memory.created_at,
                memory.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Delete a memory row
    pub fn delete_memory(&self, id: &str) -> Result<bool> {
        let count = self
            .conn
            .lock()
            .execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    pub fn count_memories(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Every stored memory, oldest first
    pub fn load_memories(&self) -> Result<Vec<Memory>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, text, metadata, embedding, session_id, created_at, updated_at
             FROM memories ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_memory)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    /// Insert or overwrite a session record
    pub fn put_session(&self, session: &Session) -> Result<()> {
        let metadata = serde_json::to_string(&session.metadata)?;
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO sessions (id, status, metadata, created_at, ended_at, summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id,
                session.status.as_str(),
                metadata,
                session.created_at,
                session.ended_at,
                session.summary,
            ],
        )?;
        Ok(())
    }

    pub fn load_sessions(&self) -> Result<Vec<Session>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, status, metadata, created_at, ended_at, summary FROM sessions ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], row_to_session)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

fn decode_metadata(row: &Row, idx: usize) -> rusqlite::Result<Metadata> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_memory(row: &Row) -> rusqlite::Result<Memory> {
    let embedding: Vec<u8> = row.get(3)?;
    Ok(Memory {
        id: row.get(0)?,
        text: row.get(1)?,
        metadata: decode_metadata(row, 2)?,
        embedding: Database::deserialize_embedding(&embedding),
        session_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    let status: String = row.get(1)?;
    let status = SessionStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unknown session status: {status}").into(),
        )
    })?;
    Ok(Session {
        id: row.get(0)?,
        status,
        metadata: decode_metadata(row, 2)?,
        created_at: row.get(3)?,
        ended_at: row.get(4)?,
        summary: row.get(5)?,
    })
}
