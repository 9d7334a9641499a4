use super::{format_metadata, parse_metadata};
use std::io::{self, Write};
use std::path::Path;
use strata::config::STORE_DIR;
use strata::{Location, Memory, MemoryPatch, TieredMemoryStore};

/// Run the init command
pub fn run_init(path: &str) -> Result<(), String> {
    let path = Path::new(path);
    let store_path = path.join(STORE_DIR);

    if store_path.exists() {
        return Err(format!(".strata already exists at {}", store_path.display()));
    }

    TieredMemoryStore::init(path).map_err(|e| format!("Failed to initialize: {}", e))?;
    println!("Initialized .strata at {}", store_path.display());

    Ok(())
}

/// Run the remember command
pub fn run_remember(
    store: &TieredMemoryStore,
    content: &str,
    meta: &[String],
    session: Option<&str>,
) -> Result<(), String> {
    let metadata = parse_metadata(meta)?;
    let id = store
        .create_memory(content, metadata, session)
        .map_err(|e| format!("Failed to remember: {}", e))?;

    match session {
        Some(s) => println!("Remembered [{}] in session {}", id, s),
        None => println!("Remembered [{}]", id),
    }

    Ok(())
}

/// Run the get command
pub fn run_get(store: &TieredMemoryStore, id: &str) -> Result<(), String> {
    let memory = store.get_memory(id).map_err(|e| e.to_string())?;
    let tier = match store.locate(id).map_err(|e| e.to_string())? {
        Location::Hot { .. } => "short-term",
        Location::Cold => "long-term",
    };

    println!("[{}] ({})", memory.id, tier);
    if let Some(s) = &memory.session_id {
        println!("  session: {}", s);
    }
    if !memory.metadata.is_empty() {
        println!("  metadata: {}", format_metadata(&memory.metadata));
    }
    println!("  created: {}", memory.created_at.to_rfc3339());
    println!("  updated: {}", memory.updated_at.to_rfc3339());
    println!("\n{}", memory.text);

    Ok(())
}

/// Run the recall command
pub fn run_recall(
    store: &TieredMemoryStore,
    query: &str,
    limit: usize,
    session: Option<&str>,
) -> Result<(), String> {
    let results = store
        .search(query, limit, session)
        .map_err(|e| format!("Failed to search: {}", e))?;

    if results.is_empty() {
        println!("No matching memories.");
        return Ok(());
    }

    for r in results {
        print_memory_with_score(&r.memory, r.score);
    }

    Ok(())
}

/// Run the update command
pub fn run_update(
    store: &TieredMemoryStore,
    id: &str,
    text: Option<&str>,
    meta: &[String],
) -> Result<(), String> {
    let patch = MemoryPatch {
        text: text.map(str::to_string),
        embedding: None,
        metadata: if meta.is_empty() {
            None
        } else {
            Some(parse_metadata(meta)?)
        },
    };
    if patch.is_empty() {
        return Err("Nothing to update: pass --text or --meta".to_string());
    }

    let memory = store
        .update_memory(id, patch)
        .map_err(|e| format!("Failed to update memory: {}", e))?;

    println!("Updated [{}]", memory.id);
    if text.is_some() {
        println!("  text: {}", preview(&memory.text, 80));
    }
    if !meta.is_empty() {
        println!("  metadata: {}", format_metadata(&memory.metadata));
    }

    Ok(())
}

/// Run the forget command
pub fn run_forget(store: &TieredMemoryStore, id: &str, force: bool) -> Result<(), String> {
    let memory = store.get_memory(id).map_err(|e| e.to_string())?;

    if !force {
        println!("Forget [{}]:", id);
        println!("  {}", preview(&memory.text, 100));

        print!("Confirm? [y/N] ");
        io::stdout().flush().map_err(|e| e.to_string())?;

        let mut input = String::new();
        io::stdin().read_line(&mut input).map_err(|e| e.to_string())?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    store.delete_memory(id).map_err(|e| e.to_string())?;
    println!("Forgotten [{}]", id);

    Ok(())
}

/// Run the list command
pub fn run_list(store: &TieredMemoryStore, session: Option<&str>, limit: usize) -> Result<(), String> {
    let memories = store
        .list_memories(session)
        .map_err(|e| format!("Failed to list memories: {}", e))?;

    if memories.is_empty() {
        println!("No memories yet.");
        return Ok(());
    }

    for m in memories.iter().take(limit) {
        print_memory(m);
    }
    if memories.len() > limit {
        println!("... {} more", memories.len() - limit);
    }

    Ok(())
}

/// Run the stats command
pub fn run_stats(store: &TieredMemoryStore) -> Result<(), String> {
    let stats = store.stats();

    println!("Memory Statistics");
    println!("=================\n");

    println!("Short-term memories: {}", stats.hot_memories);
    println!("Long-term memories:  {}", stats.cold_memories);
    println!("Active sessions:     {}", stats.active_sessions);
    println!("Completed sessions:  {}", stats.completed_sessions);
    println!("Index:               {}", stats.index_kind);

    Ok(())
}

/// Run the purge command
pub fn run_purge(store: &TieredMemoryStore) -> Result<(), String> {
    let purged = store.purge_expired();
    println!("Purged {} expired memories", purged);
    Ok(())
}

// Helper to print a memory
fn print_memory(m: &Memory) {
    match &m.session_id {
        Some(s) => println!("[{}] session: {}", m.id, s),
        None => println!("[{}]", m.id),
    }

    if !m.metadata.is_empty() {
        println!("    metadata: {}", format_metadata(&m.metadata));
    }

    println!("    {}\n", preview(&m.text, 200));
}

fn print_memory_with_score(m: &Memory, score: f64) {
    println!("[{}] score: {:.1}", m.id, score);

    if !m.metadata.is_empty() {
        println!("    metadata: {}", format_metadata(&m.metadata));
    }

    println!("    {}\n", preview(&m.text, 200));
}

/// Single-line preview truncated to `max` characters
fn preview(text: &str, max: usize) -> String {
    let cut: String = text.chars().take(max).collect();
    let cut = if text.chars().count() > max {
        format!("{}...", cut)
    } else {
        cut
    };
    cut.replace('\n', " ")
}
