use super::{format_metadata, parse_metadata};
use strata::{MigrationReport, Session, StoreError, TieredMemoryStore};

/// Run the session start command
pub fn run_start(store: &TieredMemoryStore, meta: &[String]) -> Result<(), String> {
    let metadata = parse_metadata(meta)?;
    let session = store
        .create_session(metadata)
        .map_err(|e| format!("Failed to start session: {}", e))?;

    println!("Started session {}", session.id);
    Ok(())
}

/// Run the session end command
pub fn run_end(store: &TieredMemoryStore, id: &str, summary: Option<String>) -> Result<(), String> {
    report_migration(store.end_session(id, summary))
}

/// Run the session retry command
pub fn run_retry(store: &TieredMemoryStore, id: &str) -> Result<(), String> {
    report_migration(store.retry_migration(id))
}

fn report_migration(result: strata::Result<MigrationReport>) -> Result<(), String> {
    match result {
        Ok(report) => {
            println!(
                "Session {} complete: {} memories moved to long-term storage",
                report.session_id,
                report.migrated.len()
            );
            Ok(())
        }
        Err(StoreError::PartialMigration {
            session_id,
            failed_ids,
        }) => {
            eprintln!("These memories were kept in short-term storage:");
            for id in &failed_ids {
                eprintln!("  {}", id);
            }
            Err(format!(
                "{} memories failed to migrate; run 'strata session retry {}'",
                failed_ids.len(),
                session_id
            ))
        }
        Err(e) => Err(e.to_string()),
    }
}

/// Run the session show command
pub fn run_show(store: &TieredMemoryStore, id: &str) -> Result<(), String> {
    let session = store.get_session(id).map_err(|e| e.to_string())?;
    print_session(&session);

    let memories = store.list_memories(Some(id)).map_err(|e| e.to_string())?;
    println!("  memories: {}", memories.len());

    Ok(())
}

/// Run the session list command
pub fn run_list(store: &TieredMemoryStore) -> Result<(), String> {
    let sessions = store.list_sessions();

    if sessions.is_empty() {
        println!("No sessions yet. Start one with: strata session start");
        return Ok(());
    }

    for s in &sessions {
        print_session(s);
    }

    Ok(())
}

fn print_session(s: &Session) {
    println!("[{}] {}", s.id, s.status);
    println!("  started: {}", s.created_at.to_rfc3339());
    if let Some(ended) = s.ended_at {
        println!("  ended:   {}", ended.to_rfc3339());
    }
    if !s.metadata.is_empty() {
        println!("  metadata: {}", format_metadata(&s.metadata));
    }
    if let Some(summary) = &s.summary {
        println!("  summary: {}", summary);
    }
}
