use crate::{dispatch, Cli, Commands};
use clap::Parser;
use std::io::{self, BufRead, Write};
use strata::TieredMemoryStore;

const PROMPT: &str = "strata> ";

/// Run commands against one open store until EOF or `exit`.
///
/// Short-term memories only live as long as the process, so sessions started
/// here keep their hot tier until they are ended or the shell quits.
pub fn run_shell(store: &TieredMemoryStore) -> Result<(), String> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    println!("strata shell. Type 'help' for commands, 'exit' to quit.");

    loop {
        print!("{}", PROMPT);
        stdout.flush().map_err(|e| e.to_string())?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).map_err(|e| e.to_string())? == 0 {
            println!();
            break;
        }

        match run_line(store, line.trim()) {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => eprintln!("Error: {}", e),
        }
    }

    let active = store.stats().active_sessions;
    if active > 0 {
        eprintln!(
            "Note: {} active session(s) lose their short-term memories on exit",
            active
        );
    }

    Ok(())
}

/// Run one shell line; returns true when the shell should stop
fn run_line(store: &TieredMemoryStore, line: &str) -> Result<bool, String> {
    match line {
        "" => return Ok(false),
        "exit" | "quit" => return Ok(true),
        _ => {}
    }

    let words = shell_words::split(line).map_err(|e| format!("Could not parse line: {}", e))?;
    let words = if words.first().map(String::as_str) == Some("help") {
        vec!["--help".to_string()]
    } else {
        words
    };

    let cli = match Cli::try_parse_from(std::iter::once("strata".to_string()).chain(words)) {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version output are reported as errors by clap
            e.print().map_err(|e| e.to_string())?;
            return Ok(false);
        }
    };

    match cli.command {
        Commands::Init { .. } | Commands::Shell => {
            Err("Not available inside the shell".to_string())
        }
        Commands::Config { .. } => {
            Err("Run 'strata config' outside the shell; settings apply on next open".to_string())
        }
        command => dispatch(store, command).map(|_| false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata::embeddings::LiteEmbedder;
    use strata::StoreConfig;

    fn store() -> TieredMemoryStore {
        let config = StoreConfig {
            dimension: 64,
            ..StoreConfig::default()
        };
        TieredMemoryStore::in_memory(config, Box::new(LiteEmbedder::with_dim(64))).unwrap()
    }

    #[test]
    fn test_exit_stops_shell() {
        let store = store();
        assert!(run_line(&store, "exit").unwrap());
        assert!(run_line(&store, "quit").unwrap());
        assert!(!run_line(&store, "").unwrap());
    }

    #[test]
    fn test_quoted_arguments_reach_store() {
        let store = store();
        assert!(!run_line(&store, "remember \"tabs versus spaces\" --meta tag=style").unwrap());

        let memories = store.list_memories(None).unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].text, "tabs versus spaces");
        assert_eq!(memories[0].metadata["tag"], serde_json::json!("style"));
    }

    #[test]
    fn test_nested_commands_rejected() {
        let store = store();
        assert!(run_line(&store, "shell").is_err());
        assert!(run_line(&store, "init").is_err());
        assert!(run_line(&store, "config dimension 8").is_err());
    }

    #[test]
    fn test_unknown_command_keeps_shell_running() {
        let store = store();
        assert!(!run_line(&store, "frobnicate").unwrap());
    }

    #[test]
    fn test_unbalanced_quote_is_error() {
        let store = store();
        assert!(run_line(&store, "remember \"oops").is_err());
    }
}
