use strata::config::{find_store_path, set_store_config, StoreConfig, CONFIG_FILE, MODELS};

const KEYS: &[&str] = &["dimension", "hot_ttl_secs", "index", "embedding_model"];

/// Run the config command
pub fn run_config(key: Option<&str>, value: Option<&str>, list_models: bool) -> Result<(), String> {
    if list_models {
        print_models();
        return Ok(());
    }

    let store_path = find_store_path().ok_or("No .strata directory found. Run 'strata init' first.")?;
    let config = StoreConfig::load(&store_path.join(CONFIG_FILE)).map_err(|e| e.to_string())?;

    match (key, value) {
        (None, None) => {
            println!("Current configuration:\n");
            for k in KEYS {
                println!("  {}: {}", k, config.get(k).unwrap_or_default());
            }
        }
        (Some(k), None) => match config.get(k) {
            Some(v) => println!("{}: {}", k, v),
            None => println!("{}: (not set)", k),
        },
        (Some(k), Some(v)) => {
            set_store_config(&store_path, k, v).map_err(|e| format!("Failed to set {}: {}", k, e))?;
            println!("Set {} = {}", k, v);
        }
        (None, Some(_)) => {
            return Err("Key required when setting a value".to_string());
        }
    }

    Ok(())
}

fn print_models() {
    let current = find_store_path()
        .and_then(|p| StoreConfig::load(&p.join(CONFIG_FILE)).ok())
        .unwrap_or_default()
        .embedding_model;

    println!("Available embedding models:\n");
    for model in MODELS {
        let marker = if model.name == current { " *" } else { "  " };
        println!("{} {:10} {}", marker, model.name, model.description);
    }

    println!("\n* = currently configured");
    println!("\nSet model with: strata config model <name>");
}
