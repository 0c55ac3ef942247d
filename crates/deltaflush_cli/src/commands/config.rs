//! Config command implementation.

use deltaflush_core::{FlushPolicyKind, FlusherConfig};
use std::path::Path;

/// Loads a flusher configuration from a JSON file, or the default.
pub fn load(path: Option<&Path>) -> Result<FlusherConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            serde_json::from_str::<FlusherConfig>(&text)?
        }
        None => FlusherConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Runs the config command: validates and prints the effective configuration.
pub fn run(path: Option<&Path>, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = load(path)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        _ => print_text(&config),
    }
    Ok(())
}

fn print_text(config: &FlusherConfig) {
    println!("=== Flusher Configuration ===");
    let policy = match config.policy {
        FlushPolicyKind::Explicit => "explicit",
        FlushPolicyKind::HostDriven => "host-driven",
    };
    println!("Policy: {policy}");
    println!("Initial delta: {}", config.initial_delta);
    match config.sync_timeout {
        Some(t) => println!("Sync timeout: {t:?}"),
        None => println!("Sync timeout: none"),
    }
    match config.drain_timeout {
        Some(t) => println!("Drain timeout: {t:?}"),
        None => println!("Drain timeout: none"),
    }
}
