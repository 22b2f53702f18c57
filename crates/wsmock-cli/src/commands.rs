//! CLI command implementations.

use crate::console;
use colored::Colorize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use wsmock_core::parse_set_value;
use wsmock_server::{JsonStore, ServerConfig, ServerManager};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("Invalid file path: {0}")]
    NotAFile(PathBuf),
}

/// The store file has to exist before anything is served from it.
fn check_input(input: &Path) -> std::result::Result<(), InputError> {
    if input.is_file() {
        Ok(())
    } else {
        Err(InputError::NotAFile(input.to_path_buf()))
    }
}

/// Start the server and hand the terminal to the console.
pub async fn serve(input: &Path, port: u16, headless: bool) -> Result<()> {
    check_input(input)?;

    let mut config = ServerConfig::new(input, port);
    if headless {
        println!("{}", "Starting wsmock in headless mode...".cyan());
        config = config.headless();
    } else {
        println!("{}", "Starting wsmock...".cyan());
    }

    let mut server = ServerManager::new(config)?;
    let events = server.subscribe();
    let addr = server.start().await?;

    println!("{} Listening on ws://{}", "✓".green(), addr);
    println!("  Serving {}", input.display());
    if headless {
        println!("  Headless mode: accepting connections from any host");
    }
    println!(
        "  Type {} for commands, {} to stop",
        "help".cyan(),
        "Ctrl+C".cyan()
    );

    console::run(server.handle(), events).await;

    server.stop().await;
    println!("{} Server stopped", "✓".green());

    Ok(())
}

/// Print what a client connecting on `path` would receive.
pub async fn get(input: &Path, path: &str) -> Result<()> {
    check_input(input)?;

    let store = JsonStore::open(input)?;
    let value = store.load_at(path).await?;
    println!("{}", serde_json::to_string_pretty(&value)?);

    Ok(())
}

/// Write `value` at a dotted path, the same way `db set` does.
pub async fn set(input: &Path, path: &str, value: &str) -> Result<()> {
    check_input(input)?;

    let store = JsonStore::open(input)?;
    store.update_value(path, parse_set_value(value)).await?;
    println!("{} Set {} in {}", "✓".green(), path.cyan(), input.display());

    Ok(())
}
