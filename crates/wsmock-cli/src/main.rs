//! wsmock CLI - serve a JSON file to WebSocket clients
//!
//! `wsmock serve` starts the server and an interactive console for pushing
//! data to connected clients. `get` and `set` read and edit the store
//! without a server.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wsmock_server::DEFAULT_PORT;

mod commands;
mod console;

#[derive(Parser)]
#[command(name = "wsmock")]
#[command(author = "wsmock Contributors")]
#[command(version)]
#[command(about = "Mock WebSocket server backed by a JSON file", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server and the interactive console
    Serve {
        /// JSON file to serve
        #[arg(short, long)]
        input: PathBuf,

        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Headless mode: bind to 0.0.0.0 for remote access (WSL/Docker/Server)
        #[arg(long)]
        headless: bool,
    },

    /// Print the value a client connecting on PATH would receive
    Get {
        /// JSON file to read
        #[arg(short, long)]
        input: PathBuf,

        /// Request path, e.g. /api/v1/users
        #[arg(default_value = "/")]
        path: String,
    },

    /// Write a value into the store at a dotted path
    Set {
        /// JSON file to edit
        #[arg(short, long)]
        input: PathBuf,

        /// Dotted path, e.g. settings.theme or users[0].name
        path: String,

        /// JSON value, or plain text stored as a string
        value: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = match cli.command {
        Commands::Serve {
            input,
            port,
            headless,
        } => commands::serve(&input, port, headless).await,
        Commands::Get { input, path } => commands::get(&input, &path).await,
        Commands::Set { input, path, value } => commands::set(&input, &path, &value).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
