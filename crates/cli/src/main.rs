//! orderflow CLI - Database migrations and pipeline tooling.
//!
//! # Usage
//!
//! ```bash
//! # Apply database migrations
//! orderflow-cli migrate
//!
//! # Publish an order document to the orders topic
//! orderflow-cli send fixtures/order.json
//!
//! # Publish 100 copies, each with its own order uid
//! orderflow-cli send fixtures/order.json --count 100 --fresh-uid
//!
//! # Check a payload against the admission rules
//! orderflow-cli validate fixtures/order.json
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "orderflow-cli")]
#[command(author, version, about = "orderflow CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Publish an order JSON file to the orders topic
    Send {
        /// Path to the JSON payload
        file: PathBuf,

        /// How many times to publish it
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        count: u32,

        /// Give every published copy a new order uid
        #[arg(long)]
        fresh_uid: bool,
    },
    /// Decode and validate an order JSON file
    Validate {
        /// Path to the JSON payload
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Send {
            file,
            count,
            fresh_uid,
        } => commands::send::run(&file, count, fresh_uid).await?,
        Commands::Validate { file } => commands::validate::run(&file)?,
    }
    Ok(())
}
