//! AQS de Parfum CLI - catalog seeding and cart inspection.
//!
//! # Usage
//!
//! ```bash
//! # Seed perfumes and news posts from YAML
//! aqs-cli seed catalog.yaml
//!
//! # Validate and print what would be written
//! aqs-cli seed catalog.yaml --dry-run
//!
//! # Show the stored cart for an identity key
//! aqs-cli cart show user_abc123
//! ```
//!
//! # Environment Variables
//!
//! - `FIRESTORE_PROJECT_ID`, `FIRESTORE_API_KEY` - target project
//! - `FIRESTORE_ACCESS_TOKEN` - optional bearer token for server-side writes

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "aqs-cli")]
#[command(author, version, about = "AQS de Parfum CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed perfumes and news posts from a YAML file
    Seed {
        /// Path to the YAML file
        file: String,

        /// Validate and print documents without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect stored carts
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Show the normalized cart and order summary
    Show {
        /// Identity key (`user_{uid}` or `guest_{guestId}`)
        key: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Seed { file, dry_run } => commands::seed::run(&file, dry_run).await?,
        Commands::Cart { action } => match action {
            CartAction::Show { key } => commands::cart::show(&key).await?,
        },
    }
    Ok(())
}
