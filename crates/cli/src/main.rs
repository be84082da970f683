//! Vitrine CLI - Storage migrations and catalog previews.
//!
//! # Usage
//!
//! ```bash
//! # Run storage migrations
//! vitrine-cli migrate
//!
//! # Print the featured products as JSON lines
//! vitrine-cli catalog featured
//!
//! # Print one brand, or a search
//! vitrine-cli catalog brand --brand Omega
//! vitrine-cli catalog search --query seamaster
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run storage migrations
//! - `catalog` - Fetch through the catalog cache and print a view

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

use commands::catalog::CatalogView;

#[derive(Parser)]
#[command(name = "vitrine-cli")]
#[command(author, version, about = "Vitrine CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storage database migrations
    Migrate,
    /// Print a catalog view as JSON lines
    Catalog {
        /// Which view to print
        #[arg(value_enum)]
        view: CatalogView,

        /// Brand name (for `brand`)
        #[arg(short, long)]
        brand: Option<String>,

        /// Search text (for `search`)
        #[arg(short, long)]
        query: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::storage().await?,
        Commands::Catalog { view, brand, query } => {
            commands::catalog::print(view, brand.as_deref(), query.as_deref()).await?;
        }
    }
    Ok(())
}
