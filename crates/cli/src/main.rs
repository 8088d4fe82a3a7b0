//! Marketplace CLI - Inspect and edit the locally persisted cart.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart
//! mp-cli cart show
//!
//! # Add a product
//! mp-cli cart add --id tee-1 --title "T-shirt" --image-url https://cdn/tee.png --price 19.99
//!
//! # Adjust quantities
//! mp-cli cart increment tee-1
//! mp-cli cart decrement tee-1
//!
//! # Delete the saved cart
//! mp-cli cart clear
//! ```
//!
//! # Commands
//!
//! - `cart` - Read and change the cart stored under `CART_STORAGE_DIR`

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use marketplace_core::Price;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "mp-cli")]
#[command(author, version, about = "Marketplace cart CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the saved cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
}

#[derive(Subcommand)]
enum CartAction {
    /// Print the cart contents
    Show,
    /// Add one unit of a product
    Add {
        /// Product ID
        #[arg(short, long)]
        id: String,

        /// Product title
        #[arg(short, long)]
        title: String,

        /// Product image URL
        #[arg(long)]
        image_url: String,

        /// Unit price (e.g. 19.99)
        #[arg(short, long)]
        price: Price,
    },
    /// Add one unit of a product already in the cart
    Increment {
        /// Product ID
        id: String,
    },
    /// Remove one unit of a product
    Decrement {
        /// Product ID
        id: String,
    },
    /// Delete the saved cart
    Clear,
}

/// Initialize Sentry error tracking if `SENTRY_DSN` is set.
///
/// The returned guard must be kept alive for events to be delivered.
fn init_sentry() -> Option<sentry::ClientInitGuard> {
    let dsn = std::env::var("SENTRY_DSN").ok()?;

    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    )))
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load .env before reading SENTRY_DSN or RUST_LOG
    let _ = dotenvy::dotenv();

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry();

    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "marketplace_cart=info,mp_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
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
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show().await?,
            CartAction::Add {
                id,
                title,
                image_url,
                price,
            } => {
                commands::cart::add(commands::cart::AddParams {
                    id,
                    title,
                    image_url,
                    price,
                })
                .await?;
            }
            CartAction::Increment { id } => commands::cart::increment(&id).await?,
            CartAction::Decrement { id } => commands::cart::decrement(&id).await?,
            CartAction::Clear => commands::cart::clear().await?,
        },
    }
    Ok(())
}
