//! Bazaar CLI - cart session client for the delivery backend.
//!
//! # Usage
//!
//! ```bash
//! # Add an item to the guest cart
//! bazaar cart add p1 --name "Shawarma" --price 10 --store-id s1 --quantity 2
//!
//! # Sign in and merge the guest cart into the user's cart
//! bazaar session login u-42 --token "$TOKEN"
//!
//! # Delivery estimate from a store to the selected address
//! bazaar address set Home 51.5074 -0.1278
//! bazaar eta 51.5155 -0.0922
//! ```
//!
//! # Commands
//!
//! - `session` - Sign in, sign out, show identities
//! - `cart` - Show and change the cart
//! - `address` - Selected delivery address
//! - `eta` - Distance and delivery time to the selected address
//! - `queue` - Offline request queue

#![cfg_attr(not(test), forbid(unsafe_code))]

use bazaar_client::ClientConfig;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "bazaar")]
#[command(author, version, about = "Bazaar cart client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and out
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Show and change the cart
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Selected delivery address
    Address {
        #[command(subcommand)]
        action: AddressAction,
    },
    /// Estimate delivery from a store to the selected address
    Eta {
        /// Store latitude in degrees
        #[arg(allow_negative_numbers = true)]
        store_lat: f64,
        /// Store longitude in degrees
        #[arg(allow_negative_numbers = true)]
        store_lon: f64,
    },
    /// Offline request queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Store the user ID (and token) and merge the guest cart
    Login {
        /// User ID issued by the backend
        user_id: String,

        /// Bearer token for subsequent requests
        #[arg(short, long)]
        token: Option<String>,
    },
    /// Forget the signed-in user and token
    Logout,
    /// Show the stored identities
    Show,
}

#[derive(Subcommand)]
enum CartAction {
    /// Load and print the cart
    Show,
    /// Add an item (quantity is a delta)
    Add {
        /// Product ID
        product_id: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Unit price
        #[arg(long)]
        price: Decimal,

        /// Store the product belongs to
        #[arg(long)]
        store_id: String,

        /// Store category (`restaurant`, `grocery`, ...)
        #[arg(long, default_value = "")]
        store_type: String,

        /// Image URL
        #[arg(long)]
        image: Option<String>,

        /// Quantity to add; negative values subtract
        #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Set an item's quantity (0 removes it)
    Update {
        /// Product ID
        product_id: String,

        /// New quantity
        #[arg(allow_negative_numbers = true)]
        quantity: i64,
    },
    /// Remove an item
    Remove {
        /// Product ID
        product_id: String,
    },
    /// Delete the whole cart
    Clear,
    /// Merge the stored guest cart into the signed-in user's cart
    Merge,
}

#[derive(Subcommand)]
enum AddressAction {
    /// Select the delivery address
    Set {
        /// Label shown to the user
        label: String,
        /// Latitude in degrees
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        /// Longitude in degrees
        #[arg(allow_negative_numbers = true)]
        lon: f64,
    },
    /// Show the selected address
    Show,
}

#[derive(Subcommand)]
enum QueueAction {
    /// List queued requests
    List,
    /// Replay queued requests
    Flush,
    /// Drop every queued request
    Clear,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
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
    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt::init();
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "bazaar_client=info,bazaar_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), commands::CommandError> {
    let ctx = commands::Context::new(&config).await?;

    match cli.command {
        Commands::Session { action } => match action {
            SessionAction::Login { user_id, token } => {
                commands::session::login(&ctx, &config, user_id, token).await?;
            }
            SessionAction::Logout => commands::session::logout(&ctx).await?,
            SessionAction::Show => commands::session::show(&ctx).await?,
        },
        Commands::Cart { action } => match action {
            CartAction::Show => commands::cart::show(&ctx).await,
            CartAction::Add {
                product_id,
                name,
                price,
                store_id,
                store_type,
                image,
                quantity,
            } => {
                let item = commands::cart::NewItem {
                    product_id,
                    name,
                    price,
                    store_id,
                    store_type,
                    image,
                };
                commands::cart::add(&ctx, item, quantity).await?;
            }
            CartAction::Update {
                product_id,
                quantity,
            } => commands::cart::update(&ctx, product_id, quantity).await?,
            CartAction::Remove { product_id } => commands::cart::remove(&ctx, product_id).await,
            CartAction::Clear => commands::cart::clear(&ctx).await,
            CartAction::Merge => commands::cart::merge(&ctx).await?,
        },
        Commands::Address { action } => match action {
            AddressAction::Set { label, lat, lon } => {
                commands::address::set(&ctx, label, lat, lon).await?;
            }
            AddressAction::Show => commands::address::show(&ctx).await?,
        },
        Commands::Eta {
            store_lat,
            store_lon,
        } => commands::eta::estimate(&ctx, store_lat, store_lon).await?,
        Commands::Queue { action } => match action {
            QueueAction::List => commands::queue::list(&ctx).await?,
            QueueAction::Flush => commands::queue::flush(&ctx).await?,
            QueueAction::Clear => commands::queue::clear(&ctx).await?,
        },
    }
    Ok(())
}
