//! Push Dispatch CLI.
//!
//! Runs the HTTP front door, generates VAPID keys, or sends a one-off
//! notification from the shell. See the `push_dispatch` library for the
//! core functionality.

use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use push_dispatch::notifications::VapidKeys;
use push_dispatch::{server, Audience, Config, NotificationRequest};
use std::path::PathBuf;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "push-dispatch")]
#[command(version)]
#[command(about = "Web push notification dispatch service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP front door
    Serve {
        /// Listen address (overrides PUSH_BIND_ADDR)
        #[arg(long)]
        bind: Option<String>,
        /// Subscription store file (overrides PUSH_STORE_PATH)
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Generate a VAPID key pair and print it as environment assignments
    VapidKeys {
        /// Contact URI push services can reach the sender at
        #[arg(long, default_value = "mailto:admin@example.com")]
        subject: String,
    },
    /// Send one notification and print the dispatch report
    Send {
        /// Notification title
        #[arg(long)]
        title: String,
        /// Notification body
        #[arg(long)]
        body: String,
        /// Only deliver to this user's devices
        #[arg(long)]
        user: Option<String>,
        /// Icon URL
        #[arg(long)]
        icon: Option<String>,
        /// Grouping tag
        #[arg(long)]
        tag: Option<String>,
        /// URL opened when the notification is clicked
        #[arg(long)]
        url: Option<String>,
        /// Subscription store file (overrides PUSH_STORE_PATH)
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, store } => {
            let mut config = Config::load()?;
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(store) = store {
                config.store_path = store;
            }
            log::info!(
                "Push Dispatch v{} starting (store: {})",
                env!("CARGO_PKG_VERSION"),
                config.store_path.display()
            );
            server::run(config).await
        }
        Commands::VapidKeys { subject } => {
            let keys = VapidKeys::generate();
            print!("{}", keys.env_lines(&subject));
            Ok(())
        }
        Commands::Send {
            title,
            body,
            user,
            icon,
            tag,
            url,
            store,
        } => {
            let mut config = Config::load()?;
            if let Some(store) = store {
                config.store_path = store;
            }
            let dispatcher = server::dispatcher_from_config(&config).await?;

            let mut request = NotificationRequest::new(title, body, Audience::from_owner(user));
            request.icon = icon;
            request.tag = tag;
            request.data = url.map(|url| {
                let mut data = serde_json::Map::new();
                data.insert("url".to_string(), serde_json::Value::String(url));
                data
            });

            let report = dispatcher.dispatch(&request).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}
