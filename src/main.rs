//! # watchlist-sync CLI (`wls`)
//!
//! ## Usage
//!
//! ```bash
//! wls --config ./config/wls.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wls init` | Create an empty store if none exists |
//! | `wls sync [--dry-run]` | Run exactly one cycle and print the report |
//! | `wls watch` | Run cycles on the configured schedule until Ctrl-C |
//! | `wls status` | Show tracked entries and pending counts |
//! | `wls feeds` | Fetch each feed and show its item count |
//! | `wls check <title>` | Ask the library about one title |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use watchlist_sync::check;
use watchlist_sync::config;
use watchlist_sync::cycle::SyncService;
use watchlist_sync::notify::LogNotifier;
use watchlist_sync::persist;
use watchlist_sync::schedule;
use watchlist_sync::sources;
use watchlist_sync::status::{self, StatusFilter};
use watchlist_sync_core::models::{EntryStatus, MediaKind, WatchItem};

/// watchlist-sync: keep a watch list in step with a Plex library.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/wls.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "wls",
    about = "Keep a personal watch list in step with a Plex library",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/wls.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty store document if none exists.
    Init,

    /// Run exactly one reconciliation cycle.
    Sync {
        /// Resolve and merge, but neither notify nor write the store.
        #[arg(long)]
        dry_run: bool,
    },

    /// Run cycles on the configured schedule until Ctrl-C.
    Watch,

    /// Show tracked entries.
    Status {
        /// Only show this media type.
        #[arg(long = "type", value_enum)]
        kind: Option<KindArg>,

        /// Only show entries with this status.
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
    },

    /// Fetch every configured feed and report its item count.
    Feeds,

    /// Resolve one title against the library and print the verdict.
    Check {
        title: String,

        #[arg(long)]
        year: Option<i32>,

        #[arg(long = "type", value_enum, default_value = "movie")]
        kind: KindArg,

        /// External id provider (imdb, tmdb, tvdb). Requires `--id`.
        #[arg(long, requires = "id")]
        provider: Option<String>,

        /// External id, e.g. `tt1160419`. Requires `--provider`.
        #[arg(long, requires = "provider")]
        id: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Movie,
    Show,
}

impl From<KindArg> for MediaKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Movie => MediaKind::Movie,
            KindArg::Show => MediaKind::Show,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Pending,
    Added,
}

impl From<StatusArg> for EntryStatus {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Pending => EntryStatus::Pending,
            StatusArg::Added => EntryStatus::Added,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let path = &cfg.store.path;
            if persist::init_store(path)? {
                println!("Store created at {}", path.display());
            } else {
                println!("Store already exists at {}", path.display());
            }
        }
        Commands::Sync { dry_run } => {
            let service = SyncService::new(cfg)?;
            let report = service.run_cycle(dry_run).await?;
            println!("{}", report);
        }
        Commands::Watch => {
            let service = Arc::new(SyncService::new(cfg)?);
            let shutdown = schedule::shutdown_on_ctrl_c();
            let cycles = schedule::run_scheduler(service, shutdown).await?;
            println!("Stopped after {} cycle(s).", cycles);
        }
        Commands::Status {
            kind,
            status: wanted,
        } => {
            let filter = StatusFilter {
                kind: kind.map(Into::into),
                status: wanted.map(Into::into),
            };
            status::run_status(&cfg, filter)?;
        }
        Commands::Feeds => {
            sources::list_feeds(&cfg).await?;
        }
        Commands::Check {
            title,
            year,
            kind,
            provider,
            id,
        } => {
            let mut item = WatchItem::titled(title, year, kind.into());
            if let (Some(provider), Some(id)) = (provider, id) {
                item = item.with_id(provider.to_ascii_lowercase(), id);
            }
            let service = SyncService::with_notifier(cfg, Arc::new(LogNotifier))
                .context("Failed to set up library access")?;
            check::run_check(&service, &item).await?;
        }
    }

    Ok(())
}
