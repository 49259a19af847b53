//! # watchlist-sync
//!
//! Keeps a personal watch list (RSS feeds from Letterboxd and friends) in
//! step with a Plex library. Every cycle reads the feeds, asks the library
//! which titles it already holds, records each title as `pending` or
//! `added`, announces new arrivals on Discord and keeps a single
//! "still waiting" summary message up to date.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌─────────────┐
//! │  RSS feeds  │──▶│ CatalogResolver   │──▶│  Watchlist  │──▶ watchlist.json
//! │ http / file │   │ tiers 0-3 (core) │   │ merge_cycle │
//! └─────────────┘   └────────┬─────────┘   └──────┬──────┘
//!                            ▼                    ▼
//!                      ┌──────────┐         ┌──────────┐
//!                      │   Plex   │         │ Discord  │
//!                      └──────────┘         └──────────┘
//! ```
//!
//! The matching and reconciliation logic lives in the
//! [`watchlist_sync_core`] crate; this crate supplies the I/O around it.
//!
//! ## Quick Start
//!
//! ```bash
//! wls init                     # create an empty store
//! wls check "Dune" --year 2021 # ask the library about one title
//! wls sync --dry-run           # run one cycle without side effects
//! wls watch                    # run cycles on a schedule
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Classified failure kinds |
//! | [`feed`] | RSS feed adapter |
//! | [`plex`] | Plex library client |
//! | [`notify`] | Message rendering and the notifier trait |
//! | [`discord`] | Discord notifier |
//! | [`persist`] | Atomic store persistence |
//! | [`cycle`] | One reconciliation cycle |
//! | [`schedule`] | Periodic cycle loop |
//! | [`status`] | Store overview |
//! | [`sources`] | Feed health listing |
//! | [`check`] | Single-item lookup |

pub mod check;
pub mod config;
pub mod cycle;
pub mod discord;
pub mod error;
pub mod feed;
pub mod notify;
pub mod persist;
pub mod plex;
pub mod schedule;
pub mod sources;
pub mod status;
