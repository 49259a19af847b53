//! # watchlist-sync core
//!
//! Pure logic for keeping a personal watch list in step with a media
//! library: the shared data model, title normalization, the tiered
//! catalog resolver, and the reconciliation store that turns per-cycle
//! verdicts into durable `pending` / `added` entries.
//!
//! This crate performs no network, filesystem, or runtime-specific I/O.
//! The library service is reached through the [`resolver::LibraryService`]
//! trait; the application crate supplies the HTTP implementation.
//!
//! ```text
//! WatchItem ──▶ CatalogResolver ──▶ MatchResult ──▶ Watchlist::merge_cycle
//!                  │ tiers 0..3                          │
//!                  ▼                                     ▼
//!            LibraryService                     CycleOutcome + Entries
//! ```

pub mod document;
pub mod models;
pub mod normalize;
pub mod reconcile;
pub mod resolver;
