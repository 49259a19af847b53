//! One reconciliation cycle, end to end.
//!
//! ```text
//! load store ─▶ fetch feeds ─▶ resolve (worker pool) ─▶ merge ─▶ notify ─▶ save
//! ```
//!
//! A [`SyncService`] owns the configuration, the feed reader, the notifier
//! and a cycle guard. At most one cycle runs at a time; a cycle requested
//! while another is in progress is skipped, not queued.
//!
//! Failure handling per step:
//!
//! | Step | On failure |
//! |------|------------|
//! | Feed fetch | feed contributes nothing (logged) |
//! | Lookup tier | miss for that tier (logged) |
//! | Every lookup inconclusive | logged as library service down, merge still runs without demotion |
//! | Notification | logged, checkpoint unchanged |
//! | Store load / save | cycle fails, store on disk untouched |

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use watchlist_sync_core::models::{MatchResult, WatchItem};
use watchlist_sync_core::reconcile::{CycleOutcome, DemotionPolicy, Watchlist};
use watchlist_sync_core::resolver::{CatalogResolver, LibraryService};

use crate::config::{Config, DEFAULT_ADDED_FLOOD_THRESHOLD};
use crate::discord::DiscordNotifier;
use crate::error::SyncError;
use crate::feed::FeedReader;
use crate::notify::{render_added, render_pending, LogNotifier, Notifier};
use crate::persist::{load_document, save_document};
use crate::plex::PlexClient;

/// Summary of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Items read from all feeds.
    pub items: usize,
    /// Entries that became available this cycle.
    pub added: usize,
    pub demoted: usize,
    /// Pending entries dropped because they left every feed.
    pub removed: usize,
    /// Entries still pending after the cycle.
    pub pending: usize,
    pub failed: bool,
    /// Another cycle was already running.
    pub skipped: bool,
    pub dry_run: bool,
}

impl CycleReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    fn failed() -> Self {
        Self {
            failed: true,
            ..Self::default()
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.skipped {
            return f.write_str("cycle skipped: another cycle is running");
        }
        if self.failed {
            return f.write_str("cycle failed (see log)");
        }
        write!(
            f,
            "{}items: {}, added: {}, demoted: {}, removed: {}, pending: {}",
            if self.dry_run { "[dry run] " } else { "" },
            self.items,
            self.added,
            self.demoted,
            self.removed,
            self.pending
        )
    }
}

pub struct SyncService {
    config: Config,
    feeds: FeedReader,
    notifier: Arc<dyn Notifier>,
    library: Option<Arc<dyn LibraryService>>,
    guard: Mutex<()>,
}

impl SyncService {
    /// Build a service with the notifier the config asks for: Discord when
    /// a `[notifier]` section exists, the log otherwise.
    pub fn new(config: Config) -> Result<Self> {
        let notifier: Arc<dyn Notifier> = match &config.notifier {
            Some(n) => Arc::new(DiscordNotifier::new(n, config.library.timeout_secs)?),
            None => Arc::new(LogNotifier),
        };
        Self::with_notifier(config, notifier)
    }

    pub fn with_notifier(config: Config, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let feeds = FeedReader::new(config.library.timeout_secs)?;
        Ok(Self {
            config,
            feeds,
            notifier,
            library: None,
            guard: Mutex::new(()),
        })
    }

    /// Use `library` for every cycle instead of opening a Plex client.
    pub fn with_library(mut self, library: Arc<dyn LibraryService>) -> Self {
        self.library = Some(library);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn policy(&self) -> DemotionPolicy {
        DemotionPolicy::from_flag(self.config.reconcile.demote_missing)
    }

    fn open_library(&self) -> Result<Arc<dyn LibraryService>> {
        match &self.library {
            Some(lib) => Ok(lib.clone()),
            None => Ok(Arc::new(PlexClient::open(&self.config.library)?)),
        }
    }

    /// Resolver over a freshly opened library client.
    pub fn open_resolver(&self) -> Result<CatalogResolver> {
        let library = self.open_library()?;
        Ok(CatalogResolver::standard(
            library,
            None,
            self.config.library.page_size,
        ))
    }

    /// Run one cycle, logging instead of propagating any failure.
    pub async fn run_cycle_logged(&self, dry_run: bool) -> CycleReport {
        match self.run_cycle(dry_run).await {
            Ok(report) => {
                info!(%report, "cycle finished");
                report
            }
            Err(e) => {
                error!(error = %format!("{:#}", e), "cycle failed");
                CycleReport::failed()
            }
        }
    }

    /// Run one cycle.
    ///
    /// With `dry_run`, nothing is announced and the store is not written.
    pub async fn run_cycle(&self, dry_run: bool) -> Result<CycleReport> {
        let Ok(_guard) = self.guard.try_lock() else {
            info!("cycle already running, skipping");
            return Ok(CycleReport::skipped());
        };
        let now = Utc::now();
        let store_path = &self.config.store.path;

        let doc = load_document(store_path)?;
        let mut watchlist = Watchlist::from_document(doc, self.policy());

        let items = self.feeds.fetch_all(&self.config.feeds).await;
        info!(items = items.len(), feeds = self.config.feeds.len(), "feeds fetched");

        let results = {
            let resolver = self.open_resolver()?;
            resolve_all(&resolver, &items, self.config.library.concurrency).await
        };

        if !results.is_empty() && results.iter().all(|r| r.inconclusive) {
            let err = SyncError::LibraryServiceDown {
                items: results.len(),
            };
            error!("{}", err);
        }

        let outcome = watchlist
            .merge_cycle(&items, &results, now)
            .context("Failed to merge cycle results")?;

        let report = CycleReport {
            items: items.len(),
            added: outcome.added.len(),
            demoted: outcome.demoted.len(),
            removed: outcome.removed.len(),
            pending: watchlist.pending().len(),
            failed: false,
            skipped: false,
            dry_run,
        };

        if dry_run {
            return Ok(report);
        }

        self.notify(&mut watchlist, &outcome, now).await;

        if let Err(e) = save_document(store_path, &watchlist.to_document()) {
            error!("{}", e);
            return Err(e.into());
        }

        Ok(report)
    }

    async fn notify(&self, watchlist: &mut Watchlist, outcome: &CycleOutcome, now: DateTime<Utc>) {
        let threshold = self
            .config
            .notifier
            .as_ref()
            .map(|n| n.added_flood_threshold)
            .unwrap_or(DEFAULT_ADDED_FLOOD_THRESHOLD);

        let added = outcome.added.len();
        if added > 0 && added < threshold {
            if let Err(e) = self.notifier.send(&render_added(&outcome.added, now)).await {
                warn!(error = %format!("{:#}", e), "failed to announce added entries");
            }
        } else if added >= threshold {
            info!(added, threshold, "too many new entries at once, announcement skipped");
        }

        let summary = render_pending(&watchlist.pending(), now);
        match self
            .notifier
            .send_or_update(watchlist.checkpoint(), &summary)
            .await
        {
            Ok(checkpoint) => watchlist.set_checkpoint(checkpoint),
            Err(e) => warn!(error = %format!("{:#}", e), "failed to update pending summary"),
        }
    }
}

/// Resolve `items` with at most `concurrency` lookups in flight.
///
/// Results come back in the order of `items`. An item the resolver rejects
/// outright is treated as inconclusive so it can never cause a demotion.
pub async fn resolve_all(
    resolver: &CatalogResolver,
    items: &[WatchItem],
    concurrency: usize,
) -> Vec<MatchResult> {
    // Owned items keep the closure free of borrowed arguments, which the
    // `Send` check on the cycle future requires.
    let lookups = items.iter().cloned().enumerate().map(|(idx, item)| async move {
        let result = match resolver.resolve(&item).await {
            Ok(result) => result,
            Err(e) => {
                warn!(item = %item, error = %format!("{:#}", e), "item could not be resolved");
                MatchResult::inconclusive()
            }
        };
        (idx, result)
    });
    let mut tagged: Vec<(usize, MatchResult)> = stream::iter(lookups)
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    tagged.sort_by_key(|(idx, _)| *idx);
    tagged.into_iter().map(|(_, result)| result).collect()
}
