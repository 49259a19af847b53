//! Reconciliation store: merges per-cycle resolver verdicts into the
//! tracked entry set.
//!
//! # State machine
//!
//! ```text
//!            found                      not found (Demote policy only,
//!  (new) ─────────────▶ added ◀──┐      definitive results only)
//!    │                    │      │ found
//!    │ not found          ▼      │
//!    └──────────────▶ pending ───┘
//!                         │
//!                         ▼ absent from the current feed
//!                      removed
//! ```
//!
//! `added` entries are never removed by cleanup. The list returned in
//! [`CycleOutcome::added`] is transition-based: an entry that was already
//! `added` before the cycle is never reported again.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::document::StoreDocument;
use crate::models::{Entry, EntryStatus, MatchResult, MediaKind, WatchItem};

/// What happens to an `added` entry whose item is no longer found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DemotionPolicy {
    /// Keep `added` as a permanent record of availability.
    #[default]
    Retain,
    /// Move back to `pending` and clear `addedAt`.
    Demote,
}

impl DemotionPolicy {
    pub fn from_flag(demote_missing: bool) -> Self {
        if demote_missing {
            DemotionPolicy::Demote
        } else {
            DemotionPolicy::Retain
        }
    }
}

/// Changes made by one [`Watchlist::merge_cycle`] call.
#[derive(Debug, Clone, Default)]
pub struct CycleOutcome {
    /// Entries that became `added` during this cycle, in feed order.
    pub added: Vec<Entry>,
    /// Entries moved back to `pending`.
    pub demoted: Vec<Entry>,
    /// `pending` entries dropped because their item left the feed.
    pub removed: Vec<Entry>,
    pub created: usize,
    pub retitled: usize,
}

/// The tracked entry set plus the notifier checkpoint.
#[derive(Debug, Clone, Default)]
pub struct Watchlist {
    entries: Vec<Entry>,
    checkpoint: Option<String>,
    policy: DemotionPolicy,
}

impl Watchlist {
    pub fn new(policy: DemotionPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn from_document(doc: StoreDocument, policy: DemotionPolicy) -> Self {
        Self {
            entries: doc.entries,
            checkpoint: doc.notifier_checkpoint,
            policy,
        }
    }

    pub fn to_document(&self) -> StoreDocument {
        StoreDocument {
            notifier_checkpoint: self.checkpoint.clone(),
            entries: self.entries.clone(),
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn policy(&self) -> DemotionPolicy {
        self.policy
    }

    pub fn checkpoint(&self) -> Option<&str> {
        self.checkpoint.as_deref()
    }

    pub fn set_checkpoint(&mut self, checkpoint: Option<String>) {
        self.checkpoint = checkpoint;
    }

    pub fn pending(&self) -> Vec<Entry> {
        self.with_status(EntryStatus::Pending)
    }

    pub fn added(&self) -> Vec<Entry> {
        self.with_status(EntryStatus::Added)
    }

    fn with_status(&self, status: EntryStatus) -> Vec<Entry> {
        self.entries
            .iter()
            .filter(|e| e.status == status)
            .cloned()
            .collect()
    }

    /// Number of pending entries of the given kind.
    pub fn pending_count(&self, kind: MediaKind) -> usize {
        self.entries
            .iter()
            .filter(|e| e.is_pending() && e.kind == kind)
            .count()
    }

    /// Merge one cycle's items and their verdicts.
    ///
    /// `items[i]` must have been resolved to `results[i]`; a length
    /// mismatch is rejected. Items are processed in order, so duplicates
    /// within a cycle collapse onto the entry created by the first one.
    pub fn merge_cycle(
        &mut self,
        items: &[WatchItem],
        results: &[MatchResult],
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome> {
        if items.len() != results.len() {
            bail!(
                "merge_cycle: {} items but {} results",
                items.len(),
                results.len()
            );
        }

        let mut outcome = CycleOutcome::default();
        let mut promoted: Vec<usize> = Vec::new();

        for (item, result) in items.iter().zip(results) {
            let Some(idx) = self.entries.iter().position(|e| e.is_same_item(item)) else {
                let entry = Entry::from_item(item, result, now);
                if entry.is_added() {
                    info!(item = %item, title = %entry.title, "new entry already in library");
                    promoted.push(self.entries.len());
                } else {
                    info!(item = %item, "new entry pending");
                }
                self.entries.push(entry);
                outcome.created += 1;
                continue;
            };

            let entry = &mut self.entries[idx];

            if entry.external_key().is_none() {
                if let Some((provider, id)) = item.external_key() {
                    debug!(title = %entry.title, provider, id, "entry adopts feed identifier");
                    entry.provider = Some(provider.to_string());
                    entry.id = Some(id.to_string());
                }
            }

            if result.found {
                if let Some(canonical) = &result.canonical_title {
                    if entry.title != *canonical {
                        info!(from = %entry.title, to = %canonical, "title upgraded to library title");
                        entry.title = canonical.clone();
                        outcome.retitled += 1;
                    }
                }
                if entry.is_pending() {
                    entry.status = EntryStatus::Added;
                    entry.added_at = Some(now);
                    info!(title = %entry.title, "entry now available");
                    promoted.push(idx);
                }
            } else if entry.is_added()
                && !result.inconclusive
                && self.policy == DemotionPolicy::Demote
            {
                entry.status = EntryStatus::Pending;
                entry.added_at = None;
                info!(title = %entry.title, "entry no longer in library, demoted to pending");
                outcome.demoted.push(entry.clone());
            }

            if entry.title != item.title {
                entry.source_title = Some(item.title.clone());
            }
        }

        // Collected before cleanup: cleanup only removes pending entries,
        // so promoted indices stay valid.
        let mut seen = Vec::with_capacity(promoted.len());
        for idx in promoted {
            if !seen.contains(&idx) && self.entries[idx].is_added() {
                seen.push(idx);
                outcome.added.push(self.entries[idx].clone());
            }
        }

        let (kept, removed): (Vec<Entry>, Vec<Entry>) =
            std::mem::take(&mut self.entries)
                .into_iter()
                .partition(|entry| entry.is_added() || items.iter().any(|it| entry.is_same_item(it)));
        for entry in &removed {
            info!(title = %entry.title, "removed pending entry no longer in any feed");
        }
        self.entries = kept;
        outcome.removed = removed;

        debug!(
            created = outcome.created,
            added = outcome.added.len(),
            demoted = outcome.demoted.len(),
            removed = outcome.removed.len(),
            retitled = outcome.retitled,
            "merge complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn dune() -> WatchItem {
        WatchItem::titled("Dune", Some(2021), MediaKind::Movie).with_id("imdb", "tt1160419")
    }

    fn arrival() -> WatchItem {
        WatchItem::titled("Arrival", Some(2016), MediaKind::Movie)
    }

    #[test]
    fn test_new_found_item_is_added_with_canonical_title() {
        let mut wl = Watchlist::new(DemotionPolicy::Retain);
        let now = Utc::now();
        let out = wl
            .merge_cycle(&[dune()], &[MatchResult::found("Dune (2021)")], now)
            .unwrap();

        assert_eq!(out.created, 1);
        assert_eq!(out.added.len(), 1);
        let entry = &wl.entries()[0];
        assert_eq!(entry.title, "Dune (2021)");
        assert_eq!(entry.status, EntryStatus::Added);
        assert_eq!(entry.added_at, Some(now));
    }

    #[test]
    fn test_new_missing_item_is_pending() {
        let mut wl = Watchlist::new(DemotionPolicy::Retain);
        let out = wl
            .merge_cycle(&[dune()], &[MatchResult::not_found()], Utc::now())
            .unwrap();

        assert!(out.added.is_empty());
        assert_eq!(wl.entries()[0].status, EntryStatus::Pending);
        assert_eq!(wl.entries()[0].added_at, None);
        assert_eq!(wl.entries()[0].title, "Dune");
    }

    #[test]
    fn test_same_external_id_collapses_into_one_entry() {
        let mut wl = Watchlist::new(DemotionPolicy::Retain);
        let renamed =
            WatchItem::titled("Dune: Part One", Some(2021), MediaKind::Movie).with_id("imdb", "tt1160419");
        wl.merge_cycle(
            &[dune(), renamed],
            &[MatchResult::not_found(), MatchResult::not_found()],
            Utc::now(),
        )
        .unwrap();

        assert_eq!(wl.entries().len(), 1);
    }

    #[test]
    fn test_pending_promoted_once_then_idempotent() {
        let mut wl = Watchlist::new(DemotionPolicy::Retain);
        let t0 = Utc::now();
        wl.merge_cycle(&[dune()], &[MatchResult::not_found()], t0).unwrap();

        let t1 = t0 + Duration::hours(24);
        let out = wl
            .merge_cycle(&[dune()], &[MatchResult::found("Dune (2021)")], t1)
            .unwrap();
        assert_eq!(out.added.len(), 1);
        assert_eq!(out.added[0].title, "Dune (2021)");
        assert_eq!(out.retitled, 1);
        assert_eq!(wl.entries()[0].added_at, Some(t1));

        let before = wl.entries().to_vec();
        let t2 = t1 + Duration::hours(24);
        let out = wl
            .merge_cycle(&[dune()], &[MatchResult::found("Dune (2021)")], t2)
            .unwrap();
        assert!(out.added.is_empty());
        assert_eq!(out.retitled, 0);
        assert_eq!(wl.entries(), before.as_slice());
    }

    #[test]
    fn test_repeated_unchanged_cycles_change_nothing() {
        let mut wl = Watchlist::new(DemotionPolicy::Demote);
        let items = [dune(), arrival()];
        let results = [MatchResult::found("Dune (2021)"), MatchResult::not_found()];
        let t0 = Utc::now();
        wl.merge_cycle(&items, &results, t0).unwrap();
        let snapshot = wl.entries().to_vec();

        let out = wl
            .merge_cycle(&items, &results, t0 + Duration::hours(1))
            .unwrap();
        assert!(out.added.is_empty());
        assert!(out.demoted.is_empty());
        assert!(out.removed.is_empty());
        assert_eq!(out.created, 0);
        assert_eq!(wl.entries(), snapshot.as_slice());
    }

    #[test]
    fn test_cleanup_drops_pending_keeps_added() {
        let mut wl = Watchlist::new(DemotionPolicy::Retain);
        wl.merge_cycle(
            &[dune(), arrival()],
            &[MatchResult::found("Dune (2021)"), MatchResult::not_found()],
            Utc::now(),
        )
        .unwrap();

        let out = wl.merge_cycle(&[], &[], Utc::now()).unwrap();
        assert_eq!(out.removed.len(), 1);
        assert_eq!(out.removed[0].title, "Arrival");
        assert_eq!(wl.entries().len(), 1);
        assert_eq!(wl.entries()[0].title, "Dune (2021)");
    }

    #[test]
    fn test_retain_policy_keeps_added_when_missing() {
        let mut wl = Watchlist::new(DemotionPolicy::Retain);
        wl.merge_cycle(&[dune()], &[MatchResult::found("Dune (2021)")], Utc::now())
            .unwrap();
        let out = wl
            .merge_cycle(&[dune()], &[MatchResult::not_found()], Utc::now())
            .unwrap();

        assert!(out.demoted.is_empty());
        assert!(wl.entries()[0].is_added());
        assert!(wl.entries()[0].added_at.is_some());
    }

    #[test]
    fn test_demote_policy_moves_back_to_pending() {
        let mut wl = Watchlist::new(DemotionPolicy::Demote);
        wl.merge_cycle(&[dune()], &[MatchResult::found("Dune (2021)")], Utc::now())
            .unwrap();
        let out = wl
            .merge_cycle(&[dune()], &[MatchResult::not_found()], Utc::now())
            .unwrap();

        assert_eq!(out.demoted.len(), 1);
        let entry = &wl.entries()[0];
        assert!(entry.is_pending());
        assert_eq!(entry.added_at, None);
        // Library title is kept after demotion.
        assert_eq!(entry.title, "Dune (2021)");
    }

    #[test]
    fn test_inconclusive_result_never_demotes() {
        let mut wl = Watchlist::new(DemotionPolicy::Demote);
        wl.merge_cycle(&[dune()], &[MatchResult::found("Dune (2021)")], Utc::now())
            .unwrap();
        let out = wl
            .merge_cycle(&[dune()], &[MatchResult::inconclusive()], Utc::now())
            .unwrap();

        assert!(out.demoted.is_empty());
        assert!(wl.entries()[0].is_added());
    }

    #[test]
    fn test_title_matched_entry_survives_title_upgrade() {
        let mut wl = Watchlist::new(DemotionPolicy::Demote);
        let amelie = WatchItem::titled("Amélie", Some(2001), MediaKind::Movie);
        wl.merge_cycle(
            &[amelie.clone()],
            &[MatchResult::found("Le Fabuleux Destin d'Amélie Poulain")],
            Utc::now(),
        )
        .unwrap();

        let out = wl
            .merge_cycle(&[amelie.clone()], &[MatchResult::not_found()], Utc::now())
            .unwrap();
        assert_eq!(out.created, 0);
        assert_eq!(out.demoted.len(), 1);

        // Demoted entry is still recognised by its feed title, so it is not
        // cleaned up while the feed still lists it.
        let out = wl
            .merge_cycle(&[amelie], &[MatchResult::not_found()], Utc::now())
            .unwrap();
        assert!(out.removed.is_empty());
        assert_eq!(wl.entries().len(), 1);
    }

    #[test]
    fn test_title_matched_entry_adopts_identifier() {
        let mut wl = Watchlist::new(DemotionPolicy::Retain);
        let now = Utc::now();
        wl.merge_cycle(&[arrival()], &[MatchResult::not_found()], now)
            .unwrap();
        assert_eq!(wl.entries()[0].external_key(), None);

        let tagged = arrival().with_id("tmdb", "329865");
        let out = wl
            .merge_cycle(&[tagged], &[MatchResult::not_found()], now)
            .unwrap();
        assert_eq!(out.created, 0);
        assert_eq!(wl.entries().len(), 1);
        assert_eq!(wl.entries()[0].external_key(), Some(("tmdb", "329865")));

        // Identity is now id-based: a retitled feed item still matches.
        let retitled = WatchItem::titled("Story of Your Life", Some(2016), MediaKind::Movie)
            .with_id("tmdb", "329865");
        let out = wl
            .merge_cycle(&[retitled], &[MatchResult::not_found()], now)
            .unwrap();
        assert_eq!(out.created, 0);
        assert!(out.removed.is_empty());
        assert_eq!(wl.entries().len(), 1);
    }

    #[test]
    fn test_duplicate_found_items_notify_once() {
        let mut wl = Watchlist::new(DemotionPolicy::Retain);
        wl.merge_cycle(&[dune()], &[MatchResult::not_found()], Utc::now())
            .unwrap();
        let out = wl
            .merge_cycle(
                &[dune(), dune()],
                &[MatchResult::found("Dune (2021)"), MatchResult::found("Dune (2021)")],
                Utc::now(),
            )
            .unwrap();
        assert_eq!(out.added.len(), 1);
    }

    #[test]
    fn test_added_list_follows_feed_order() {
        let mut wl = Watchlist::new(DemotionPolicy::Retain);
        let out = wl
            .merge_cycle(
                &[arrival(), dune()],
                &[MatchResult::found("Arrival"), MatchResult::found("Dune (2021)")],
                Utc::now(),
            )
            .unwrap();
        let titles: Vec<_> = out.added.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Arrival", "Dune (2021)"]);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let mut wl = Watchlist::new(DemotionPolicy::Retain);
        assert!(wl.merge_cycle(&[dune()], &[], Utc::now()).is_err());
    }

    #[test]
    fn test_document_round_trip_keeps_checkpoint() {
        let mut wl = Watchlist::new(DemotionPolicy::Retain);
        wl.merge_cycle(&[dune()], &[MatchResult::not_found()], Utc::now())
            .unwrap();
        wl.set_checkpoint(Some("42".to_string()));

        let doc = wl.to_document();
        let back = Watchlist::from_document(doc.clone(), DemotionPolicy::Retain);
        assert_eq!(back.checkpoint(), Some("42"));
        assert_eq!(back.entries(), wl.entries());
        assert_eq!(back.pending_count(MediaKind::Movie), 1);
        assert_eq!(back.pending_count(MediaKind::Show), 0);
    }
}
