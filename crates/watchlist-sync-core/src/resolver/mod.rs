//! Tiered catalog resolver.
//!
//! Decides whether a [`WatchItem`] already exists in the media library by
//! walking an ordered list of [`MatchStrategy`] tiers until one produces a
//! hit:
//!
//! | Tier | Strategy | Applies when |
//! |------|----------|--------------|
//! | 0 | [`IndexLookup`] direct identifier lookup | item has `(provider, id)` |
//! | 1 | [`StrictSearch`] title search + exact identifier check | item has `(provider, id)` |
//! | 2 | [`FuzzyTitle`] normalized title + ±1 year | item has **no** identifier |
//! | 3 | [`SectionScanTier`] paginated section scan by year | item has identifier and year |
//!
//! An item that carries an identifier is never matched on title alone: a
//! homonym from another year is worse than a missed detection.
//!
//! Tier failures (network errors, timeouts) are logged and count as a miss
//! for that tier. When every attempted tier failed, the verdict is marked
//! [`inconclusive`](MatchResult::inconclusive).

mod scan;
mod tiers;

pub use scan::SectionScan;
pub use tiers::{
    candidate_has_guid, guid_matches, FuzzyTitle, IndexLookup, LibraryIdIndex, SectionScanTier,
    StrictSearch,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{MatchResult, MediaKind, WatchItem};

/// One title as reported by the library service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<i32>,
    pub kind: Option<MediaKind>,
    /// Every external identifier the library knows for this title,
    /// e.g. `imdb://tt1160419`, `tmdb://438631`.
    pub guids: Vec<String>,
}

/// A library section (a "movies" or "shows" collection).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub key: String,
    pub title: String,
    /// `None` for sections holding neither movies nor shows.
    pub kind: Option<MediaKind>,
}

/// Operations the resolver needs from the media library.
///
/// Implementations perform network I/O and are expected to enforce their
/// own per-call timeouts; any `Err` is treated as a miss for the tier that
/// issued the call.
#[async_trait]
pub trait LibraryService: Send + Sync {
    /// Titles carrying the composite identifier `guid` (`provider://id`).
    async fn search_by_identifier(&self, guid: &str) -> Result<Vec<Candidate>>;

    /// Free-text search restricted to one media kind.
    async fn search_by_title(&self, kind: MediaKind, text: &str) -> Result<Vec<Candidate>>;

    async fn list_sections(&self) -> Result<Vec<Section>>;

    /// One page of a section's titles released in `year`.
    async fn list_section_entries(
        &self,
        section_key: &str,
        year: i32,
        offset: usize,
        page_size: usize,
    ) -> Result<Vec<Candidate>>;
}

/// Optional secondary index answering identifier lookups directly.
#[async_trait]
pub trait FastIndex: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self, guid: &str) -> Result<Option<Candidate>>;
}

/// Outcome of one tier for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Hit { canonical_title: String },
    Miss,
}

/// A single matching tier.
#[async_trait]
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this tier may run for `item` at all.
    fn applies_to(&self, item: &WatchItem) -> bool;

    async fn attempt(&self, item: &WatchItem) -> Result<Attempt>;
}

/// Ordered chain of [`MatchStrategy`] tiers.
pub struct CatalogResolver {
    tiers: Vec<Box<dyn MatchStrategy>>,
}

impl CatalogResolver {
    pub fn new(tiers: Vec<Box<dyn MatchStrategy>>) -> Self {
        Self { tiers }
    }

    /// The standard four-tier chain over `library`.
    ///
    /// Without a dedicated `index`, tier 0 uses the library's own
    /// identifier search.
    pub fn standard(
        library: Arc<dyn LibraryService>,
        index: Option<Arc<dyn FastIndex>>,
        page_size: usize,
    ) -> Self {
        let index = index.unwrap_or_else(|| Arc::new(LibraryIdIndex::new(library.clone())));
        Self::new(vec![
            Box::new(IndexLookup::new(index)),
            Box::new(StrictSearch::new(library.clone())),
            Box::new(FuzzyTitle::new(library.clone())),
            Box::new(SectionScanTier::new(library, page_size)),
        ])
    }

    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|t| t.name()).collect()
    }

    /// Resolve one item.
    ///
    /// Only malformed input (no title and no identifier) is an error;
    /// lookup failures are folded into the verdict.
    pub async fn resolve(&self, item: &WatchItem) -> Result<MatchResult> {
        if item.title.trim().is_empty() && item.external_key().is_none() {
            bail!("cannot resolve an item with neither title nor identifier");
        }

        let mut attempted = 0usize;
        let mut failed = 0usize;

        for tier in &self.tiers {
            if !tier.applies_to(item) {
                continue;
            }
            attempted += 1;
            match tier.attempt(item).await {
                Ok(Attempt::Hit { canonical_title }) => {
                    info!(tier = tier.name(), item = %item, title = %canonical_title, "found in library");
                    return Ok(MatchResult::found(canonical_title));
                }
                Ok(Attempt::Miss) => {
                    debug!(tier = tier.name(), item = %item, "tier miss");
                }
                Err(e) => {
                    failed += 1;
                    warn!(tier = tier.name(), item = %item, error = %format!("{:#}", e), "lookup tier failed");
                }
            }
        }

        if attempted > 0 && failed == attempted {
            Ok(MatchResult::inconclusive())
        } else {
            Ok(MatchResult::not_found())
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory library used by resolver tests.

    use super::*;
    use crate::normalize::normalize_title;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeLibrary {
        pub titles: Vec<Candidate>,
        pub sections: Vec<(Section, Vec<Candidate>)>,
        pub failing: bool,
        /// Section pages that fail this many times before succeeding.
        pub flaky_pages: AtomicUsize,
        pub calls: Mutex<Vec<String>>,
    }

    impl FakeLibrary {
        pub fn with_titles(titles: Vec<Candidate>) -> Self {
            Self {
                titles,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) -> Result<()> {
            self.calls.lock().unwrap().push(call);
            if self.failing {
                bail!("connection refused");
            }
            Ok(())
        }
    }

    pub fn candidate(title: &str, year: i32, guids: &[&str]) -> Candidate {
        Candidate {
            title: title.to_string(),
            original_title: None,
            year: Some(year),
            kind: Some(MediaKind::Movie),
            guids: guids.iter().map(|g| g.to_string()).collect(),
        }
    }

    #[async_trait]
    impl LibraryService for FakeLibrary {
        async fn search_by_identifier(&self, guid: &str) -> Result<Vec<Candidate>> {
            self.record(format!("guid:{}", guid))?;
            Ok(self
                .titles
                .iter()
                .chain(self.sections.iter().flat_map(|(_, c)| c.iter()))
                .filter(|c| c.guids.iter().any(|g| g == guid))
                .cloned()
                .collect())
        }

        async fn search_by_title(&self, kind: MediaKind, text: &str) -> Result<Vec<Candidate>> {
            self.record(format!("search:{}:{}", kind, text))?;
            let first_word = text.split_whitespace().next().unwrap_or("");
            let needle = normalize_title(first_word);
            Ok(self
                .titles
                .iter()
                .filter(|c| c.kind.map_or(true, |k| k == kind))
                .filter(|c| normalize_title(&c.title).contains(&needle))
                .cloned()
                .collect())
        }

        async fn list_sections(&self) -> Result<Vec<Section>> {
            self.record("sections".to_string())?;
            Ok(self.sections.iter().map(|(s, _)| s.clone()).collect())
        }

        async fn list_section_entries(
            &self,
            section_key: &str,
            year: i32,
            offset: usize,
            page_size: usize,
        ) -> Result<Vec<Candidate>> {
            self.record(format!("page:{}:{}:{}", section_key, year, offset))?;
            if self.flaky_pages.load(Ordering::SeqCst) > 0 {
                self.flaky_pages.fetch_sub(1, Ordering::SeqCst);
                bail!("timed out");
            }
            let entries = self
                .sections
                .iter()
                .find(|(s, _)| s.key == section_key)
                .map(|(_, c)| c.as_slice())
                .unwrap_or(&[]);
            Ok(entries
                .iter()
                .filter(|c| c.year == Some(year))
                .skip(offset)
                .take(page_size)
                .cloned()
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{candidate, FakeLibrary};
    use super::*;

    fn dune() -> WatchItem {
        WatchItem::titled("Dune", Some(2021), MediaKind::Movie).with_id("imdb", "tt1160419")
    }

    fn resolver(lib: FakeLibrary) -> (Arc<FakeLibrary>, CatalogResolver) {
        let lib = Arc::new(lib);
        let resolver = CatalogResolver::standard(lib.clone(), None, 2);
        (lib, resolver)
    }

    #[tokio::test]
    async fn test_dune_found_by_identifier_with_library_title() {
        let (_, r) = resolver(FakeLibrary::with_titles(vec![candidate(
            "Dune (2021)",
            2021,
            &["imdb://tt1160419"],
        )]));
        let result = r.resolve(&dune()).await.unwrap();
        assert_eq!(result, MatchResult::found("Dune (2021)"));
    }

    #[tokio::test]
    async fn test_dune_with_wrong_identifier_not_matched_on_title() {
        let (lib, r) = resolver(FakeLibrary::with_titles(vec![candidate(
            "Dune",
            2021,
            &["imdb://tt9999999"],
        )]));
        let result = r.resolve(&dune()).await.unwrap();
        assert!(!result.found);
        assert!(!result.inconclusive);
        assert_eq!(result.canonical_title, None);
        // No section scan either: the fake has no sections, but the tier ran.
        assert!(lib.calls().contains(&"sections".to_string()));
    }

    #[tokio::test]
    async fn test_untagged_item_matches_on_normalized_title() {
        let (_, r) = resolver(FakeLibrary::with_titles(vec![candidate(
            "Amélie",
            2001,
            &["imdb://tt0211915"],
        )]));
        let item = WatchItem::titled("amelie!", Some(2002), MediaKind::Movie);
        let result = r.resolve(&item).await.unwrap();
        assert_eq!(result, MatchResult::found("Amélie"));
    }

    #[tokio::test]
    async fn test_untagged_item_skips_identifier_tiers() {
        let (lib, r) = resolver(FakeLibrary::default());
        let item = WatchItem::titled("Arrival", Some(2016), MediaKind::Movie);
        let result = r.resolve(&item).await.unwrap();
        assert_eq!(result, MatchResult::not_found());
        assert_eq!(lib.calls(), vec!["search:movie:Arrival".to_string()]);
    }

    #[tokio::test]
    async fn test_all_tiers_failing_is_inconclusive() {
        let (_, r) = resolver(FakeLibrary {
            failing: true,
            ..FakeLibrary::default()
        });
        let result = r.resolve(&dune()).await.unwrap();
        assert!(!result.found);
        assert!(result.inconclusive);
    }

    #[tokio::test]
    async fn test_blank_item_is_rejected() {
        let (_, r) = resolver(FakeLibrary::default());
        let item = WatchItem::titled("  ", None, MediaKind::Movie);
        assert!(r.resolve(&item).await.is_err());
    }

    #[test]
    fn test_standard_chain_order() {
        let (_, r) = resolver(FakeLibrary::default());
        assert_eq!(
            r.tier_names(),
            vec!["index-lookup", "strict-search", "fuzzy-title", "section-scan"]
        );
    }
}
