//! The four standard matching tiers.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::scan::SectionScan;
use super::{Attempt, Candidate, FastIndex, LibraryService, MatchStrategy};
use crate::models::WatchItem;
use crate::normalize::{titles_match, years_compatible};

/// Consecutive failures tolerated on one section page before tier 3 gives up.
const MAX_PAGE_RETRIES: usize = 2;

/// Does the library identifier `candidate` denote `provider://id`?
///
/// Exact comparison only, so `imdb://tt1` never matches `imdb://tt12`. The
/// one exception is legacy IMDb agent identifiers such as
/// `com.plexapp.agents.imdb://tt1160419?lang=en`, accepted when their last
/// path segment equals the `tt…` id exactly.
pub fn guid_matches(provider: &str, id: &str, candidate: &str) -> bool {
    if candidate == format!("{}://{}", provider, id) {
        return true;
    }
    if provider.eq_ignore_ascii_case("imdb") && id.starts_with("tt") {
        let bare = candidate.split('?').next().unwrap_or(candidate);
        return bare.contains("imdb") && bare.rsplit('/').next() == Some(id);
    }
    false
}

/// Whether any of the candidate's identifiers denotes `provider://id`.
pub fn candidate_has_guid(candidate: &Candidate, provider: &str, id: &str) -> bool {
    candidate
        .guids
        .iter()
        .any(|g| guid_matches(provider, id, g))
}

/// [`FastIndex`] backed by the library's own identifier search.
pub struct LibraryIdIndex {
    library: Arc<dyn LibraryService>,
}

impl LibraryIdIndex {
    pub fn new(library: Arc<dyn LibraryService>) -> Self {
        Self { library }
    }
}

#[async_trait]
impl FastIndex for LibraryIdIndex {
    fn name(&self) -> &str {
        "library"
    }

    /// First candidate that really carries `guid`; the server may ignore
    /// the filter and answer with unrelated titles.
    async fn lookup(&self, guid: &str) -> Result<Option<Candidate>> {
        let candidates = self.library.search_by_identifier(guid).await?;
        let wanted = guid.split_once("://");
        Ok(candidates.into_iter().find(|c| match wanted {
            Some((provider, id)) => candidate_has_guid(c, provider, id),
            None => c.guids.iter().any(|g| g == guid),
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tier 0
// ═══════════════════════════════════════════════════════════════════════

/// Direct identifier lookup. The returned title must itself carry the
/// identifier; an index answering with something else is a miss.
pub struct IndexLookup {
    index: Arc<dyn FastIndex>,
}

impl IndexLookup {
    pub fn new(index: Arc<dyn FastIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl MatchStrategy for IndexLookup {
    fn name(&self) -> &str {
        "index-lookup"
    }

    fn applies_to(&self, item: &WatchItem) -> bool {
        item.external_key().is_some()
    }

    async fn attempt(&self, item: &WatchItem) -> Result<Attempt> {
        let Some((provider, id)) = item.external_key() else {
            return Ok(Attempt::Miss);
        };
        let guid = format!("{}://{}", provider, id);
        let hit = self
            .index
            .lookup(&guid)
            .await
            .with_context(|| format!("{} index lookup for {}", self.index.name(), guid))?;

        Ok(match hit {
            Some(c) if candidate_has_guid(&c, provider, id) => Attempt::Hit {
                canonical_title: c.title,
            },
            _ => Attempt::Miss,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tier 1
// ═══════════════════════════════════════════════════════════════════════

/// Type-scoped title search; a candidate is accepted only on an exact
/// identifier match, never on title similarity.
pub struct StrictSearch {
    library: Arc<dyn LibraryService>,
}

impl StrictSearch {
    pub fn new(library: Arc<dyn LibraryService>) -> Self {
        Self { library }
    }
}

#[async_trait]
impl MatchStrategy for StrictSearch {
    fn name(&self) -> &str {
        "strict-search"
    }

    fn applies_to(&self, item: &WatchItem) -> bool {
        item.external_key().is_some() && !item.title.trim().is_empty()
    }

    async fn attempt(&self, item: &WatchItem) -> Result<Attempt> {
        let Some((provider, id)) = item.external_key() else {
            return Ok(Attempt::Miss);
        };
        let candidates = self
            .library
            .search_by_title(item.kind, &item.title)
            .await
            .with_context(|| format!("title search for \"{}\"", item.title))?;

        Ok(candidates
            .into_iter()
            .find(|c| candidate_has_guid(c, provider, id))
            .map_or(Attempt::Miss, |c| Attempt::Hit {
                canonical_title: c.title,
            }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tier 2
// ═══════════════════════════════════════════════════════════════════════

/// Normalized title equality (primary or original title) within one year.
/// Only for items without an identifier.
pub struct FuzzyTitle {
    library: Arc<dyn LibraryService>,
}

impl FuzzyTitle {
    pub fn new(library: Arc<dyn LibraryService>) -> Self {
        Self { library }
    }
}

#[async_trait]
impl MatchStrategy for FuzzyTitle {
    fn name(&self) -> &str {
        "fuzzy-title"
    }

    fn applies_to(&self, item: &WatchItem) -> bool {
        item.external_key().is_none()
    }

    async fn attempt(&self, item: &WatchItem) -> Result<Attempt> {
        let candidates = self
            .library
            .search_by_title(item.kind, &item.title)
            .await
            .with_context(|| format!("title search for \"{}\"", item.title))?;

        let hit = candidates.into_iter().find(|c| {
            years_compatible(item.year, c.year)
                && (titles_match(&item.title, &c.title)
                    || c
                        .original_title
                        .as_deref()
                        .is_some_and(|original| titles_match(&item.title, original)))
        });

        Ok(hit.map_or(Attempt::Miss, |c| Attempt::Hit {
            canonical_title: c.title,
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Tier 3
// ═══════════════════════════════════════════════════════════════════════

/// Exhaustive scan of the item's sections over `[year-1, year+1]`, for
/// when the search index lags behind the library.
pub struct SectionScanTier {
    library: Arc<dyn LibraryService>,
    page_size: usize,
}

impl SectionScanTier {
    pub fn new(library: Arc<dyn LibraryService>, page_size: usize) -> Self {
        Self {
            library,
            page_size: page_size.max(1),
        }
    }
}

#[async_trait]
impl MatchStrategy for SectionScanTier {
    fn name(&self) -> &str {
        "section-scan"
    }

    fn applies_to(&self, item: &WatchItem) -> bool {
        item.external_key().is_some() && item.year.is_some()
    }

    async fn attempt(&self, item: &WatchItem) -> Result<Attempt> {
        let (Some((provider, id)), Some(year)) = (item.external_key(), item.year) else {
            return Ok(Attempt::Miss);
        };

        let sections: Vec<_> = self
            .library
            .list_sections()
            .await
            .context("listing library sections")?
            .into_iter()
            .filter(|s| s.kind == Some(item.kind))
            .collect();

        let mut scan = SectionScan::new(self.library.as_ref(), sections, year, self.page_size);
        let mut failures = 0usize;

        loop {
            match scan.next_page().await {
                Ok(None) => return Ok(Attempt::Miss),
                Ok(Some(page)) => {
                    failures = 0;
                    if let Some(c) = page.into_iter().find(|c| candidate_has_guid(c, provider, id)) {
                        return Ok(Attempt::Hit {
                            canonical_title: c.title,
                        });
                    }
                }
                Err(e) => {
                    failures += 1;
                    if failures > MAX_PAGE_RETRIES {
                        return Err(e.context(format!("section scan stopped at {}", scan)));
                    }
                    warn!(position = %scan, error = %e, "section page failed, retrying");
                }
            }
        }
    }
}
