//! Core data models shared by the resolver and the reconciliation store.
//!
//! [`WatchItem`] and [`MatchResult`] are transient: they are produced fresh
//! every cycle and never persisted. [`Entry`] is the durable record kept in
//! the store document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of media a watch item refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Show,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Show => "show",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" => Ok(MediaKind::Movie),
            "show" => Ok(MediaKind::Show),
            other => anyhow::bail!("Unknown media type: '{}'. Must be movie or show.", other),
        }
    }
}

/// A single desired title produced by a feed for the current cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchItem {
    pub title: String,
    pub year: Option<i32>,
    pub kind: MediaKind,
    /// Catalog the identifier belongs to (`imdb`, `tmdb`, `tvdb`).
    pub provider: Option<String>,
    pub external_id: Option<String>,
}

impl WatchItem {
    /// Convenience constructor for an item without an external identifier.
    pub fn titled(title: impl Into<String>, year: Option<i32>, kind: MediaKind) -> Self {
        Self {
            title: title.into(),
            year,
            kind,
            provider: None,
            external_id: None,
        }
    }

    /// Attach a `(provider, id)` pair.
    pub fn with_id(mut self, provider: impl Into<String>, id: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self.external_id = Some(id.into());
        self
    }

    /// The `(provider, id)` pair, when both halves are present and non-empty.
    pub fn external_key(&self) -> Option<(&str, &str)> {
        external_key(self.provider.as_deref(), self.external_id.as_deref())
    }

    /// Composite identifier in the library's form, e.g. `imdb://tt1160419`.
    pub fn guid(&self) -> Option<String> {
        self.external_key()
            .map(|(provider, id)| format!("{}://{}", provider, id))
    }
}

impl fmt::Display for WatchItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.year {
            Some(year) => write!(f, "\"{}\" ({})", self.title, year)?,
            None => write!(f, "\"{}\"", self.title)?,
        }
        if let Some(guid) = self.guid() {
            write!(f, " [{}]", guid)?;
        }
        Ok(())
    }
}

/// Verdict for one watch item in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    pub found: bool,
    /// Title as the library knows it, when found.
    pub canonical_title: Option<String>,
    /// Set when every attempted tier failed with an error, so `found = false`
    /// says nothing about the library's contents.
    pub inconclusive: bool,
}

impl MatchResult {
    pub fn found(canonical_title: impl Into<String>) -> Self {
        Self {
            found: true,
            canonical_title: Some(canonical_title.into()),
            inconclusive: false,
        }
    }

    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn inconclusive() -> Self {
        Self {
            inconclusive: true,
            ..Self::default()
        }
    }
}

/// Lifecycle status of a tracked entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Added,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryStatus::Pending => f.write_str("pending"),
            EntryStatus::Added => f.write_str("added"),
        }
    }
}

impl FromStr for EntryStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(EntryStatus::Pending),
            "added" => Ok(EntryStatus::Added),
            other => anyhow::bail!("Unknown status: '{}'. Must be pending or added.", other),
        }
    }
}

/// A tracked watch-list entry, persisted across cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub title: String,
    /// Feed title the entry was created from, kept once `title` has been
    /// replaced by the library's canonical title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    pub year: Option<i32>,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub provider: Option<String>,
    pub id: Option<String>,
    pub status: EntryStatus,
    pub added_at: Option<DateTime<Utc>>,
}

impl Entry {
    /// Build a fresh entry for `item` from its first resolution.
    pub fn from_item(item: &WatchItem, result: &MatchResult, now: DateTime<Utc>) -> Self {
        let canonical = result
            .canonical_title
            .as_ref()
            .filter(|_| result.found)
            .cloned();
        let source_title = canonical
            .as_ref()
            .filter(|title| **title != item.title)
            .map(|_| item.title.clone());

        Self {
            title: canonical.unwrap_or_else(|| item.title.clone()),
            source_title,
            year: item.year,
            kind: item.kind,
            provider: item.provider.clone(),
            id: item.external_id.clone(),
            status: if result.found {
                EntryStatus::Added
            } else {
                EntryStatus::Pending
            },
            added_at: if result.found { Some(now) } else { None },
        }
    }

    pub fn external_key(&self) -> Option<(&str, &str)> {
        external_key(self.provider.as_deref(), self.id.as_deref())
    }

    pub fn is_pending(&self) -> bool {
        self.status == EntryStatus::Pending
    }

    pub fn is_added(&self) -> bool {
        self.status == EntryStatus::Added
    }

    /// Whether `title` is this entry's current or original feed title.
    pub fn is_known_as(&self, title: &str) -> bool {
        self.title == title || self.source_title.as_deref() == Some(title)
    }

    /// Identity comparison against a watch item.
    ///
    /// `(provider, id)` decides when both sides carry one; otherwise the
    /// entry and item must share title and type.
    pub fn is_same_item(&self, item: &WatchItem) -> bool {
        match (self.external_key(), item.external_key()) {
            (Some(ours), Some(theirs)) => ours == theirs,
            _ => self.kind == item.kind && self.is_known_as(&item.title),
        }
    }

    /// Year for display, `????` when unknown.
    pub fn display_year(&self) -> String {
        self.year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "????".to_string())
    }
}

fn external_key<'a>(provider: Option<&'a str>, id: Option<&'a str>) -> Option<(&'a str, &'a str)> {
    match (provider, id) {
        (Some(p), Some(i)) if !p.is_empty() && !i.is_empty() => Some((p, i)),
        _ => None,
    }
}
