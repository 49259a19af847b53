//! Watch-list feed adapter.
//!
//! Reads RSS 2.0 watch-list feeds (Letterboxd, Trakt exports, hand-written
//! files) and turns each `<item>` into a [`WatchItem`].
//!
//! # Field mapping
//!
//! | RSS element | Becomes |
//! |-------------|---------|
//! | `title` | `"Name (YYYY)"` → title `Name`, year `YYYY`; otherwise the trimmed title |
//! | `guid` | `(provider, id)`, see [`parse_guid`] |
//! | `category` | `show` → [`MediaKind::Show`], anything else → [`MediaKind::Movie`] |
//!
//! Items whose title is empty are dropped.
//!
//! # Failure handling
//!
//! [`FeedReader::fetch`] never fails: an unreachable or malformed feed is
//! logged as [`SyncError::SourceUnavailable`] and contributes no items.
//! [`FeedReader::try_fetch`] exposes the underlying error for diagnostics
//! (`wls feeds`).

use anyhow::{bail, Context, Result};
use quick_xml::events::Event;
use std::time::Duration;
use tracing::{debug, warn};
use watchlist_sync_core::models::{MediaKind, WatchItem};

use crate::config::FeedConfig;
use crate::error::SyncError;

/// Fetches and parses configured feeds.
pub struct FeedReader {
    client: reqwest::Client,
}

impl FeedReader {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client for feeds")?;
        Ok(Self { client })
    }

    /// Fetch every feed in order and concatenate the items.
    pub async fn fetch_all(&self, feeds: &[FeedConfig]) -> Vec<WatchItem> {
        let mut items = Vec::new();
        for feed in feeds {
            items.extend(self.fetch(feed).await);
        }
        items
    }

    /// Fetch one feed, logging and swallowing any failure.
    pub async fn fetch(&self, feed: &FeedConfig) -> Vec<WatchItem> {
        match self.try_fetch(feed).await {
            Ok(items) => {
                debug!(feed = feed.label(), items = items.len(), "feed fetched");
                items
            }
            Err(e) => {
                let err = SyncError::SourceUnavailable {
                    source_name: feed.label().to_string(),
                    reason: format!("{:#}", e),
                };
                warn!(feed = feed.label(), "{}", err);
                Vec::new()
            }
        }
    }

    pub async fn try_fetch(&self, feed: &FeedConfig) -> Result<Vec<WatchItem>> {
        let body = if let Some(path) = feed.url.strip_prefix("file://") {
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read feed file: {}", path))?
        } else {
            let response = self
                .client
                .get(&feed.url)
                .send()
                .await
                .with_context(|| format!("Failed to fetch {}", feed.url))?;
            let status = response.status();
            if !status.is_success() {
                bail!("HTTP {} from {}", status, feed.url);
            }
            response.text().await?
        };
        parse_rss(&body)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Parsing
// ═══════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct RawItem {
    title: String,
    guid: String,
    category: Option<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    Title,
    Guid,
    Category,
}

/// Parse an RSS 2.0 document into watch items, in document order.
pub fn parse_rss(xml: &str) -> Result<Vec<WatchItem>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<RawItem> = None;
    // Depth below the current <item>; fields are read from direct children only.
    let mut depth = 0usize;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if current.is_none() {
                    if e.local_name().as_ref() == b"item" {
                        current = Some(RawItem::default());
                        depth = 0;
                    }
                    continue;
                }
                depth += 1;
                if depth == 1 && e.name().prefix().is_none() {
                    field = match e.local_name().as_ref() {
                        b"title" => Some(Field::Title),
                        b"guid" => Some(Field::Guid),
                        b"category" => Some(Field::Category),
                        _ => None,
                    };
                    text.clear();
                }
            }
            Ok(Event::Text(t)) => {
                if field.is_some() {
                    text.push_str(&t.unescape().context("Invalid text in feed")?);
                }
            }
            Ok(Event::CData(c)) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::End(e)) => {
                if current.is_some() && depth == 0 {
                    if e.local_name().as_ref() == b"item" {
                        if let Some(item) = current.take().and_then(to_watch_item) {
                            items.push(item);
                        }
                    }
                    continue;
                }
                let Some(raw) = current.as_mut() else {
                    continue;
                };
                if depth == 1 {
                    match field.take() {
                        Some(Field::Title) => raw.title = std::mem::take(&mut text),
                        Some(Field::Guid) => raw.guid = std::mem::take(&mut text),
                        Some(Field::Category) => {
                            if raw.category.is_none() {
                                raw.category = Some(std::mem::take(&mut text));
                            }
                        }
                        None => {}
                    }
                }
                depth -= 1;
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!(
                "Malformed feed at position {}: {}",
                reader.buffer_position(),
                e
            ),
            _ => {}
        }
    }

    Ok(items)
}

fn to_watch_item(raw: RawItem) -> Option<WatchItem> {
    let (title, year) = split_title_year(&raw.title);
    if title.is_empty() {
        return None;
    }
    let kind = parse_kind(raw.category.as_deref());
    let item = WatchItem::titled(title, year, kind);
    Some(match parse_guid(&raw.guid) {
        Some((provider, id)) => item.with_id(provider, id),
        None => item,
    })
}

/// Split `"Name (YYYY)"` into `("Name", Some(YYYY))`.
///
/// Anything else is returned trimmed with no year.
pub fn split_title_year(raw: &str) -> (String, Option<i32>) {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_suffix(')') {
        let bytes = rest.as_bytes();
        if bytes.len() >= 5 {
            let (head, digits) = bytes.split_at(bytes.len() - 5);
            if digits[0] == b'(' && digits[1..].iter().all(u8::is_ascii_digit) {
                // head is a char boundary: the 5 bytes after it are ASCII.
                let name = String::from_utf8_lossy(head).trim().to_string();
                let year = std::str::from_utf8(&digits[1..])
                    .ok()
                    .and_then(|y| y.parse().ok());
                return (name, year);
            }
        }
    }
    (trimmed.to_string(), None)
}

/// Extract `(provider, id)` from an RSS `guid`.
///
/// First applicable rule wins:
/// 1. `imdb://X`, `tvdb://X`, `tmdb://X` (provider case-insensitive)
/// 2. an IMDb URL containing `imdb.com/title/ttNNN`
/// 3. a URL mentioning `tmdb` or `themoviedb` followed by a `/NNN` segment
pub fn parse_guid(guid: &str) -> Option<(String, String)> {
    let guid = guid.trim();
    if guid.is_empty() {
        return None;
    }

    if let Some((scheme, id)) = guid.split_once("://") {
        let provider = scheme.to_ascii_lowercase();
        if matches!(provider.as_str(), "imdb" | "tvdb" | "tmdb") && !id.is_empty() {
            return Some((provider, id.to_string()));
        }
    }

    let lower = guid.to_ascii_lowercase();

    const IMDB_MARKER: &str = "imdb.com/title/tt";
    if let Some(pos) = lower.find(IMDB_MARKER) {
        let start = pos + IMDB_MARKER.len() - 2;
        let digits = leading_digits(&guid[start + 2..]);
        if !digits.is_empty() {
            return Some(("imdb".to_string(), guid[start..start + 2 + digits.len()].to_string()));
        }
    }

    let marker_end = [("tmdb", lower.find("tmdb")), ("themoviedb", lower.find("themoviedb"))]
        .into_iter()
        .filter_map(|(m, pos)| pos.map(|p| (p, p + m.len())))
        .min()
        .map(|(_, end)| end);
    if let Some(from) = marker_end {
        for (slash, _) in guid[from..].match_indices('/') {
            let digits = leading_digits(&guid[from + slash + 1..]);
            if !digits.is_empty() {
                return Some(("tmdb".to_string(), digits.to_string()));
            }
        }
    }

    None
}

fn leading_digits(s: &str) -> &str {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    &s[..end]
}

/// `show` (case-insensitive) is a show, everything else a movie.
pub fn parse_kind(category: Option<&str>) -> MediaKind {
    match category {
        Some(c) if c.trim().eq_ignore_ascii_case("show") => MediaKind::Show,
        _ => MediaKind::Movie,
    }
}
