//! Plex Media Server client.
//!
//! Implements [`LibraryService`] over the Plex HTTP API. Responses are
//! requested as JSON (`Accept: application/json`) and authenticated with
//! the `X-Plex-Token` header.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | `search_by_identifier` | `GET /library/all?guid=…&includeGuids=1` |
//! | `search_by_title` | `GET /search?query=…&type=1\|2&includeGuids=1` |
//! | `list_sections` | `GET /library/sections` |
//! | `list_section_entries` | `GET /library/sections/{key}/all?year=…&X-Plex-Container-Start=…&X-Plex-Container-Size=…` |
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, ... capped at 32s)
//! - Other HTTP 4xx → fail immediately
//! - Network errors and timeouts → retry
//!
//! A call that still fails is reported as [`SyncError::LookupTierFailed`];
//! the resolver turns it into a miss for the tier that issued it.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use watchlist_sync_core::models::MediaKind;
use watchlist_sync_core::resolver::{Candidate, LibraryService, Section};

use crate::config::LibraryConfig;
use crate::error::SyncError;

/// HTTP client for one Plex server.
///
/// Opened once per cycle and shared behind an `Arc`; the connection pool
/// is released when the last handle is dropped.
pub struct PlexClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
    max_retries: u32,
}

impl PlexClient {
    pub fn open(config: &LibraryConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client for Plex")?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.resolved_token(),
            max_retries: config.max_retries,
        })
    }

    /// GET `path` and return the `MediaContainer` object.
    ///
    /// `op` names the operation in errors.
    async fn get_container(&self, op: &str, path: &str, query: &[(&str, String)]) -> Result<Value> {
        match self.get_json(path, query).await {
            Ok(mut json) => Ok(json
                .get_mut("MediaContainer")
                .map(Value::take)
                .unwrap_or(Value::Null)),
            Err(e) => Err(SyncError::LookupTierFailed {
                tier: op.to_string(),
                reason: format!("{:#}", e),
            }
            .into()),
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut request = self
                .http
                .get(&url)
                .header("Accept", "application/json")
                .query(query);
            if let Some(token) = &self.token {
                request = request.header("X-Plex-Token", token);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response
                            .json()
                            .await
                            .with_context(|| format!("Invalid JSON from {}", path));
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        debug!(path, %status, attempt, "transient Plex error");
                        last_err = Some(anyhow::anyhow!("Plex returned {} for {}", status, path));
                        continue;
                    }

                    bail!("Plex returned {} for {}", status, path);
                }
                Err(e) => {
                    debug!(path, attempt, error = %e, "Plex request failed");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Plex request failed after retries")))
    }
}

#[async_trait]
impl LibraryService for PlexClient {
    async fn search_by_identifier(&self, guid: &str) -> Result<Vec<Candidate>> {
        let container = self
            .get_container(
                "search-by-identifier",
                "/library/all",
                &[("guid", guid.to_string()), ("includeGuids", "1".to_string())],
            )
            .await?;
        Ok(parse_candidates(&container))
    }

    async fn search_by_title(&self, kind: MediaKind, text: &str) -> Result<Vec<Candidate>> {
        let container = self
            .get_container(
                "search-by-title",
                "/search",
                &[
                    ("query", text.to_string()),
                    ("type", search_type(kind).to_string()),
                    ("includeGuids", "1".to_string()),
                ],
            )
            .await?;
        Ok(parse_candidates(&container))
    }

    async fn list_sections(&self) -> Result<Vec<Section>> {
        let container = self
            .get_container("list-sections", "/library/sections", &[])
            .await?;
        Ok(parse_sections(&container))
    }

    async fn list_section_entries(
        &self,
        section_key: &str,
        year: i32,
        offset: usize,
        page_size: usize,
    ) -> Result<Vec<Candidate>> {
        let path = format!("/library/sections/{}/all", section_key);
        let container = self
            .get_container(
                "list-section-entries",
                &path,
                &[
                    ("year", year.to_string()),
                    ("includeGuids", "1".to_string()),
                    ("X-Plex-Container-Start", offset.to_string()),
                    ("X-Plex-Container-Size", page_size.to_string()),
                ],
            )
            .await?;
        Ok(parse_candidates(&container))
    }
}

/// Plex search `type` parameter.
fn search_type(kind: MediaKind) -> u8 {
    match kind {
        MediaKind::Movie => 1,
        MediaKind::Show => 2,
    }
}

fn parse_kind(value: Option<&Value>) -> Option<MediaKind> {
    match value.and_then(Value::as_str) {
        Some("movie") => Some(MediaKind::Movie),
        Some("show") => Some(MediaKind::Show),
        _ => None,
    }
}

/// Read `Metadata[]` from a `MediaContainer`.
///
/// Entries without a title are skipped. The legacy `guid` attribute and
/// every `Guid[].id` are collected into [`Candidate::guids`].
pub fn parse_candidates(container: &Value) -> Vec<Candidate> {
    let Some(metadata) = container.get("Metadata").and_then(Value::as_array) else {
        return Vec::new();
    };

    metadata
        .iter()
        .filter_map(|m| {
            let title = m.get("title").and_then(Value::as_str)?.to_string();
            let mut guids: Vec<String> = Vec::new();
            if let Some(g) = m.get("guid").and_then(Value::as_str) {
                guids.push(g.to_string());
            }
            if let Some(list) = m.get("Guid").and_then(Value::as_array) {
                guids.extend(
                    list.iter()
                        .filter_map(|g| g.get("id").and_then(Value::as_str))
                        .map(str::to_string),
                );
            }
            Some(Candidate {
                title,
                original_title: m
                    .get("originalTitle")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                year: m
                    .get("year")
                    .and_then(Value::as_i64)
                    .and_then(|y| i32::try_from(y).ok()),
                kind: parse_kind(m.get("type")),
                guids,
            })
        })
        .collect()
}

/// Read `Directory[]` from a `MediaContainer`.
pub fn parse_sections(container: &Value) -> Vec<Section> {
    let Some(dirs) = container.get("Directory").and_then(Value::as_array) else {
        return Vec::new();
    };

    dirs.iter()
        .filter_map(|d| {
            let key = match d.get("key")? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some(Section {
                key,
                title: d
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                kind: parse_kind(d.get("type")),
            })
        })
        .collect()
}
