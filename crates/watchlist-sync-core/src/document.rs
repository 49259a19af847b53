//! Persisted store document.
//!
//! A single JSON document holds the tracked entries plus the notifier's
//! checkpoint (the id of the last "pending summary" message, so it can be
//! edited in place instead of re-posted):
//!
//! ```json
//! {
//!   "notifierCheckpoint": "1234567890",
//!   "entries": [
//!     { "title": "Dune (2021)", "year": 2021, "type": "movie",
//!       "provider": "imdb", "id": "tt1160419",
//!       "status": "added", "addedAt": "2026-10-16T00:00:00Z" }
//!   ]
//! }
//! ```
//!
//! Writing the bytes to disk is the application's concern; this module
//! only defines the shape and its encoding.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::Entry;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreDocument {
    #[serde(default)]
    pub notifier_checkpoint: Option<String>,
    #[serde(default)]
    pub entries: Vec<Entry>,
}

impl StoreDocument {
    /// Encode as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to encode store document")
    }

    /// Decode from JSON. Blank input is treated as an empty document.
    pub fn from_json(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(text).context("Failed to parse store document")
    }
}
