//! One-off lookup for `wls check`.
//!
//! Resolves a single item against the library through the same tier chain
//! a cycle uses, without touching the store.

use anyhow::Result;
use watchlist_sync_core::models::{MatchResult, WatchItem};

use crate::cycle::SyncService;

/// Resolve `item` and print the verdict.
pub async fn run_check(service: &SyncService, item: &WatchItem) -> Result<MatchResult> {
    let resolver = service.open_resolver()?;
    println!("Checking {}", item);
    println!("  Tiers:       {}", resolver.tier_names().join(" → "));

    let result = resolver.resolve(item).await?;
    println!("  Verdict:     {}", describe(&result));
    Ok(result)
}

pub fn describe(result: &MatchResult) -> String {
    if result.found {
        match &result.canonical_title {
            Some(title) => format!("in library as \"{}\"", title),
            None => "in library".to_string(),
        }
    } else if result.inconclusive {
        "unknown (library unreachable)".to_string()
    } else {
        "not in library".to_string()
    }
}
