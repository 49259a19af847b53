//! Tracked-entry overview for `wls status`.

use anyhow::Result;
use watchlist_sync_core::document::StoreDocument;
use watchlist_sync_core::models::{Entry, EntryStatus, MediaKind};

use crate::config::Config;
use crate::persist::load_document;

/// Entry filter from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusFilter {
    pub kind: Option<MediaKind>,
    pub status: Option<EntryStatus>,
}

impl StatusFilter {
    fn accepts(&self, entry: &Entry) -> bool {
        self.kind.map_or(true, |k| entry.kind == k) && self.status.map_or(true, |s| entry.status == s)
    }
}

/// Run the status command: load the store and print it.
pub fn run_status(config: &Config, filter: StatusFilter) -> Result<()> {
    let doc = load_document(&config.store.path)?;
    println!("watchlist-sync — Store Status");
    println!("=============================");
    println!();
    println!("  Store:       {}", config.store.path.display());
    print!("{}", render_status(&doc, filter));
    Ok(())
}

/// Counts plus one line per matching entry.
pub fn render_status(doc: &StoreDocument, filter: StatusFilter) -> String {
    let count = |kind: MediaKind, status: EntryStatus| {
        doc.entries
            .iter()
            .filter(|e| e.kind == kind && e.status == status)
            .count()
    };

    let mut out = String::new();
    out.push_str(&format!(
        "  Pending:     {} movies, {} shows\n",
        count(MediaKind::Movie, EntryStatus::Pending),
        count(MediaKind::Show, EntryStatus::Pending)
    ));
    out.push_str(&format!(
        "  Added:       {} movies, {} shows\n",
        count(MediaKind::Movie, EntryStatus::Added),
        count(MediaKind::Show, EntryStatus::Added)
    ));
    out.push('\n');

    let shown: Vec<&Entry> = doc.entries.iter().filter(|e| filter.accepts(e)).collect();
    if shown.is_empty() {
        out.push_str("  No entries.\n");
        return out;
    }

    out.push_str(&format!(
        "  {:<8} {:<6} {:<40} {:>5}  {:<20} {}\n",
        "STATUS", "TYPE", "TITLE", "YEAR", "ID", "ADDED"
    ));
    out.push_str(&format!("  {}\n", "-".repeat(100)));
    for e in shown {
        let id = e
            .external_key()
            .map(|(p, i)| format!("{}://{}", p, i))
            .unwrap_or_else(|| "-".to_string());
        let added = e
            .added_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!(
            "  {:<8} {:<6} {:<40} {:>5}  {:<20} {}\n",
            e.status.to_string(),
            e.kind.as_str(),
            e.title,
            e.display_year(),
            id,
            added
        ));
    }
    out
}
