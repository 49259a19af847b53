//! Message rendering and the notifier abstraction.
//!
//! Two messages are produced per cycle:
//!
//! - **Added**: one-off announcement listing entries that became available
//!   ([`render_added`]).
//! - **Pending summary**: a single message that is edited in place every
//!   cycle ([`render_pending`]). Its message id is the store's notifier
//!   checkpoint.
//!
//! Rendering is pure; delivery goes through the [`Notifier`] trait so the
//! cycle runner works the same with Discord ([`crate::discord`]) or with
//! the log-only [`LogNotifier`].

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use watchlist_sync_core::models::{Entry, MediaKind};

pub const COLOR_ADDED: u32 = 0x2ecc71;
pub const COLOR_PENDING: u32 = 0xf1c40f;

/// Discord caps an embed description at 4096 characters.
pub const DESCRIPTION_LIMIT: usize = 4096;
/// Discord caps an embed field value at 1024 characters.
pub const FIELD_LIMIT: usize = 1024;
/// Discord caps the combined text of one embed at 6000 characters.
pub const EMBED_LIMIT: usize = 6000;
/// Discord caps an embed at 25 fields.
pub const EMBED_FIELD_COUNT_LIMIT: usize = 25;

/// Characters of entry lines in one announcement.
const ADDED_BUDGET: usize = 5500;
/// Characters of entry lines per group in the pending summary.
const PENDING_GROUP_BUDGET: usize = 2400;
/// Room kept for the "and N more" line.
const OVERFLOW_LINE_RESERVE: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

impl Embed {
    /// Plain-text rendering for logs and the terminal.
    pub fn to_plain_text(&self) -> String {
        let mut out = self.title.clone();
        if let Some(desc) = &self.description {
            out.push('\n');
            out.push_str(desc);
        }
        for field in &self.fields {
            out.push_str("\n\n");
            out.push_str(&field.name);
            out.push('\n');
            out.push_str(&field.value);
        }
        out
    }

    /// Characters Discord counts against [`EMBED_LIMIT`].
    pub fn text_len(&self) -> usize {
        let mut len = self.title.chars().count();
        len += self.description.as_deref().map_or(0, |d| d.chars().count());
        len += self
            .fields
            .iter()
            .map(|f| f.name.chars().count() + f.value.chars().count())
            .sum::<usize>();
        len += self.footer.as_ref().map_or(0, |f| f.text.chars().count());
        len
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Rendering
// ═══════════════════════════════════════════════════════════════════════

/// Announcement for entries that became available this cycle.
pub fn render_added(entries: &[Entry], now: DateTime<Utc>) -> Embed {
    let lines: Vec<String> = entries
        .iter()
        .map(|e| format!("✅ **{}** ({})", e.title, e.display_year()))
        .collect();
    let lines = cap_lines(lines, ADDED_BUDGET);

    let mut chunks = chunk_lines(&lines, DESCRIPTION_LIMIT).into_iter();
    let description = chunks
        .next()
        .unwrap_or_else(|| "*Nothing new.*".to_string());

    // Overflow past the description goes into fields.
    let overflow: Vec<String> = chunks
        .flat_map(|c| c.lines().map(str::to_string).collect::<Vec<_>>())
        .collect();
    let fields = chunk_lines(&overflow, FIELD_LIMIT)
        .into_iter()
        .map(|value| EmbedField {
            name: "(continued)".to_string(),
            value,
            inline: false,
        })
        .collect();

    Embed {
        title: "🎉 New in the library".to_string(),
        description: Some(description),
        color: COLOR_ADDED,
        fields,
        footer: Some(EmbedFooter {
            text: "watchlist-sync".to_string(),
        }),
        timestamp: Some(now),
    }
}

/// Summary of everything still waiting, grouped movies first, then shows.
pub fn render_pending(pending: &[Entry], now: DateTime<Utc>) -> Embed {
    let mut fields = Vec::new();
    for (kind, label, placeholder) in [
        (MediaKind::Movie, "🎬 Movies", "*No movies waiting.*"),
        (MediaKind::Show, "📺 Shows", "*No shows waiting.*"),
    ] {
        let group: Vec<&Entry> = pending.iter().filter(|e| e.kind == kind).collect();
        let lines: Vec<String> = if group.is_empty() {
            vec![placeholder.to_string()]
        } else {
            group
                .iter()
                .map(|e| format!("🟡 {} ({})", e.title, e.display_year()))
                .collect()
        };
        let lines = cap_lines(lines, PENDING_GROUP_BUDGET);

        let chunks = chunk_lines(&lines, FIELD_LIMIT);
        let k = chunks.len();
        for (i, value) in chunks.into_iter().enumerate() {
            let name = if k > 1 {
                format!("{} ({}) ({}/{})", label, group.len(), i + 1, k)
            } else {
                format!("{} ({})", label, group.len())
            };
            fields.push(EmbedField {
                name,
                value,
                inline: true,
            });
        }
    }

    Embed {
        title: "🕓 Waiting for the library".to_string(),
        description: None,
        color: COLOR_PENDING,
        fields,
        footer: Some(EmbedFooter {
            text: "Last updated".to_string(),
        }),
        timestamp: Some(now),
    }
}

/// Keep leading lines within `budget` characters, replacing the rest with
/// a single "… and N more" line.
fn cap_lines(lines: Vec<String>, budget: usize) -> Vec<String> {
    let cost = |line: &String| line.chars().count().min(FIELD_LIMIT) + 1;
    if lines.iter().map(cost).sum::<usize>() <= budget {
        return lines;
    }

    let limit = budget.saturating_sub(OVERFLOW_LINE_RESERVE);
    let total = lines.len();
    let mut used = 0usize;
    let mut kept = Vec::new();
    for line in lines {
        used += cost(&line);
        if used > limit {
            break;
        }
        kept.push(line);
    }
    let hidden = total - kept.len();
    kept.push(format!("… and {} more", hidden));
    kept
}

/// Pack lines into newline-joined chunks of at most `max` characters.
///
/// Order is preserved. A single line longer than `max` is truncated to fit
/// its own chunk.
pub fn chunk_lines(lines: &[String], max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in lines {
        let line = truncate_chars(line, max);
        let len = line.chars().count();
        let needed = if current.is_empty() { len } else { current_len + 1 + len };

        if needed > max && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(&line);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn truncate_chars(line: &str, max: usize) -> String {
    if line.chars().count() <= max {
        return line.to_string();
    }
    let mut out: String = line.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

// ═══════════════════════════════════════════════════════════════════════
// Delivery
// ═══════════════════════════════════════════════════════════════════════

/// A channel that can post and edit rendered messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post a new message.
    async fn send(&self, embed: &Embed) -> Result<()>;

    /// Edit the message identified by `checkpoint`, or post a new one when
    /// there is no checkpoint or the old message is gone.
    ///
    /// Returns the checkpoint to remember for the next cycle.
    async fn send_or_update(&self, checkpoint: Option<&str>, embed: &Embed)
        -> Result<Option<String>>;
}

/// Notifier used when no chat channel is configured: writes rendered
/// messages to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, embed: &Embed) -> Result<()> {
        info!(title = %embed.title, "{}", embed.to_plain_text());
        Ok(())
    }

    async fn send_or_update(
        &self,
        checkpoint: Option<&str>,
        embed: &Embed,
    ) -> Result<Option<String>> {
        info!(title = %embed.title, "{}", embed.to_plain_text());
        Ok(checkpoint.map(str::to_string))
    }
}
