//! Classified failure kinds.
//!
//! Most plumbing returns [`anyhow::Result`]. The variants below name the
//! failures the cycle runner treats differently: the first three are logged
//! and absorbed, [`SyncError::PersistenceWriteFailed`] fails the cycle.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A feed could not be fetched or parsed. The feed contributes no items.
    #[error("feed '{source_name}' unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// One resolver tier failed for one item. Counts as a miss for that tier.
    #[error("lookup tier '{tier}' failed: {reason}")]
    LookupTierFailed { tier: String, reason: String },

    /// Every resolution in the cycle was inconclusive.
    #[error("library service down: all {items} lookups were inconclusive")]
    LibraryServiceDown { items: usize },

    #[error("failed to write store {}: {source}", path.display())]
    PersistenceWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
