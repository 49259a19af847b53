//! Periodic cycle scheduler for `wls watch`.
//!
//! Runs an optional first cycle immediately, then one cycle every
//! `schedule.interval_minutes`. Shutdown is observed between cycles only:
//! a cycle in progress always runs to completion.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::cycle::SyncService;

/// Shutdown signal flipped to `true` on Ctrl-C.
pub fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested, finishing current cycle"),
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C, stopping scheduler"),
        }
        let _ = tx.send(true);
    });
    rx
}

/// Run cycles until `shutdown` turns `true` (or its sender goes away).
///
/// Returns the number of cycles run.
pub async fn run_scheduler(
    service: Arc<SyncService>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<usize> {
    let schedule = &service.config().schedule;
    let interval = Duration::from_secs(schedule.interval_minutes.saturating_mul(60));
    let mut cycles = 0usize;

    info!(
        interval_minutes = schedule.interval_minutes,
        run_on_start = schedule.run_on_start,
        "scheduler started"
    );

    if schedule.run_on_start && !*shutdown.borrow() {
        service.run_cycle_logged(false).await;
        cycles += 1;
    }

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }
        service.run_cycle_logged(false).await;
        cycles += 1;
    }

    info!(cycles, "scheduler stopped");
    Ok(cycles)
}
