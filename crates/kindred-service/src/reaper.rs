//! Link-request retention reaper.
//!
//! Expiry itself is lazy (`verify_code` transitions an overdue request the
//! moment it observes one), so this pass exists purely to reclaim storage:
//! it sweeps overdue `pending` rows to `expired` and deletes terminal rows
//! older than the retention window.

use chrono::{Duration, Utc};
use tracing::debug;

use kindred_core::Result;
use kindred_db::Database;

/// Outcome of one reaper pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReaperStats {
    /// Pending requests transitioned to `expired`.
    pub expired: u64,
    /// Terminal requests deleted past retention.
    pub purged: u64,
}

/// Run one pass: expire overdue pending requests, then purge terminal
/// requests whose deadline passed more than `retention_days` ago.
pub async fn run_pass(db: &Database, retention_days: i64) -> Result<ReaperStats> {
    let now = Utc::now();

    let expired = db.link_requests.expire_stale(now).await?;
    let purged = db
        .link_requests
        .purge_terminal_before(now - Duration::days(retention_days))
        .await?;

    debug!(
        subsystem = "service",
        component = "reaper",
        op = "run_pass",
        expired = expired,
        purged = purged,
        "Link request reaper pass"
    );

    Ok(ReaperStats { expired, purged })
}
