//! Janitor — periodic expiry sweep for in-memory and session state.
//!
//! DESIGN
//! ======
//! One background task wakes every `JANITOR_INTERVAL_SECS` (default 300) and
//! drops lapsed quota records, document sessions idle past their TTL and
//! expired login sessions. Quota windows already reset lazily on read, so the
//! sweep only bounds memory.
//!
//! ERROR HANDLING
//! ==============
//! A failed database purge is logged and retried on the next tick; the
//! in-memory sweeps never fail.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::session;
use crate::state::AppState;

const DEFAULT_JANITOR_INTERVAL_SECS: u64 = 300;

/// What one sweep removed. `login_sessions` is `None` when the purge failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub quota_records: usize,
    pub document_sessions: usize,
    pub login_sessions: Option<u64>,
}

/// Spawn the background sweep. Returns a handle for shutdown.
pub fn spawn_janitor_task(state: AppState) -> JoinHandle<()> {
    let interval_secs = std::env::var("JANITOR_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|s| *s > 0)
        .unwrap_or(DEFAULT_JANITOR_INTERVAL_SECS);
    info!(interval_secs, "janitor configured");
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(interval_secs)).await;
            sweep(&state).await;
        }
    })
}

pub async fn sweep(state: &AppState) -> SweepReport {
    let quota_records = state.rate_limiter.purge_expired();
    let document_sessions = state.sessions.evict_idle().await;
    let login_sessions = match session::purge_expired(&state.pool).await {
        Ok(n) => Some(n),
        Err(e) => {
            warn!(error = %e, "janitor: login session purge failed");
            None
        }
    };

    let report = SweepReport { quota_records, document_sessions, login_sessions };
    if quota_records > 0 || document_sessions > 0 || login_sessions.unwrap_or(0) > 0 {
        info!(quota_records, document_sessions, login_sessions = login_sessions.unwrap_or(0), "janitor: sweep");
    } else {
        debug!("janitor: nothing to sweep");
    }
    report
}

#[cfg(test)]
#[path = "janitor_test.rs"]
mod tests;
