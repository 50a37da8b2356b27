//! Background tasks: the phase-timeout sweep and the idle reaper.
//!
//! Both run on fixed intervals independent of any client connection, so a
//! round keeps progressing even if every client disconnects mid-phase.

use crate::state::AppState;
use crate::types::CleanupTrigger;
use std::sync::Arc;
use std::time::Duration;

/// Spawn the task that advances sessions whose phase deadline has elapsed.
pub fn spawn_phase_timeout_sweep(state: Arc<AppState>) {
    let interval = Duration::from_secs(state.config.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let advanced = state.advance_due_sessions().await;
            if advanced > 0 {
                tracing::debug!(advanced, "timeout sweep advanced sessions");
            }
        }
    });
}

/// Spawn the task that reaps rooms inactive past the grace window.
pub fn spawn_idle_reaper(state: Arc<AppState>) {
    let interval = Duration::from_secs(state.config.reaper_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            state.reap_idle(CleanupTrigger::Scheduled).await;
        }
    });
}
