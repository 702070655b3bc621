//! Periodic sweeper task.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use super::coordinator::GroupEventCoordinator;

/// Runs [`GroupEventCoordinator::sweep`] every `period` until the returned
/// task is aborted.
///
/// # Panics
///
/// Panics if `period` is zero.
#[must_use]
pub fn spawn_reaper(coordinator: GroupEventCoordinator, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = coordinator.sweep().await;
            debug!(
                expired = report.expired.len(),
                advanced = report.advanced.len(),
                completed = report.completed.len(),
                "reaper tick"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use troupe_catalog::TemplateCatalog;
    use troupe_test_support::{CountingRng, ManualClock, RecordingTransport};

    use crate::application::coordinator::CoordinatorConfig;

    #[tokio::test(start_paused = true)]
    async fn test_reaper_expires_idle_sessions() {
        // Arrange
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        ));
        let transport = Arc::new(RecordingTransport::new("alice", &["bob"]));
        let coordinator = GroupEventCoordinator::builder(
            Arc::new(TemplateCatalog::builtin().unwrap()),
            transport.clone(),
        )
        .clock(clock.clone())
        .rng(Box::new(CountingRng::default()))
        .config(CoordinatorConfig {
            idle_timeout: Duration::from_secs(60),
            enforce_phase_deadlines: false,
        })
        .build();
        let session_id = coordinator.start("campfire", "alice").await.unwrap();
        clock.advance_secs(61);

        // Act
        let handle = spawn_reaper(coordinator.clone(), Duration::from_secs(5));
        tokio::time::sleep(Duration::from_secs(6)).await;
        handle.abort();

        // Assert
        assert!(coordinator.session(&session_id).is_none());
        assert_eq!(transport.sent_kinds(), ["invite", "end"]);
    }
}
