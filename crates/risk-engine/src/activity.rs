//! In-memory activity tracking for rate-window signals.
//!
//! Holds recent action events per account and answers sliding-window
//! counts. Events are ephemeral by design: rate windows are short and a
//! restart resetting them only relaxes enforcement for a minute.

use crate::types::ActionKind;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// One recorded action.
#[derive(Debug, Clone, Copy)]
struct ActivityEvent {
    kind: ActionKind,
    at: Instant,
}

/// Sliding-window activity tracker.
///
/// Spawns a background task that periodically prunes events older than the
/// retention window.
#[derive(Clone)]
pub struct ActivityTracker {
    events: Arc<RwLock<HashMap<String, Vec<ActivityEvent>>>>,
    retention: Duration,
}

impl ActivityTracker {
    /// Create a tracker retaining events for at least `retention`.
    ///
    /// Retention must cover the largest window the scorer asks about
    /// (the one-hour generation window).
    pub fn new(retention: Duration) -> Self {
        let tracker = Self {
            events: Arc::new(RwLock::new(HashMap::new())),
            retention,
        };

        let cleanup = tracker.clone();
        tokio::spawn(async move {
            cleanup.cleanup_loop().await;
        });

        tracker
    }

    /// Background task that periodically drops expired events.
    async fn cleanup_loop(&self) {
        let cleanup_interval = Duration::from_secs(60);

        loop {
            tokio::time::sleep(cleanup_interval).await;

            // checked_sub: the monotonic clock may not reach back a full
            // retention window early in the process lifetime.
            let Some(cutoff) = Instant::now().checked_sub(self.retention) else {
                continue;
            };
            let mut events = self.events.write().await;
            let before: usize = events.values().map(Vec::len).sum();

            events.retain(|_, account_events| {
                account_events.retain(|event| event.at > cutoff);
                !account_events.is_empty()
            });

            let removed = before - events.values().map(Vec::len).sum::<usize>();
            if removed > 0 {
                debug!("Pruned {} expired activity events", removed);
            }
        }
    }

    /// Record one action for an account.
    pub async fn record(&self, account_id: &str, kind: ActionKind) {
        let mut events = self.events.write().await;
        events
            .entry(account_id.to_string())
            .or_default()
            .push(ActivityEvent {
                kind,
                at: Instant::now(),
            });
    }

    /// Count actions of one kind within the trailing window.
    pub async fn count_recent(
        &self,
        account_id: &str,
        kind: ActionKind,
        window: Duration,
    ) -> u32 {
        let cutoff = Instant::now().checked_sub(window);
        let events = self.events.read().await;
        events
            .get(account_id)
            .map(|account_events| {
                account_events
                    .iter()
                    .filter(|e| e.kind == kind && cutoff.map_or(true, |c| e.at > c))
                    .count() as u32
            })
            .unwrap_or(0)
    }

    /// Count generation actions (quiz/note/slideshow) within the window.
    pub async fn count_generation_recent(&self, account_id: &str, window: Duration) -> u32 {
        let cutoff = Instant::now().checked_sub(window);
        let events = self.events.read().await;
        events
            .get(account_id)
            .map(|account_events| {
                account_events
                    .iter()
                    .filter(|e| e.kind.is_generation() && cutoff.map_or(true, |c| e.at > c))
                    .count() as u32
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_events_in_window() {
        let tracker = ActivityTracker::new(Duration::from_secs(3600));

        for _ in 0..5 {
            tracker.record("acct-1", ActionKind::Message).await;
        }
        tracker.record("acct-1", ActionKind::Image).await;

        let messages = tracker
            .count_recent("acct-1", ActionKind::Message, Duration::from_secs(60))
            .await;
        assert_eq!(messages, 5);

        let images = tracker
            .count_recent("acct-1", ActionKind::Image, Duration::from_secs(60))
            .await;
        assert_eq!(images, 1);
    }

    #[tokio::test]
    async fn accounts_are_isolated() {
        let tracker = ActivityTracker::new(Duration::from_secs(3600));

        tracker.record("acct-1", ActionKind::Message).await;

        let other = tracker
            .count_recent("acct-2", ActionKind::Message, Duration::from_secs(60))
            .await;
        assert_eq!(other, 0);
    }

    #[tokio::test]
    async fn old_events_fall_out_of_the_window() {
        let tracker = ActivityTracker::new(Duration::from_secs(3600));

        tracker.record("acct-1", ActionKind::Quiz).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        tracker.record("acct-1", ActionKind::Quiz).await;

        let recent = tracker
            .count_recent("acct-1", ActionKind::Quiz, Duration::from_millis(30))
            .await;
        assert_eq!(recent, 1);
    }

    #[tokio::test]
    async fn generation_count_spans_kinds() {
        let tracker = ActivityTracker::new(Duration::from_secs(3600));

        tracker.record("acct-1", ActionKind::Quiz).await;
        tracker.record("acct-1", ActionKind::Note).await;
        tracker.record("acct-1", ActionKind::Slideshow).await;
        tracker.record("acct-1", ActionKind::Message).await;

        let generations = tracker
            .count_generation_recent("acct-1", Duration::from_secs(60))
            .await;
        assert_eq!(generations, 3);
    }
}
