//! services/api/src/jobs/reminder.rs
//!
//! The periodic reminder scan: finds confirmed bookings starting soon that
//! have not been reminded yet, dispatches the reminder, and marks it sent.
//!
//! Failures are isolated per booking. A reminder that could not be sent
//! leaves `reminder_sent` unset and is picked up again on the next tick, so
//! delivery is at-least-once; one bad address never blocks the rest of the
//! sweep.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use tutorbook_core::ports::{Clock, MarketplaceStore, Notifier};

/// Runs one sweep and returns how many reminders were sent and marked.
pub async fn run_reminder_scan(
    store: &dyn MarketplaceStore,
    notifier: &dyn Notifier,
    clock: &dyn Clock,
    lead: Duration,
) -> usize {
    let now = clock.now();
    let due = match store.due_reminders(now, now + lead).await {
        Ok(due) => due,
        Err(e) => {
            error!("reminder scan query failed: {e}");
            return 0;
        }
    };

    if !due.is_empty() {
        info!("reminder scan found {} booking(s) due", due.len());
    }

    let mut sent = 0;
    for details in due {
        let booking_id = details.booking.id;
        match notifier.session_reminder(&details).await {
            Ok(()) => match store.mark_reminder_sent(booking_id).await {
                Ok(()) => {
                    info!(%booking_id, "reminder sent");
                    sent += 1;
                }
                Err(e) => error!(%booking_id, "failed to mark reminder sent: {e}"),
            },
            // Leave reminder_sent unset; the next tick retries.
            Err(e) => warn!(%booking_id, "failed to send reminder: {e}"),
        }
    }
    sent
}

/// Spawns the scan on a fixed interval. The handle is returned so the
/// process entry point owns the task's lifecycle.
pub fn start_reminder_scheduler(
    store: Arc<dyn MarketplaceStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    interval: StdDuration,
    lead: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a deploy does not
        // race the migrations.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            run_reminder_scan(store.as_ref(), notifier.as_ref(), clock.as_ref(), lead).await;
        }
    })
}
