//! The outbox dispatcher: a long-running loop, independent of request
//! handlers, that drains committed outbox rows to the integration target.
//!
//! Each iteration claims a leased batch, delivers every event outside any
//! database transaction, and settles each row with its own status-guarded
//! update. Several dispatcher processes can run side by side: the claim
//! statement skips locked and leased rows, so delivery stays at-least-once
//! with bounded duplication.

use anyhow::Result;
use fcfs_config::DispatcherSettings;
use fcfs_db::outbox;
use fcfs_db::OutboxEventRow;
use fcfs_webhook::{DeliveryOutcome, WebhookClient};
use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Delay in seconds before the `retry`-th retry (1-based), clamped to the
/// last schedule entry.
pub fn retry_delay(schedule: &[i64], retry: i32) -> i64 {
    let idx = (retry.max(1) as usize - 1).min(schedule.len() - 1);
    schedule[idx]
}

pub struct Dispatcher {
    pool: PgPool,
    client: WebhookClient,
    settings: DispatcherSettings,
}

impl Dispatcher {
    pub fn new(pool: PgPool, client: WebhookClient, settings: DispatcherSettings) -> Self {
        Self {
            pool,
            client,
            settings,
        }
    }

    /// Poll until the shutdown channel flips. A non-empty batch skips the
    /// sleep so a backlog drains at delivery speed, not at poll speed.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let interval = Duration::from_secs(self.settings.poll_interval_secs);
        info!(
            target_url = self.client.target_url(),
            batch_size = self.settings.batch_size,
            "outbox dispatcher started"
        );

        loop {
            if *shutdown_rx.borrow() {
                info!("outbox dispatcher stopping");
                return Ok(());
            }

            let processed = match self.tick().await {
                Ok(n) => n,
                Err(err) => {
                    warn!(error = %err, "outbox tick failed");
                    0
                }
            };

            if processed > 0 {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown_rx.changed() => {}
            }
        }
    }

    /// Claim and work one batch. Returns how many events were attempted.
    pub async fn tick(&self) -> Result<usize> {
        let batch = outbox::claim_due_batch(
            &self.pool,
            &self.settings.target_tag,
            self.settings.batch_size,
            self.settings.lease_secs,
        )
        .await?;

        let n = batch.len();
        for event in &batch {
            if let Err(err) = self.dispatch_one(event).await {
                // The lease keeps the row parked until it lapses; the next
                // tick past that point picks it up again.
                warn!(event_id = %event.event_id, error = %err, "settle failed");
            }
        }
        Ok(n)
    }

    async fn dispatch_one(&self, event: &OutboxEventRow) -> Result<()> {
        let outcome = self
            .client
            .deliver(&event.event_id, &event.event_name, &event.payload)
            .await;

        match outcome {
            DeliveryOutcome::Delivered => {
                outbox::mark_sent(&self.pool, &event.event_id).await?;
                info!(
                    event_id = %event.event_id,
                    event_name = %event.event_name,
                    retry_count = event.retry_count,
                    "event delivered"
                );
            }
            DeliveryOutcome::Rejected { status, body } => {
                // The receiver says the request itself is malformed; retrying
                // cannot help. Park immediately with the body captured.
                let error = format!("http {status}: {body}");
                outbox::mark_failed(&self.pool, &event.event_id, event.retry_count, &error)
                    .await?;
                warn!(
                    event_id = %event.event_id,
                    status, "event rejected by receiver; parked"
                );
            }
            DeliveryOutcome::Retryable { reason } => {
                let retry = event.retry_count + 1;
                if retry > self.settings.max_retries {
                    outbox::mark_failed(&self.pool, &event.event_id, retry, &reason).await?;
                    warn!(
                        event_id = %event.event_id,
                        retry, "retries exhausted; parked"
                    );
                } else {
                    let delay = retry_delay(&self.settings.retry_schedule_secs, retry);
                    outbox::schedule_retry(&self.pool, &event.event_id, retry, delay, &reason)
                        .await?;
                    info!(
                        event_id = %event.event_id,
                        retry, delay_secs = delay, reason = %reason,
                        "delivery failed; retry scheduled"
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_walks_the_schedule_then_clamps() {
        let schedule = [60, 300, 900, 3600, 21600];
        assert_eq!(retry_delay(&schedule, 1), 60);
        assert_eq!(retry_delay(&schedule, 2), 300);
        assert_eq!(retry_delay(&schedule, 3), 900);
        assert_eq!(retry_delay(&schedule, 4), 3600);
        assert_eq!(retry_delay(&schedule, 5), 21600);
        assert_eq!(retry_delay(&schedule, 6), 21600);
        assert_eq!(retry_delay(&schedule, 100), 21600);
    }

    #[test]
    fn retry_delay_tolerates_degenerate_inputs() {
        assert_eq!(retry_delay(&[60], 1), 60);
        assert_eq!(retry_delay(&[60], 9), 60);
        // A zero or negative retry index is treated as the first retry.
        assert_eq!(retry_delay(&[60, 300], 0), 60);
    }
}
