//! Outbox relay: at-least-once delivery of committed outbox records.
//!
//! The relay runs apart from the command path. It polls [`Outbox::fetch_pending`],
//! hands each record to a [`MessagePublisher`] and marks it delivered. A failed
//! record is rescheduled with exponential backoff and dead-lettered once the
//! [`RedeliveryPolicy`] gives up.

use crate::retry::{Redelivery, RedeliveryPolicy};
use borrowing_core::environment::Clock;
use borrowing_core::outbox::{FailureDisposition, MessagePublisher, Outbox, OutboxError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Relay tuning.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Records fetched per poll.
    pub batch_size: usize,
    /// Pause between polls that found nothing to do.
    pub poll_interval: Duration,
    /// Backoff and dead-letter threshold.
    pub redelivery: RedeliveryPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            poll_interval: Duration::from_millis(500),
            redelivery: RedeliveryPolicy::default(),
        }
    }
}

/// Counts from one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Records published and marked delivered.
    pub delivered: usize,
    /// Records that failed and were rescheduled.
    pub rescheduled: usize,
    /// Records that failed for the last time.
    pub dead_lettered: usize,
}

impl RelayReport {
    /// Records touched in this pass.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.delivered + self.rescheduled + self.dead_lettered
    }
}

/// Background delivery of outbox records.
pub struct OutboxRelay<O: ?Sized, P: ?Sized> {
    outbox: Arc<O>,
    publisher: Arc<P>,
    clock: Arc<dyn Clock>,
    config: RelayConfig,
}

impl<O, P> OutboxRelay<O, P>
where
    O: Outbox + ?Sized,
    P: MessagePublisher + ?Sized,
{
    /// Create a relay.
    #[must_use]
    pub fn new(outbox: Arc<O>, publisher: Arc<P>, clock: Arc<dyn Clock>, config: RelayConfig) -> Self {
        Self {
            outbox,
            publisher,
            clock,
            config,
        }
    }

    /// Deliver one batch of due records.
    ///
    /// Publisher failures are recorded on the record, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`OutboxError`] when the outbox storage itself fails. Records
    /// published before the failure may be published again on the next pass.
    #[tracing::instrument(skip(self), fields(batch_size = self.config.batch_size))]
    pub async fn run_once(&self) -> Result<RelayReport, OutboxError> {
        let now = self.clock.now();
        let pending = self.outbox.fetch_pending(now, self.config.batch_size).await?;
        let mut report = RelayReport::default();

        for record in pending {
            match self.publisher.publish(&record).await {
                Ok(()) => {
                    self.outbox.mark_delivered(record.id, self.clock.now()).await?;
                    metrics::counter!("outbox.delivered", "message_type" => record.message.message_type.clone())
                        .increment(1);
                    report.delivered += 1;
                }
                Err(error) => {
                    let attempts = record.attempts.saturating_add(1);
                    let disposition = match self.config.redelivery.after_failure(attempts) {
                        Redelivery::RetryAfter(delay) => {
                            let delay = chrono::Duration::from_std(delay)
                                .unwrap_or_else(|_| chrono::Duration::zero());
                            FailureDisposition::RetryAt(now + delay)
                        }
                        Redelivery::GiveUp => FailureDisposition::DeadLetter,
                    };

                    self.outbox
                        .record_failure(record.id, error.to_string(), disposition)
                        .await?;

                    if disposition == FailureDisposition::DeadLetter {
                        tracing::warn!(
                            outbox_id = record.id,
                            tenant = %record.tenant_id,
                            stream_id = %record.stream_id,
                            message_type = %record.message.message_type,
                            attempts,
                            error = %error,
                            "Outbox record dead-lettered"
                        );
                        metrics::counter!("outbox.dead_lettered").increment(1);
                        report.dead_lettered += 1;
                    } else {
                        tracing::warn!(
                            outbox_id = record.id,
                            message_type = %record.message.message_type,
                            attempts,
                            error = %error,
                            "Outbox delivery failed, rescheduled"
                        );
                        metrics::counter!("outbox.delivery_failed").increment(1);
                        report.rescheduled += 1;
                    }
                }
            }
        }

        if report.total() > 0 {
            tracing::info!(
                delivered = report.delivered,
                rescheduled = report.rescheduled,
                dead_lettered = report.dead_lettered,
                "Outbox batch processed"
            );
        }

        Ok(report)
    }

    /// Poll until `shutdown` resolves.
    ///
    /// A full batch is followed immediately by another pass; otherwise the relay
    /// sleeps for the poll interval. Storage errors are logged and retried on the
    /// next tick.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis(),
            "Outbox relay started"
        );

        loop {
            let pause = match self.run_once().await {
                Ok(report) if report.total() >= self.config.batch_size => Duration::ZERO,
                Ok(_) => self.config.poll_interval,
                Err(error) => {
                    tracing::warn!(error = %error, "Outbox relay pass failed");
                    self.config.poll_interval
                }
            };

            tokio::select! {
                () = &mut shutdown => break,
                () = tokio::time::sleep(pause) => {}
            }
        }

        tracing::info!("Outbox relay stopped");
    }
}
