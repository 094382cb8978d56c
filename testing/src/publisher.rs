//! A [`MessagePublisher`] that remembers what it was asked to publish.

use borrowing_core::outbox::{MessagePublisher, OutboxError, PendingMessage};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Inner {
    published: Vec<PendingMessage>,
    failures_left: usize,
    always_fail: bool,
    attempts: usize,
}

/// Records successful publishes; fails on demand.
///
/// # Example
///
/// ```
/// use borrowing_testing::RecordingPublisher;
///
/// let publisher = RecordingPublisher::new();
/// publisher.fail_next(2);
/// assert!(publisher.published().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    inner: Mutex<Inner>,
}

impl RecordingPublisher {
    /// A publisher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher that rejects everything.
    #[must_use]
    pub fn failing() -> Self {
        let publisher = Self::default();
        publisher.lock().always_fail = true;
        publisher
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject the next `n` publishes.
    pub fn fail_next(&self, n: usize) {
        self.lock().failures_left = n;
    }

    /// Stop rejecting.
    pub fn recover(&self) {
        let mut inner = self.lock();
        inner.failures_left = 0;
        inner.always_fail = false;
    }

    /// Messages published successfully, in order.
    #[must_use]
    pub fn published(&self) -> Vec<PendingMessage> {
        self.lock().published.clone()
    }

    /// Every publish call, successful or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }
}

impl MessagePublisher for RecordingPublisher {
    fn publish<'a>(
        &'a self,
        message: &'a PendingMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), OutboxError>> + Send + 'a>> {
        let result = {
            let mut inner = self.lock();
            inner.attempts += 1;
            if inner.always_fail {
                Err(OutboxError::Publish("publisher is down".to_string()))
            } else if inner.failures_left > 0 {
                inner.failures_left -= 1;
                Err(OutboxError::Publish("transient publish failure".to_string()))
            } else {
                inner.published.push(message.clone());
                Ok(())
            }
        };

        Box::pin(async move { result })
    }
}
