//! A [`MessagePublisher`] that writes each message to the log.
//!
//! Stands in for the message bus, which lives outside this service.

use borrowing_core::outbox::{MessagePublisher, OutboxError, PendingMessage};
use std::future::Future;
use std::pin::Pin;

/// Logs every message at info level and always succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingPublisher;

impl MessagePublisher for TracingPublisher {
    fn publish<'a>(
        &'a self,
        message: &'a PendingMessage,
    ) -> Pin<Box<dyn Future<Output = Result<(), OutboxError>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!(
                outbox_id = message.id,
                tenant = %message.tenant_id,
                stream = %message.stream_id,
                message_type = %message.message.message_type,
                payload = %message.message.payload,
                "Published external message"
            );
            Ok(())
        })
    }
}
