//! Queue consumer that archives emails.
//!
//! The consumer side of the pipeline:
//!
//! - [`Poller`] receives batches from a [`Receiver`](crate::transport::Receiver)
//!   on a fixed interval
//! - [`Processor`] parses each body, checks the fields again and archives it
//! - a message is deleted from the queue only after it has been archived
//!
//! Anything not deleted is left to the queue: it becomes visible again after
//! the visibility timeout and is redelivered. Archive keys are deterministic,
//! so a redelivered message overwrites its earlier copy.
//!
//! Lifecycle events are reported through a [`ConsumerHook`].

mod poller;
mod processor;

use crate::{
    archive::StorageKey,
    email::{CORRELATION_ID_ATTRIBUTE, CorrelationId},
    transport::ReceivedMessage,
};

pub use poller::{CycleReport, Poller, PollerConfig};
pub use processor::{ProcessError, ProcessErrorKind, Processor};

/// Source of poll cycle ticks.
///
/// Implemented for [`tokio::time::Interval`]; tests drive the poller with
/// their own ticker.
#[async_trait::async_trait]
pub trait Ticker: Send {
    /// Wait until the next cycle is due.
    async fn tick(&mut self);
}

#[async_trait::async_trait]
impl Ticker for tokio::time::Interval {
    async fn tick(&mut self) {
        tokio::time::Interval::tick(self).await;
    }
}

/// Correlation id carried by a received message.
///
/// A missing or blank attribute yields [`CorrelationId::unknown`].
pub fn correlation_id_of(message: &ReceivedMessage) -> CorrelationId {
    message
        .envelope
        .attribute(CORRELATION_ID_ATTRIBUTE)
        .filter(|value| !value.trim().is_empty())
        .map(CorrelationId::from)
        .unwrap_or_else(CorrelationId::unknown)
}

/// Hook trait for observing consumer lifecycle events.
///
/// Hooks are invoked synchronously and should avoid heavy or blocking work.
/// Typical use cases include logging, metrics, and tracing integration.
pub trait ConsumerHook: Send + Sync {
    fn on_startup(&self);
    fn on_shutdown(&self);
    fn on_receive_error(&self, error: &dyn std::error::Error);
    fn on_empty_batch(&self);
    fn on_batch_received(&self, count: usize);
    fn on_missing_correlation_id(&self, message: &ReceivedMessage);
    fn on_message_processed(
        &self,
        message: &ReceivedMessage,
        correlation_id: &CorrelationId,
        key: &StorageKey,
    );
    fn on_message_failed(
        &self,
        message: &ReceivedMessage,
        correlation_id: &CorrelationId,
        error: &ProcessError,
    );
    fn on_message_deleted(&self, message: &ReceivedMessage, correlation_id: &CorrelationId);
    fn on_delete_error(
        &self,
        message: &ReceivedMessage,
        correlation_id: &CorrelationId,
        error: &dyn std::error::Error,
    );
}

/// Default consumer hook implementation.
///
/// Logs lifecycle events using `tracing`.
pub struct DefaultConsumerHook;

impl ConsumerHook for DefaultConsumerHook {
    fn on_startup(&self) {
        tracing::info!("Consumer is starting up");
    }

    fn on_shutdown(&self) {
        tracing::info!("Consumer is shutting down");
    }

    fn on_receive_error(&self, error: &dyn std::error::Error) {
        tracing::error!(%error, "Error receiving messages");
    }

    fn on_empty_batch(&self) {
        tracing::debug!("No messages to process");
    }

    fn on_batch_received(&self, count: usize) {
        tracing::info!(count, "Received messages");
    }

    fn on_missing_correlation_id(&self, message: &ReceivedMessage) {
        tracing::warn!(message_id = %message.message_id, "Message has no correlation id");
    }

    fn on_message_processed(
        &self,
        message: &ReceivedMessage,
        correlation_id: &CorrelationId,
        key: &StorageKey,
    ) {
        tracing::info!(message_id = %message.message_id, %correlation_id, %key, "Message processed");
    }

    fn on_message_failed(
        &self,
        message: &ReceivedMessage,
        correlation_id: &CorrelationId,
        error: &ProcessError,
    ) {
        tracing::error!(
            message_id = %message.message_id,
            %correlation_id,
            %error,
            "Failed to process message, leaving it for redelivery"
        );
    }

    fn on_message_deleted(&self, message: &ReceivedMessage, correlation_id: &CorrelationId) {
        tracing::debug!(message_id = %message.message_id, %correlation_id, "Message deleted from queue");
    }

    fn on_delete_error(
        &self,
        message: &ReceivedMessage,
        correlation_id: &CorrelationId,
        error: &dyn std::error::Error,
    ) {
        tracing::error!(
            message_id = %message.message_id,
            %correlation_id,
            %error,
            "Failed to delete message from queue"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Envelope, transport::MessageId};

    fn received(attributes: &[(&str, &str)]) -> ReceivedMessage {
        let mut envelope = Envelope::new(String::new());
        for (name, value) in attributes {
            envelope = envelope.with_attribute(*name, *value);
        }
        ReceivedMessage {
            message_id: MessageId("m".into()),
            receipt_handle: "r".into(),
            envelope,
        }
    }

    #[test]
    fn correlation_id_comes_from_the_attribute() {
        let cid = correlation_id_of(&received(&[("correlationId", "abc")]));
        assert_eq!(cid.as_str(), "abc");
    }

    #[test]
    fn missing_or_blank_correlation_id_is_unknown() {
        assert!(correlation_id_of(&received(&[])).is_unknown());
        assert!(correlation_id_of(&received(&[("correlationId", "  ")])).is_unknown());
        assert!(correlation_id_of(&received(&[("sender", "abc")])).is_unknown());
    }
}
