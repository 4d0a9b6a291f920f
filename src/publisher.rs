//! Producer side: hand validated emails to the queue.

use tower::Service;

use crate::{
    Envelope,
    clock::{Clock, SystemClock},
    email::{CORRELATION_ID_ATTRIBUTE, CorrelationId, Email, QueuedMessage, SENDER_ATTRIBUTE},
    transport::{MessageId, Transport, TransportError},
};

/// Tower service stack a [`Publisher`] can send through.
///
/// Implemented for any cloneable service taking a queued message envelope and
/// answering with the queue message id, e.g.
/// `Transport::new(queue).layer(JsonLayer)`'s inner stack.
pub trait QueueService:
    Service<
        Envelope<QueuedMessage>,
        Response = MessageId,
        Error: Into<tower::BoxError>,
        Future: Send + 'static,
    > + Clone
    + Send
    + Sync
    + 'static
{
}

impl<S> QueueService for S where
    S: Service<
            Envelope<QueuedMessage>,
            Response = MessageId,
            Error: Into<tower::BoxError>,
            Future: Send + 'static,
        > + Clone
        + Send
        + Sync
        + 'static
{
}

/// Serializes emails into queue messages and enqueues them.
///
/// No retries happen here: a failed send is returned to the caller, which is
/// expected to report a server error to the client.
pub struct Publisher<S, C = SystemClock> {
    transport: Transport<S>,
    clock: C,
}

impl<S: QueueService> Publisher<S, SystemClock> {
    /// Create a publisher over `transport` using the system clock.
    pub fn new(transport: Transport<S>) -> Self {
        Self {
            transport,
            clock: SystemClock,
        }
    }
}

impl<S: QueueService, C: Clock> Publisher<S, C> {
    /// Replace the clock used for the enqueue timestamp.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Publisher<S, C2> {
        Publisher {
            transport: self.transport,
            clock,
        }
    }

    /// Enqueue `email` tagged with `correlation_id`.
    ///
    /// The body is the JSON [`QueuedMessage`]; the correlation id and the raw
    /// sender also travel as queue attributes. Returns the queue-assigned
    /// message id.
    #[tracing::instrument(skip_all, fields(correlation_id = %correlation_id))]
    pub async fn publish(
        &self,
        email: &Email,
        correlation_id: &CorrelationId,
    ) -> Result<MessageId, TransportError> {
        let message = QueuedMessage::new(email, correlation_id, self.clock.now().timestamp_millis());
        let envelope = Envelope::new(message)
            .with_attribute(CORRELATION_ID_ATTRIBUTE, correlation_id.as_str())
            .with_attribute(SENDER_ATTRIBUTE, email.sender());

        match self.transport.send(envelope).await {
            Ok(message_id) => {
                tracing::info!(%message_id, "Published message to queue");
                Ok(message_id)
            }
            Err(error) => {
                tracing::error!(%error, "Failed to publish message to queue");
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        clock::FixedClock,
        transport::{InMemoryQueue, ReceiveRequest, Receiver as _, layers::JsonLayer},
    };

    fn email() -> Email {
        Email::from_parts(Some("Hi"), Some("John doe"), Some("1693561101"), Some("Body")).unwrap()
    }

    #[tokio::test]
    async fn publishes_json_body_with_attributes() {
        let queue = InMemoryQueue::default();
        let publisher = Publisher::new(Transport::new(queue.clone()).layer(JsonLayer))
            .with_clock(FixedClock::at_secs(1_700_000_000));
        let correlation_id = CorrelationId::from("cid-1");

        let message_id = publisher.publish(&email(), &correlation_id).await.unwrap();

        let batch = queue
            .receive(ReceiveRequest {
                max_messages: 10,
                wait_time: Duration::ZERO,
            })
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].message_id, message_id);
        assert_eq!(batch[0].envelope.attribute("correlationId"), Some("cid-1"));
        assert_eq!(batch[0].envelope.attribute("sender"), Some("John doe"));

        let body: QueuedMessage = serde_json::from_str(batch[0].body()).unwrap();
        assert_eq!(body, QueuedMessage::new(&email(), &correlation_id, 1_700_000_000_000));
    }

    #[tokio::test]
    async fn send_failure_is_returned_without_retry() {
        let queue = InMemoryQueue::default();
        queue.set_send_failing(true).await;
        let publisher = Publisher::new(Transport::new(queue.clone()).layer(JsonLayer));

        let result = publisher.publish(&email(), &CorrelationId::generate()).await;

        assert!(result.is_err());
        queue.set_send_failing(false).await;
        assert!(queue.pending().await.is_empty());
    }
}
