//! Queue plumbing: envelopes go out through a tower stack, batches come back
//! through a [`Receiver`].
//!
//! Sending is a `tower::Service` so middleware can sit between the publisher
//! and the backend. [`layers::JsonLayer`] is the one used in practice: it
//! turns a typed message into the string body a queue stores.
//!
//! ```text
//! Transport ── JsonLayer ── SendService ── Sender (InMemoryQueue, SqsQueue)
//! ```
//!
//! Receiving is not a service. The poller calls [`Receiver::receive`] and
//! [`Receiver::delete`] directly, once per batch and once per archived message.

pub mod inmemory;
pub mod layers;

#[cfg(feature = "aws")]
pub mod sqs;

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use tower::{Service, ServiceExt as _};
use tracing_error::SpanTrace;

use crate::{Envelope, envelope::MessageAttributes};

pub use inmemory::InMemoryQueue;

/// Identifier the queue assigned to an enqueued message.
///
/// Used for logging and tracing only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outbound half of a queue: a tower service stack ending in a [`Sender`].
///
/// Build it with [`Transport::new`] and stack middleware with
/// [`Transport::layer`]. Whatever the stack fails with comes back from
/// [`Transport::send`] as a [`TransportError`].
#[derive(Clone)]
pub struct Transport<S> {
    stack: S,
}

impl<D> Transport<SendService<D>> {
    /// Wrap a sender backend.
    pub fn new(sender: D) -> Self {
        Self {
            stack: SendService::new(sender),
        }
    }
}

impl<S> Transport<S> {
    /// Put `layer` on top of the current stack.
    pub fn layer<L: tower::Layer<S>>(self, layer: L) -> Transport<L::Service> {
        Transport {
            stack: layer.layer(self.stack),
        }
    }

    /// Push one envelope through the stack.
    ///
    /// Takes `&self`: every call drives its own clone of the stack.
    pub async fn send<M>(&self, envelope: Envelope<M>) -> Result<S::Response, TransportError>
    where
        M: Send + 'static,
        S: Service<Envelope<M>> + Clone + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Into<tower::BoxError>,
    {
        let stack = self.stack.clone();
        match stack.oneshot(envelope).await {
            Ok(response) => Ok(response),
            Err(err) => Err(TransportError::sender(err.into())),
        }
    }
}

/// A failed send, receive or delete.
///
/// Carries the span trace of where it was raised; `Display` prints it after
/// the message.
#[derive(Debug)]
pub struct TransportError {
    context: SpanTrace,
    kind: TransportErrorKind,
}

/// What part of the queue round trip failed.
#[derive(Debug)]
pub enum TransportErrorKind {
    /// The backend refused or failed to enqueue.
    Sender(tower::BoxError),
    /// Receiving a batch or deleting a message failed.
    Receiver(tower::BoxError),
    /// The message could not be turned into a body.
    Serde(tower::BoxError),
}

impl TransportError {
    fn new(kind: TransportErrorKind) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind,
        }
    }

    /// Classify a failure coming out of a send stack.
    ///
    /// Layers may already have raised a `TransportError` (a serialization
    /// failure, say); that one is unwrapped instead of being nested.
    pub fn sender(err: tower::BoxError) -> Self {
        err.downcast::<TransportError>()
            .map(|err| *err)
            .unwrap_or_else(|err| Self::new(TransportErrorKind::Sender(err)))
    }

    /// A receive or delete call failed.
    pub fn receiver(err: tower::BoxError) -> Self {
        Self::new(TransportErrorKind::Receiver(err))
    }

    /// The message body could not be encoded.
    pub fn serde(err: tower::BoxError) -> Self {
        Self::new(TransportErrorKind::Serde(err))
    }

    /// Returns the kind of transport error.
    pub fn kind(&self) -> &TransportErrorKind {
        &self.kind
    }

    fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        match &self.kind {
            TransportErrorKind::Sender(err)
            | TransportErrorKind::Receiver(err)
            | TransportErrorKind::Serde(err) => err.as_ref(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            TransportErrorKind::Sender(_) => "Failed to enqueue message",
            TransportErrorKind::Receiver(_) => "Queue receive or delete failed",
            TransportErrorKind::Serde(_) => "Failed to encode message body",
        };
        writeln!(f, "{what}: {}", self.cause())?;
        self.context.fmt(f)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause())
    }
}

/// Bottom of every send stack: hands envelopes to a [`Sender`] backend.
///
/// The backend sits behind an `Arc`, so clones of the stack share one
/// backend and backends need not be `Clone` themselves.
pub struct SendService<D> {
    sender: Arc<D>,
}

impl<D> SendService<D> {
    pub fn new(sender: D) -> Self {
        Self {
            sender: Arc::new(sender),
        }
    }
}

impl<D> Clone for SendService<D> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<M, D> Service<Envelope<M>> for SendService<D>
where
    M: Send + 'static,
    D: Sender<M> + 'static,
{
    type Response = MessageId;
    type Error = tower::BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<MessageId, tower::BoxError>> + Send>>;

    /// Always ready; backpressure is the backend's business.
    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, envelope: Envelope<M>) -> Self::Future {
        let sender = Arc::clone(&self.sender);
        Box::pin(async move {
            sender
                .send(envelope)
                .await
                .map_err(Into::<tower::BoxError>::into)
        })
    }
}

/// Trait implemented by queue backends that accept messages.
#[async_trait::async_trait]
pub trait Sender<M>: Send + Sync {
    /// Backend-specific error type.
    type Error: Into<tower::BoxError>;

    /// Enqueue an envelope, returning the queue-assigned id.
    async fn send(&self, envelope: Envelope<M>) -> Result<MessageId, Self::Error>;
}

/// Parameters of one batch receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiveRequest {
    /// Upper bound on messages returned.
    pub max_messages: i32,
    /// Long-poll wait: how long the queue may hold the call open when empty.
    pub wait_time: Duration,
}

/// A message handed out by the queue.
///
/// The message stays owned by the queue until deleted through its
/// `receipt_handle`. If never deleted it becomes visible again and is
/// redelivered as a fresh receive with the same body.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub receipt_handle: String,
    pub envelope: Envelope<String>,
}

impl ReceivedMessage {
    /// The raw message body.
    pub fn body(&self) -> &str {
        &self.envelope.message
    }

    /// String attributes sent with the message.
    pub fn attributes(&self) -> &MessageAttributes {
        &self.envelope.attributes
    }
}

/// Trait implemented by queue backends that hand out messages.
#[async_trait::async_trait]
pub trait Receiver: Send + Sync {
    /// Backend-specific error type.
    type Error: Into<tower::BoxError>;

    /// Receive up to `request.max_messages` messages.
    ///
    /// An empty result is a normal outcome, not an error.
    async fn receive(&self, request: ReceiveRequest) -> Result<Vec<ReceivedMessage>, Self::Error>;

    /// Permanently remove a received message from the queue.
    async fn delete(&self, message: &ReceivedMessage) -> Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refusing;

    #[async_trait::async_trait]
    impl Sender<String> for Refusing {
        type Error = std::io::Error;

        async fn send(&self, _envelope: Envelope<String>) -> Result<MessageId, Self::Error> {
            Err(std::io::Error::other("queue unavailable"))
        }
    }

    #[tokio::test]
    async fn send_returns_the_queue_message_id() {
        let queue = InMemoryQueue::default();
        let transport = Transport::new(queue.clone());

        let id = transport.send(Envelope::new("body".to_string())).await.unwrap();

        assert_eq!(queue.pending().await[0].message_id, id);
    }

    #[tokio::test]
    async fn backend_failures_become_sender_errors() {
        let transport = Transport::new(Refusing);

        let err = transport
            .send(Envelope::new("body".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(err.kind(), TransportErrorKind::Sender(_)));
        assert!(err.to_string().contains("queue unavailable"));
    }
}
