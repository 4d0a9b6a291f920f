use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use tokio::sync::Mutex;

use crate::{
    Envelope,
    envelope::MessageAttributes,
    transport::{MessageId, ReceiveRequest, ReceivedMessage, Receiver, Sender},
};

/// In-memory queue for testing or local pipelines.
///
/// Models the parts of a managed queue the consumer relies on:
///
/// - received messages become invisible until deleted
/// - [`redeliver`](InMemoryQueue::redeliver) plays the role of an expired
///   visibility timeout, making undeleted messages receivable again
/// - every delivery gets a fresh receipt handle; deleting with an unknown one
///   fails
///
/// Receives never block: the long-poll wait is ignored. Clones share the same
/// queue, and each side can be made to fail for fault-injection tests.
#[derive(Clone, Default)]
pub struct InMemoryQueue {
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    next_receipt: u64,
    pending: VecDeque<StoredMessage>,
    in_flight: HashMap<String, StoredMessage>,
    deleted: Vec<MessageId>,
    fail_send: bool,
    fail_receive: bool,
    fail_delete: bool,
}

/// A message held by [`InMemoryQueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub message_id: MessageId,
    pub envelope: Envelope<String>,
    /// How many times the message has been handed out.
    pub receive_count: u32,
}

impl InMemoryQueue {
    /// Enqueue a raw body directly, bypassing any transport layer.
    pub async fn push_raw(&self, body: impl Into<String>, attributes: MessageAttributes) -> MessageId {
        self.state.lock().await.push(Envelope::from((attributes, body.into())))
    }

    /// Messages waiting to be received, in delivery order.
    pub async fn pending(&self) -> Vec<StoredMessage> {
        self.state.lock().await.pending.iter().cloned().collect()
    }

    /// Number of received but not yet deleted messages.
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    /// Ids of deleted messages, in deletion order.
    pub async fn deleted(&self) -> Vec<MessageId> {
        self.state.lock().await.deleted.clone()
    }

    /// Make every in-flight message visible again.
    pub async fn redeliver(&self) {
        let mut state = self.state.lock().await;
        let mut returned: Vec<_> = state.in_flight.drain().map(|(_, msg)| msg).collect();
        returned.sort_by(|a, b| a.message_id.0.cmp(&b.message_id.0));
        for msg in returned.into_iter().rev() {
            state.pending.push_front(msg);
        }
    }

    /// Make every `send` fail until reset.
    pub async fn set_send_failing(&self, failing: bool) {
        self.state.lock().await.fail_send = failing;
    }

    /// Make every `receive` fail until reset.
    pub async fn set_receive_failing(&self, failing: bool) {
        self.state.lock().await.fail_receive = failing;
    }

    /// Make every `delete` fail until reset.
    pub async fn set_delete_failing(&self, failing: bool) {
        self.state.lock().await.fail_delete = failing;
    }
}

impl State {
    fn push(&mut self, envelope: Envelope<String>) -> MessageId {
        self.next_id += 1;
        let message_id = MessageId(format!("msg-{:08}", self.next_id));
        self.pending.push_back(StoredMessage {
            message_id: message_id.clone(),
            envelope,
            receive_count: 0,
        });
        message_id
    }
}

#[async_trait::async_trait]
impl Sender<String> for InMemoryQueue {
    type Error = std::io::Error;

    /// Append the envelope to the back of the queue.
    #[tracing::instrument(skip_all)]
    async fn send(&self, envelope: Envelope<String>) -> Result<MessageId, Self::Error> {
        let mut state = self.state.lock().await;
        if state.fail_send {
            return Err(std::io::Error::other("in-memory queue rejected send"));
        }
        let message_id = state.push(envelope);
        tracing::debug!(%message_id, "Message sent to in-memory queue");
        Ok(message_id)
    }
}

#[async_trait::async_trait]
impl Receiver for InMemoryQueue {
    type Error = std::io::Error;

    async fn receive(&self, request: ReceiveRequest) -> Result<Vec<ReceivedMessage>, Self::Error> {
        let mut state = self.state.lock().await;
        if state.fail_receive {
            return Err(std::io::Error::other("in-memory queue rejected receive"));
        }

        let count = usize::try_from(request.max_messages.max(0)).unwrap_or_default();
        let mut received = Vec::with_capacity(count.min(state.pending.len()));
        while received.len() < count {
            let Some(mut msg) = state.pending.pop_front() else {
                break;
            };
            state.next_receipt += 1;
            let receipt_handle = format!("receipt-{}", state.next_receipt);
            msg.receive_count += 1;

            received.push(ReceivedMessage {
                message_id: msg.message_id.clone(),
                receipt_handle: receipt_handle.clone(),
                envelope: msg.envelope.clone(),
            });
            state.in_flight.insert(receipt_handle, msg);
        }
        Ok(received)
    }

    async fn delete(&self, message: &ReceivedMessage) -> Result<(), Self::Error> {
        let mut state = self.state.lock().await;
        if state.fail_delete {
            return Err(std::io::Error::other("in-memory queue rejected delete"));
        }
        let msg = state
            .in_flight
            .remove(&message.receipt_handle)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "unknown receipt handle"))?;
        state.deleted.push(msg.message_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn request(max_messages: i32) -> ReceiveRequest {
        ReceiveRequest {
            max_messages,
            wait_time: Duration::from_secs(20),
        }
    }

    #[tokio::test]
    async fn receive_respects_batch_size_and_order() {
        let queue = InMemoryQueue::default();
        for i in 0..12 {
            queue.send(Envelope::new(format!("body-{i}"))).await.unwrap();
        }

        let batch = queue.receive(request(10)).await.unwrap();

        assert_eq!(batch.len(), 10);
        assert_eq!(batch[0].body(), "body-0");
        assert_eq!(batch[9].body(), "body-9");
        assert_eq!(queue.pending().await.len(), 2);
        assert_eq!(queue.in_flight_len().await, 10);
    }

    #[tokio::test]
    async fn undeleted_messages_come_back_after_redelivery() {
        let queue = InMemoryQueue::default();
        queue.send(Envelope::new("a".to_string())).await.unwrap();
        queue.send(Envelope::new("b".to_string())).await.unwrap();

        let first = queue.receive(request(10)).await.unwrap();
        queue.delete(&first[0]).await.unwrap();
        assert!(queue.receive(request(10)).await.unwrap().is_empty());

        queue.redeliver().await;
        let second = queue.receive(request(10)).await.unwrap();

        assert_eq!(second.len(), 1);
        assert_eq!(second[0].body(), "b");
        assert_ne!(second[0].receipt_handle, first[1].receipt_handle);
        assert_eq!(queue.pending().await.len(), 0);
    }

    #[tokio::test]
    async fn stale_receipt_handles_cannot_delete() {
        let queue = InMemoryQueue::default();
        queue.send(Envelope::new("a".to_string())).await.unwrap();

        let first = queue.receive(request(1)).await.unwrap();
        queue.redeliver().await;
        let _second = queue.receive(request(1)).await.unwrap();

        assert!(queue.delete(&first[0]).await.is_err());
        assert!(queue.deleted().await.is_empty());
    }

    #[tokio::test]
    async fn attributes_travel_with_the_body() {
        let queue = InMemoryQueue::default();
        queue
            .send(Envelope::new("a".to_string()).with_attribute("correlationId", "cid"))
            .await
            .unwrap();

        let batch = queue.receive(request(1)).await.unwrap();
        assert_eq!(batch[0].envelope.attribute("correlationId"), Some("cid"));
    }
}
