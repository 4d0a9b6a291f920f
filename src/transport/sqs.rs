use async_trait::async_trait;
use aws_sdk_sqs::types::MessageAttributeValue;

use crate::{
    Envelope,
    envelope::MessageAttributes,
    transport::{MessageId, ReceiveRequest, ReceivedMessage, Receiver, Sender},
};

/// Amazon SQS queue backend.
///
/// ## Mapping
///
/// - `Envelope.message` → message body
/// - `Envelope.attributes` → `String` message attributes
///
/// Receives request every message attribute. Attributes with a non-string
/// value are dropped on the way in.
#[derive(Clone)]
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    /// Create a queue client.
    ///
    /// # Arguments
    ///
    /// * `client` - Configured SQS client.
    /// * `queue_url` - URL of the queue to send to and poll.
    pub fn new(client: aws_sdk_sqs::Client, queue_url: impl Into<String>) -> Self {
        Self {
            client,
            queue_url: queue_url.into(),
        }
    }
}

#[async_trait]
impl Sender<String> for SqsQueue {
    type Error = tower::BoxError;

    #[tracing::instrument(skip_all, fields(queue_url = %self.queue_url))]
    async fn send(&self, envelope: Envelope<String>) -> Result<MessageId, Self::Error> {
        let mut request = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(envelope.message);

        for (name, value) in envelope.attributes {
            let value = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()?;
            request = request.message_attributes(name, value);
        }

        let output = request.send().await?;
        Ok(MessageId(output.message_id().unwrap_or_default().to_owned()))
    }
}

#[async_trait]
impl Receiver for SqsQueue {
    type Error = tower::BoxError;

    #[tracing::instrument(skip_all, fields(queue_url = %self.queue_url))]
    async fn receive(&self, request: ReceiveRequest) -> Result<Vec<ReceivedMessage>, Self::Error> {
        let wait_secs = i32::try_from(request.wait_time.as_secs()).unwrap_or(i32::MAX);
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(request.max_messages)
            .wait_time_seconds(wait_secs)
            .message_attribute_names("All")
            .send()
            .await?;

        let messages = output
            .messages()
            .iter()
            .map(|message| {
                let attributes: MessageAttributes = message
                    .message_attributes()
                    .into_iter()
                    .flatten()
                    .filter_map(|(name, value)| {
                        value
                            .string_value()
                            .map(|value| (name.clone(), value.to_owned()))
                    })
                    .collect();

                ReceivedMessage {
                    message_id: MessageId(message.message_id().unwrap_or_default().to_owned()),
                    receipt_handle: message.receipt_handle().unwrap_or_default().to_owned(),
                    envelope: Envelope::from((
                        attributes,
                        message.body().unwrap_or_default().to_owned(),
                    )),
                }
            })
            .collect();

        Ok(messages)
    }

    #[tracing::instrument(skip_all, fields(message_id = %message.message_id))]
    async fn delete(&self, message: &ReceivedMessage) -> Result<(), Self::Error> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(&message.receipt_handle)
            .send()
            .await?;
        Ok(())
    }
}
