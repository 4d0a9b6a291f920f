//! Email records as they move through the system.
//!
//! The same four text fields appear in every stage, under different names:
//!
//! - [`EmailData`]: what a client submits (`email_subject`, ...), every field optional
//! - [`QueuedMessage`]: what travels on the queue (`emailSubject`, ...)
//! - [`ArchivedRecord`]: what lands in the object store
//!
//! [`Email`] is the checked form: all four fields present and non-blank.
//! It can only be obtained through [`Email::from_parts`], so holding one is
//! proof that the field check passed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::validation::{BlankFields, ValidationError};

/// Queue attribute carrying the correlation id.
pub const CORRELATION_ID_ATTRIBUTE: &str = "correlationId";
/// Queue attribute carrying the raw sender.
pub const SENDER_ATTRIBUTE: &str = "sender";

/// Per-request identifier threaded through logs, queue attributes and
/// responses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Sentinel used when a dequeued message carries no usable correlation id.
    pub const UNKNOWN: &'static str = "unknown";

    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The lossy fallback id.
    pub fn unknown() -> Self {
        Self(Self::UNKNOWN.to_owned())
    }

    /// The id as sent in queue attributes and responses.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the [`CorrelationId::UNKNOWN`] sentinel.
    pub fn is_unknown(&self) -> bool {
        self.0 == Self::UNKNOWN
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Email fields as submitted on `POST /api/email`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailData {
    #[serde(rename = "email_subject", default)]
    pub subject: Option<String>,
    #[serde(rename = "email_sender", default)]
    pub sender: Option<String>,
    #[serde(rename = "email_timestream", default)]
    pub timestream: Option<String>,
    #[serde(rename = "email_content", default)]
    pub content: Option<String>,
}

/// Four present, non-blank text fields.
///
/// Values are stored as received; trimming only applies to the blank check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    subject: String,
    sender: String,
    timestream: String,
    content: String,
}

impl Email {
    /// Check that every field is present and non-blank after trimming.
    ///
    /// The error reports every blank field at once, not just the first.
    pub fn from_parts(
        subject: Option<&str>,
        sender: Option<&str>,
        timestream: Option<&str>,
        content: Option<&str>,
    ) -> Result<Self, ValidationError> {
        fn present(value: Option<&str>) -> Option<&str> {
            value.filter(|v| !v.trim().is_empty())
        }

        match (
            present(subject),
            present(sender),
            present(timestream),
            present(content),
        ) {
            (Some(subject), Some(sender), Some(timestream), Some(content)) => Ok(Self {
                subject: subject.to_owned(),
                sender: sender.to_owned(),
                timestream: timestream.to_owned(),
                content: content.to_owned(),
            }),
            (subject, sender, timestream, content) => {
                Err(ValidationError::BlankFields(BlankFields {
                    subject: subject.is_none(),
                    sender: sender.is_none(),
                    timestream: timestream.is_none(),
                    content: content.is_none(),
                }))
            }
        }
    }

    /// The subject line, untrimmed.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The sender as submitted. Storage keys use its sanitized form.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// The timestamp as submitted: decimal Unix epoch seconds, unparsed.
    pub fn timestream(&self) -> &str {
        &self.timestream
    }

    /// The message body.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Parse the timestream as base-10 epoch seconds.
    pub fn timestamp_secs(&self) -> Result<i64, ValidationError> {
        self.timestream
            .parse::<i64>()
            .map_err(|_| ValidationError::InvalidTimestamp(self.timestream.clone()))
    }
}

impl TryFrom<&EmailData> for Email {
    type Error = ValidationError;

    fn try_from(data: &EmailData) -> Result<Self, Self::Error> {
        Email::from_parts(
            data.subject.as_deref(),
            data.sender.as_deref(),
            data.timestream.as_deref(),
            data.content.as_deref(),
        )
    }
}

/// JSON body placed on the queue by the publisher.
///
/// Fields are optional on the way in: the consumer trusts nothing about what
/// arrived and re-checks them through [`QueuedMessage::email`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    #[serde(default)]
    pub email_subject: Option<String>,
    #[serde(default)]
    pub email_sender: Option<String>,
    #[serde(default)]
    pub email_timestream: Option<String>,
    #[serde(default)]
    pub email_content: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,
    /// Enqueue time in Unix milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl QueuedMessage {
    /// Build the queue body for a checked email.
    ///
    /// # Arguments
    ///
    /// * `email` - The checked record.
    /// * `correlation_id` - Id of the request that submitted it.
    /// * `enqueued_at_ms` - Enqueue time in Unix milliseconds.
    pub fn new(email: &Email, correlation_id: &CorrelationId, enqueued_at_ms: i64) -> Self {
        Self {
            email_subject: Some(email.subject.clone()),
            email_sender: Some(email.sender.clone()),
            email_timestream: Some(email.timestream.clone()),
            email_content: Some(email.content.clone()),
            correlation_id: Some(correlation_id.clone()),
            timestamp: Some(enqueued_at_ms),
        }
    }

    /// Re-check the four text fields.
    pub fn email(&self) -> Result<Email, ValidationError> {
        Email::from_parts(
            self.email_subject.as_deref(),
            self.email_sender.as_deref(),
            self.email_timestream.as_deref(),
            self.email_content.as_deref(),
        )
    }
}

/// Immutable JSON document written to the object store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedRecord {
    pub email_subject: String,
    pub email_sender: String,
    pub email_timestream: String,
    pub email_content: String,
    pub correlation_id: CorrelationId,
    /// Producer enqueue time in Unix milliseconds, if the message carried one.
    pub original_timestamp: Option<i64>,
    /// Archive time in Unix milliseconds.
    pub processed_at: i64,
    /// The key this record is stored under.
    pub s3_key: String,
}

impl ArchivedRecord {
    /// Build the stored record.
    ///
    /// # Arguments
    ///
    /// * `email` - The re-checked record.
    /// * `correlation_id` - Id carried by the queue message.
    /// * `original_timestamp` - Producer enqueue time, if the message had one.
    /// * `processed_at` - Archive time in Unix milliseconds.
    /// * `key` - Object key the record is written under.
    pub fn new(
        email: &Email,
        correlation_id: &CorrelationId,
        original_timestamp: Option<i64>,
        processed_at: i64,
        key: &str,
    ) -> Self {
        Self {
            email_subject: email.subject.clone(),
            email_sender: email.sender.clone(),
            email_timestream: email.timestream.clone(),
            email_content: email.content.clone(),
            correlation_id: correlation_id.clone(),
            original_timestamp,
            processed_at,
            s3_key: key.to_owned(),
        }
    }
}
