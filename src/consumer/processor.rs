use std::fmt;

use tracing_error::SpanTrace;

use crate::{
    archive::{ArchiveError, Archiver, ObjectStore, StorageKey},
    clock::{Clock, SystemClock},
    email::{CorrelationId, QueuedMessage},
    validation::ValidationError,
};

/// Parses, re-checks and archives one dequeued message body.
///
/// The four text fields are checked again here even though the producer
/// already did: nothing about what arrived on the wire is trusted. Only the
/// blank-field rule is applied; an unparseable timestamp is left for the
/// archiver's key fallback.
pub struct Processor<O, C = SystemClock> {
    archiver: Archiver<O, C>,
}

impl<O: ObjectStore, C: Clock> Processor<O, C> {
    /// Create a processor that stores through `archiver`.
    pub fn new(archiver: Archiver<O, C>) -> Self {
        Self { archiver }
    }

    /// Process one raw queue body.
    ///
    /// Every failure is returned, never raised: the caller only needs to know
    /// whether the message may be deleted.
    #[tracing::instrument(skip_all, fields(correlation_id = %correlation_id))]
    pub async fn process(
        &self,
        body: &str,
        correlation_id: &CorrelationId,
    ) -> Result<StorageKey, ProcessError> {
        let message: QueuedMessage = serde_json::from_str(body).map_err(ProcessError::parse)?;
        let email = message.email().map_err(ProcessError::validation)?;

        self.archiver
            .archive(&email, message.timestamp, correlation_id)
            .await
            .map_err(ProcessError::archive)
    }
}

/// Error returned when a message could not be processed.
#[derive(Debug)]
pub struct ProcessError {
    context: SpanTrace,
    kind: ProcessErrorKind,
}

/// Processing error kinds.
#[derive(Debug)]
pub enum ProcessErrorKind {
    /// The body is not a queued message.
    Parse(serde_json::Error),
    /// A text field is absent or blank.
    Validation(ValidationError),
    /// The archive write failed.
    Archive(ArchiveError),
}

impl ProcessError {
    fn parse(err: serde_json::Error) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: ProcessErrorKind::Parse(err),
        }
    }

    fn validation(err: ValidationError) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: ProcessErrorKind::Validation(err),
        }
    }

    fn archive(err: ArchiveError) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: ProcessErrorKind::Archive(err),
        }
    }

    /// Returns the kind of processing error.
    pub fn kind(&self) -> &ProcessErrorKind {
        &self.kind
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ProcessErrorKind::Parse(err) => writeln!(f, "Parse error: {err}"),
            ProcessErrorKind::Validation(err) => writeln!(f, "Invalid email message: {err}"),
            ProcessErrorKind::Archive(err) => writeln!(f, "Archive error: {err}"),
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ProcessErrorKind::Parse(err) => Some(err),
            ProcessErrorKind::Validation(err) => Some(err),
            ProcessErrorKind::Archive(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{archive::inmemory::InMemoryObjectStore, clock::FixedClock, email::Email};

    fn processor(store: InMemoryObjectStore) -> Processor<InMemoryObjectStore, FixedClock> {
        Processor::new(Archiver::new(store).with_clock(FixedClock::at_secs(1_760_000_000)))
    }

    fn body(subject: &str, sender: &str, timestream: &str, content: &str) -> String {
        serde_json::json!({
            "emailSubject": subject,
            "emailSender": sender,
            "emailTimestream": timestream,
            "emailContent": content,
            "correlationId": "cid",
            "timestamp": 1_693_561_101_000i64,
        })
        .to_string()
    }

    #[tokio::test]
    async fn publisher_output_round_trips_into_one_archive() {
        let store = InMemoryObjectStore::default();
        let email = Email::from_parts(Some("s"), Some("John doe"), Some("1693561101"), Some("c"))
            .unwrap();
        let cid = CorrelationId::from("cid");
        let raw = serde_json::to_string(&QueuedMessage::new(&email, &cid, 42)).unwrap();

        let key = processor(store.clone()).process(&raw, &cid).await.unwrap();

        assert_eq!(key.as_str(), "emails/2023/09/01/1693561101-john_doe.json");
        assert_eq!(store.put_count(), 1);
    }

    #[tokio::test]
    async fn malformed_json_is_a_parse_error() {
        let store = InMemoryObjectStore::default();

        let err = processor(store.clone())
            .process("{not json", &CorrelationId::unknown())
            .await
            .unwrap_err();

        assert!(matches!(err.kind(), ProcessErrorKind::Parse(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn blank_field_skips_the_archiver() {
        let store = InMemoryObjectStore::default();

        let err = processor(store.clone())
            .process(&body("s", "f", "1693561101", "  "), &CorrelationId::unknown())
            .await
            .unwrap_err();

        assert!(matches!(err.kind(), ProcessErrorKind::Validation(_)));
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn missing_field_skips_the_archiver() {
        let store = InMemoryObjectStore::default();

        let err = processor(store.clone())
            .process(r#"{"emailSubject":"s","emailSender":"f"}"#, &CorrelationId::unknown())
            .await
            .unwrap_err();

        assert!(matches!(err.kind(), ProcessErrorKind::Validation(_)));
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn non_numeric_timestamp_reaches_the_key_fallback() {
        let store = InMemoryObjectStore::default();

        let key = processor(store.clone())
            .process(&body("s", "f", "soon", "c"), &CorrelationId::unknown())
            .await
            .unwrap();

        assert_eq!(key.as_str(), "emails/2025/10/09/1760000000-f.json");
    }

    #[tokio::test]
    async fn archive_failure_is_returned() {
        let store = InMemoryObjectStore::default();
        store.set_failing(true);

        let err = processor(store)
            .process(&body("s", "f", "1693561101", "c"), &CorrelationId::unknown())
            .await
            .unwrap_err();

        assert!(matches!(err.kind(), ProcessErrorKind::Archive(_)));
    }
}
