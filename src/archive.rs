//! Archiving of processed emails into a partitioned object store.
//!
//! ## Components
//!
//! - [`ObjectStore`]: Trait implemented by object store backends
//! - [`StorageKey`]: Deterministic key derivation
//! - [`Archiver`]: Builds the [`ArchivedRecord`] and writes it
//! - [`ArchiveError`]: Serialization or store failure with tracing context
//!
//! Writes are plain puts. A second write to an existing key overwrites it,
//! which is what makes at-least-once redelivery harmless.

pub mod inmemory;
mod key;

#[cfg(feature = "aws")]
pub mod s3;

use std::{collections::BTreeMap, fmt};

use tracing_error::SpanTrace;

use crate::{
    clock::{Clock, SystemClock},
    email::{ArchivedRecord, CorrelationId, Email},
};

pub use key::{StorageKey, sanitize_sender};

/// Content type of every archived object.
pub const CONTENT_TYPE: &str = "application/json";

/// A single object write.
#[derive(Debug, Clone, PartialEq)]
pub struct PutObject {
    pub key: String,
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub metadata: BTreeMap<String, String>,
}

/// Trait implemented by object store backends.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend-specific error type.
    type Error: Into<tower::BoxError>;

    /// Store `object`, replacing anything already under its key.
    async fn put(&self, object: PutObject) -> Result<(), Self::Error>;
}

/// Writes emails to an [`ObjectStore`] under a derived [`StorageKey`].
pub struct Archiver<O, C = SystemClock> {
    store: O,
    clock: C,
}

impl<O: ObjectStore> Archiver<O, SystemClock> {
    /// Create an archiver over `store` using the system clock.
    pub fn new(store: O) -> Self {
        Self {
            store,
            clock: SystemClock,
        }
    }
}

impl<O: ObjectStore, C: Clock> Archiver<O, C> {
    /// Replace the clock used for `processedAt` and the key fallback.
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Archiver<O, C2> {
        Archiver {
            store: self.store,
            clock,
        }
    }

    /// Archive `email` and return the key it was written under.
    ///
    /// `original_timestamp` is the producer's enqueue time, carried through
    /// unchanged. The object body embeds its own key; the correlation id,
    /// sender, subject, timestream and processing time are mirrored into
    /// object metadata.
    #[tracing::instrument(skip_all, fields(correlation_id = %correlation_id))]
    pub async fn archive(
        &self,
        email: &Email,
        original_timestamp: Option<i64>,
        correlation_id: &CorrelationId,
    ) -> Result<StorageKey, ArchiveError> {
        let now = self.clock.now();
        let key = StorageKey::derive(email.timestream(), email.sender(), now);
        let processed_at = now.timestamp_millis();

        let record = ArchivedRecord::new(
            email,
            correlation_id,
            original_timestamp,
            processed_at,
            key.as_str(),
        );
        let body = serde_json::to_vec(&record).map_err(ArchiveError::serialize)?;
        let size = body.len();

        let metadata = BTreeMap::from([
            ("correlation-id".to_owned(), correlation_id.to_string()),
            ("email-sender".to_owned(), email.sender().to_owned()),
            ("email-subject".to_owned(), email.subject().to_owned()),
            ("email-timestream".to_owned(), email.timestream().to_owned()),
            ("processed-at".to_owned(), processed_at.to_string()),
        ]);

        self.store
            .put(PutObject {
                key: key.as_str().to_owned(),
                body,
                content_type: CONTENT_TYPE,
                metadata,
            })
            .await
            .map_err(|e| {
                let error = ArchiveError::store(e.into());
                tracing::error!(%error, %key, "Failed to archive email");
                error
            })?;

        tracing::info!(%key, size, "Archived email");
        Ok(key)
    }
}

/// Error returned when archiving fails.
#[derive(Debug)]
pub struct ArchiveError {
    context: SpanTrace,
    kind: ArchiveErrorKind,
}

/// Archive error kinds.
#[derive(Debug)]
pub enum ArchiveErrorKind {
    /// The record could not be encoded.
    Serialize(serde_json::Error),
    /// The object store rejected the write.
    Store(tower::BoxError),
}

impl ArchiveError {
    fn serialize(err: serde_json::Error) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: ArchiveErrorKind::Serialize(err),
        }
    }

    fn store(err: tower::BoxError) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: ArchiveErrorKind::Store(err),
        }
    }

    /// Returns the kind of archive error.
    pub fn kind(&self) -> &ArchiveErrorKind {
        &self.kind
    }
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ArchiveErrorKind::Serialize(err) => writeln!(f, "Serialize error: {err}"),
            ArchiveErrorKind::Store(err) => writeln!(f, "Object store error: {err}"),
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ArchiveErrorKind::Serialize(err) => Some(err),
            ArchiveErrorKind::Store(err) => Some(err.as_ref()),
        }
    }
}
