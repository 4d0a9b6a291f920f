use std::fmt;

use chrono::{DateTime, Datelike, Utc};

/// Object store key of an archived email.
///
/// Shaped `emails/{year}/{MM}/{DD}/{timestamp}-{sender}.json`. The date comes
/// from the email's own timestamp interpreted as UTC epoch seconds, so the
/// same email always maps to the same key and a redelivery overwrites rather
/// than duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    /// Derive the key for an email.
    ///
    /// A `timestream` that does not parse to a representable instant does not
    /// fail: the date and the filename timestamp fall back to `now`.
    pub fn derive(timestream: &str, sender: &str, now: DateTime<Utc>) -> Self {
        let sender = sanitize_sender(sender);

        match timestream
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
        {
            Some(at) => Self::compose(at, timestream, &sender),
            None => {
                tracing::warn!(timestream, "Unparseable timestamp, keying by current date");
                Self::compose(now, &now.timestamp().to_string(), &sender)
            }
        }
    }

    fn compose(at: DateTime<Utc>, stamp: &str, sender: &str) -> Self {
        Self(format!(
            "emails/{}/{:02}/{:02}/{stamp}-{sender}.json",
            at.year(),
            at.month(),
            at.day()
        ))
    }

    /// The full object key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Replace everything outside `[A-Za-z0-9]` with `_`, then lower-case.
pub fn sanitize_sender(sender: &str) -> String {
    sender
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
