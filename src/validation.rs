//! Token and record validation for the producer path.
//!
//! [`Validator`] answers two questions about an inbound request: does the
//! presented token match the cached secret, and is the submitted record
//! structurally sound. Both return explicit results so that a rejected request
//! can be told apart from a secret store outage.

use std::{fmt, sync::Arc};

use crate::{
    email::{Email, EmailData},
    secret::{SecretCache, SecretStore, SecretStoreError},
};

/// Validates tokens against a [`SecretCache`] and records against the field
/// rules.
pub struct Validator<S, HK = DefaultValidationHook> {
    secrets: Arc<SecretCache<S>>,
    hook: HK,
}

impl<S: SecretStore> Validator<S, DefaultValidationHook> {
    /// Create a validator over `secrets` with the default hook.
    pub fn new(secrets: Arc<SecretCache<S>>) -> Self {
        Self {
            secrets,
            hook: DefaultValidationHook,
        }
    }
}

impl<S, HK> Validator<S, HK>
where
    S: SecretStore,
    HK: ValidationHook,
{
    /// Replace the validation hook.
    pub fn with_hook<HK2: ValidationHook>(self, hook: HK2) -> Validator<S, HK2> {
        Validator {
            secrets: self.secrets,
            hook,
        }
    }

    /// Compare `provided` with the cached token, exact and case-sensitive.
    ///
    /// An empty cache triggers one synchronous reload before comparing. Every
    /// rejection, lookup failures included, is reported to the hook.
    pub async fn validate_token(&self, provided: Option<&str>) -> Result<(), AuthError> {
        let result = self.check_token(provided).await;
        if let Err(error) = &result {
            self.hook.on_token_rejected(error);
        }
        result
    }

    async fn check_token(&self, provided: Option<&str>) -> Result<(), AuthError> {
        let provided = provided.filter(|p| !p.is_empty()).ok_or(AuthError::Missing)?;
        let token = self
            .secrets
            .get_or_reload()
            .await
            .map_err(AuthError::Lookup)?;

        if token.matches(provided) {
            Ok(())
        } else {
            Err(AuthError::Mismatch)
        }
    }

    /// Check that the record is present and its four fields are non-blank
    /// after trimming.
    ///
    /// The timestamp is not parsed here. Only rejections reach the hook.
    pub fn validate_fields(&self, data: Option<&EmailData>) -> Result<Email, ValidationError> {
        let result = data
            .ok_or(ValidationError::MissingData)
            .and_then(Email::try_from);
        if let Err(error) = &result {
            self.hook.on_email_rejected(error);
        }
        result
    }

    /// Check that the timestamp of an already field-checked record parses as
    /// a base-10 integer greater than zero.
    pub fn validate_timestamp(&self, email: Email) -> Result<Email, ValidationError> {
        let result = match email.timestamp_secs() {
            Ok(secs) if secs > 0 => Ok(email),
            Ok(secs) => Err(ValidationError::NonPositiveTimestamp(secs)),
            Err(error) => Err(error),
        };
        match &result {
            Ok(_) => self.hook.on_email_accepted(),
            Err(error) => self.hook.on_email_rejected(error),
        }
        result
    }

    /// Check the submitted record.
    ///
    /// All four fields must be present and non-blank after trimming, and the
    /// timestamp must parse as a base-10 integer greater than zero. No range
    /// check against the current time is applied.
    ///
    /// # Arguments
    ///
    /// * `data` - The `data` object of the request, if one was sent.
    pub fn validate_email_data(&self, data: Option<&EmailData>) -> Result<Email, ValidationError> {
        let email = self.validate_fields(data)?;
        self.validate_timestamp(email)
    }
}

/// Token check failures.
#[derive(Debug)]
pub enum AuthError {
    /// No token, or an empty one.
    Missing,
    /// The token does not match the cached secret.
    Mismatch,
    /// The cache was empty and the reload failed.
    Lookup(SecretStoreError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Missing => write!(f, "Token missing"),
            AuthError::Mismatch => write!(f, "Token mismatch"),
            AuthError::Lookup(err) => write!(f, "Token lookup failed: {err}"),
        }
    }
}

impl std::error::Error for AuthError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AuthError::Lookup(err) => Some(err),
            _ => None,
        }
    }
}

/// Which of the four text fields were absent or blank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlankFields {
    pub subject: bool,
    pub sender: bool,
    pub timestream: bool,
    pub content: bool,
}

/// Record validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The `data` object itself is absent.
    MissingData,
    /// One or more text fields are absent or blank.
    BlankFields(BlankFields),
    /// The timestamp is not a base-10 integer.
    InvalidTimestamp(String),
    /// The timestamp parsed but is zero or negative.
    NonPositiveTimestamp(i64),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingData => write!(f, "Email data is missing"),
            ValidationError::BlankFields(blank) => write!(
                f,
                "Missing required email fields - subject: {}, sender: {}, timestream: {}, content: {}",
                !blank.subject, !blank.sender, !blank.timestream, !blank.content
            ),
            ValidationError::InvalidTimestamp(raw) => write!(f, "Invalid timestamp format: {raw}"),
            ValidationError::NonPositiveTimestamp(secs) => write!(f, "Invalid timestamp: {secs}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Hook trait for observing validation outcomes.
///
/// Hooks are invoked synchronously and should avoid heavy or blocking work.
/// Counting failures for metrics is the typical use.
pub trait ValidationHook: Send + Sync {
    fn on_token_rejected(&self, error: &AuthError);
    fn on_email_rejected(&self, error: &ValidationError);
    fn on_email_accepted(&self);
}

/// Default validation hook.
///
/// Logs outcomes using `tracing`.
pub struct DefaultValidationHook;

impl ValidationHook for DefaultValidationHook {
    fn on_token_rejected(&self, error: &AuthError) {
        match error {
            AuthError::Lookup(error) => tracing::error!(%error, "Failed to retrieve API token"),
            error => tracing::warn!(%error, "Token validation failed"),
        }
    }

    fn on_email_rejected(&self, error: &ValidationError) {
        tracing::warn!(%error, "Email data validation failed");
    }

    fn on_email_accepted(&self) {
        tracing::debug!("Email data validated");
    }
}
