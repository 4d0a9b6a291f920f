//! Shared API token cache backed by an external secret store.
//!
//! ## Components
//!
//! - [`SecretStore`]: Trait implemented by secret backends
//! - [`SecretCache`]: Holds the current [`Token`], reloading it on demand
//! - [`SecretStoreError`]: Backend failure with tracing context
//!
//! The cache holds exactly one entry. It is filled by [`SecretCache::load`]
//! at startup and replaced wholesale on every reload; it is never partially
//! updated and never expires on its own. A rotated upstream credential is
//! only picked up by an explicit [`SecretCache::refresh`].

pub mod inmemory;

#[cfg(feature = "aws")]
pub mod ssm;

use std::fmt;

use tokio::sync::RwLock;
use tracing_error::SpanTrace;

/// The shared authentication token.
///
/// `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Wrap a fetched secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Exact, case-sensitive comparison.
    pub fn matches(&self, provided: &str) -> bool {
        self.0 == provided
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// Trait implemented by secret store backends.
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch the current token, decrypted.
    async fn fetch(&self) -> Result<Token, SecretStoreError>;
}

/// Concurrency-safe single-entry token cache.
///
/// Reads take a shared lock. Concurrent reloads are safe but redundant: the
/// last writer wins.
pub struct SecretCache<S> {
    store: S,
    entry: RwLock<Option<Token>>,
}

impl<S: SecretStore> SecretCache<S> {
    /// Create an empty cache. Call [`load`](Self::load) before serving.
    pub fn new(store: S) -> Self {
        Self {
            store,
            entry: RwLock::new(None),
        }
    }

    /// The cached token, if any. Never touches the store.
    pub async fn get(&self) -> Option<Token> {
        self.entry.read().await.clone()
    }

    /// Fetch from the store and replace the cached entry.
    ///
    /// On failure the previous entry is left untouched.
    #[tracing::instrument(skip_all)]
    pub async fn reload(&self) -> Result<Token, SecretStoreError> {
        let token = self.store.fetch().await?;
        *self.entry.write().await = Some(token.clone());
        tracing::info!("Loaded API token from secret store");
        Ok(token)
    }

    /// Initial load at startup. A failure here should abort the process.
    pub async fn load(&self) -> Result<(), SecretStoreError> {
        self.reload().await.map(|_| ())
    }

    /// Operator-triggered reload, used to pick up a rotated credential.
    pub async fn refresh(&self) -> Result<(), SecretStoreError> {
        tracing::info!("Refreshing API token from secret store");
        self.reload().await.map(|_| ())
    }

    /// The cached token, reloading from the store on a miss.
    pub async fn get_or_reload(&self) -> Result<Token, SecretStoreError> {
        if let Some(token) = self.get().await {
            return Ok(token);
        }
        tracing::warn!("API token not cached, reloading from secret store");
        self.reload().await
    }
}

/// Error returned by secret store operations.
#[derive(Debug)]
pub struct SecretStoreError {
    context: SpanTrace,
    kind: SecretStoreErrorKind,
}

/// Secret store error kinds.
#[derive(Debug)]
pub enum SecretStoreErrorKind {
    /// The backend call failed.
    Backend(tower::BoxError),
    /// The backend answered but holds no value under the given name.
    NotFound(String),
}

impl SecretStoreError {
    /// The store could not be reached or answered with an error.
    pub fn backend(err: impl Into<tower::BoxError>) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: SecretStoreErrorKind::Backend(err.into()),
        }
    }

    /// The named secret does not exist.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self {
            context: SpanTrace::capture(),
            kind: SecretStoreErrorKind::NotFound(name.into()),
        }
    }

    pub fn kind(&self) -> &SecretStoreErrorKind {
        &self.kind
    }
}

impl fmt::Display for SecretStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SecretStoreErrorKind::Backend(err) => writeln!(f, "Secret store error: {err}"),
            SecretStoreErrorKind::NotFound(name) => writeln!(f, "Secret not found: {name}"),
        }?;
        self.context.fmt(f)
    }
}

impl std::error::Error for SecretStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            SecretStoreErrorKind::Backend(err) => Some(err.as_ref()),
            SecretStoreErrorKind::NotFound(_) => None,
        }
    }
}
