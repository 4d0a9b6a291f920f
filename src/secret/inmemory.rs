use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;

use crate::secret::{SecretStore, SecretStoreError, Token};

/// In-memory secret store for testing or local usage.
///
/// Clones share the same value, so a test can rotate the secret or inject
/// failures after handing a clone to a [`SecretCache`](crate::secret::SecretCache).
#[derive(Clone, Default)]
pub struct InMemorySecretStore {
    value: Arc<Mutex<Option<String>>>,
    failing: Arc<AtomicBool>,
    fetches: Arc<AtomicUsize>,
}

impl InMemorySecretStore {
    /// A store already holding `value`.
    pub fn new(value: impl Into<String>) -> Self {
        let store = Self::default();
        store.set(value);
        store
    }

    /// A store holding no value; every fetch is `NotFound`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Replace the stored value, as an upstream rotation would.
    pub fn set(&self, value: impl Into<String>) {
        *self.lock() = Some(value.into());
    }

    /// Make every following fetch fail with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of fetch calls seen so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.value.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn fetch(&self) -> Result<Token, SecretStoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(SecretStoreError::backend(std::io::Error::other(
                "in-memory secret store unavailable",
            )));
        }

        self.lock()
            .clone()
            .map(Token::from)
            .ok_or_else(|| SecretStoreError::not_found("in-memory"))
    }
}
