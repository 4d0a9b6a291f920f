use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::archive::{ObjectStore, PutObject};

/// An in-memory object store for testing or local usage.
///
/// Objects are kept in a `BTreeMap` keyed by object key; a put replaces any
/// previous object under the same key. Clones share the same contents.
#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    objects: Arc<Mutex<BTreeMap<String, PutObject>>>,
    puts: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl InMemoryObjectStore {
    /// The object stored under `key`, if any.
    pub async fn get(&self, key: &str) -> Option<PutObject> {
        self.objects.lock().await.get(key).cloned()
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }

    /// Number of distinct stored objects.
    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    /// Whether nothing has been stored yet.
    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }

    /// Number of successful puts, overwrites included.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    /// Make every following put fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    type Error = std::io::Error;

    async fn put(&self, object: PutObject) -> Result<(), Self::Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("in-memory object store rejected put"));
        }
        self.objects.lock().await.insert(object.key.clone(), object);
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
