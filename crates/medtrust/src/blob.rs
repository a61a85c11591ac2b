//! The blob store collaborator: content-addressed ciphertext storage.
//!
//! The Vault only ever writes and reads ciphertext here. Plaintext and
//! key material never cross this boundary.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;

use medtrust_core::ContentHash;

/// Content-addressed get/put over opaque bytes.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under their content address.
    async fn put(&self, hash: &ContentHash, bytes: Bytes) -> anyhow::Result<()>;

    /// Fetch bytes by content address.
    async fn get(&self, hash: &ContentHash) -> anyhow::Result<Option<Bytes>>;
}

/// In-memory blob store for tests and development.
pub struct MemoryBlobStore {
    inner: RwLock<HashMap<ContentHash, Bytes>>,
}

impl MemoryBlobStore {
    /// Create an empty blob store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, hash: &ContentHash, bytes: Bytes) -> anyhow::Result<()> {
        self.inner
            .write()
            .expect("blob lock poisoned")
            .insert(*hash, bytes);
        Ok(())
    }

    async fn get(&self, hash: &ContentHash) -> anyhow::Result<Option<Bytes>> {
        Ok(self
            .inner
            .read()
            .expect("blob lock poisoned")
            .get(hash)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryBlobStore::new();
        let bytes = Bytes::from_static(b"ciphertext");
        let hash = ContentHash::hash(&bytes);

        store.put(&hash, bytes.clone()).await.unwrap();
        assert_eq!(store.get(&hash).await.unwrap(), Some(bytes));
        assert_eq!(store.get(&ContentHash::hash(b"other")).await.unwrap(), None);
    }
}
