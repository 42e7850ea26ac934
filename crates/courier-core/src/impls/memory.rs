//! In-memory store provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use object_store::ObjectStore;
use object_store::memory::InMemory;
use tokio::sync::Mutex;

use crate::error::CourierError;
use crate::ports::StoreProvider;

/// One `InMemory` store per bucket. For tests and dry runs.
#[derive(Default)]
pub struct InMemoryStoreProvider {
    stores: Mutex<HashMap<String, Arc<InMemory>>>,
}

impl InMemoryStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bucket's store, created empty if it was never written.
    pub async fn bucket(&self, bucket: &str) -> Arc<InMemory> {
        let mut stores = self.stores.lock().await;
        Arc::clone(stores.entry(bucket.to_string()).or_default())
    }
}

#[async_trait]
impl StoreProvider for InMemoryStoreProvider {
    async fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, CourierError> {
        let store: Arc<dyn ObjectStore> = self.bucket(bucket).await;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use object_store::path::Path;

    use super::*;

    #[tokio::test]
    async fn buckets_are_isolated() {
        let provider = InMemoryStoreProvider::new();
        let a = provider.store_for("a").await.unwrap();
        a.put(&Path::from("k"), Bytes::from_static(b"x").into())
            .await
            .unwrap();

        assert!(provider.bucket("a").await.head(&Path::from("k")).await.is_ok());
        assert!(provider.bucket("b").await.head(&Path::from("k")).await.is_err());
    }
}
