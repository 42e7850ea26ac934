//! StoreProvider port - object storage per bucket.

use std::sync::Arc;

use async_trait::async_trait;
use object_store::ObjectStore;

use crate::error::CourierError;

/// Hands out an `ObjectStore` rooted at a bucket.
///
/// Buckets are resolved per upload (connection overrides), so the provider
/// is asked on every attempt; implementations cache what they build.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    async fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, CourierError>;
}
