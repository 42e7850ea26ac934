//! S3 (and S3-compatible) store provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::{ObjectStore, RetryConfig};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::StorageSettings;
use crate::error::CourierError;
use crate::ports::StoreProvider;

/// Builds one S3 client per bucket on first use and keeps it.
pub struct S3StoreProvider {
    settings: StorageSettings,
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl S3StoreProvider {
    pub fn new(settings: StorageSettings) -> Self {
        Self {
            settings,
            stores: Mutex::new(HashMap::new()),
        }
    }

    fn build(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, CourierError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            // one request per attempt; backoff belongs to the upload queue
            .with_retry(RetryConfig {
                max_retries: 0,
                ..RetryConfig::default()
            });

        if let Some(region) = &self.settings.region {
            builder = builder.with_region(region);
        }

        if let Some(endpoint) = &self.settings.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(true);
        }

        if let (Some(key_id), Some(secret)) = (
            &self.settings.access_key_id,
            &self.settings.secret_access_key,
        ) {
            builder = builder
                .with_access_key_id(key_id)
                .with_secret_access_key(secret);
        }

        Ok(Arc::new(builder.build()?))
    }
}

#[async_trait]
impl StoreProvider for S3StoreProvider {
    async fn store_for(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>, CourierError> {
        let mut stores = self.stores.lock().await;
        if let Some(store) = stores.get(bucket) {
            return Ok(Arc::clone(store));
        }

        let store = self.build(bucket)?;
        debug!(bucket, endpoint = ?self.settings.endpoint, "s3 client built");
        stores.insert(bucket.to_string(), Arc::clone(&store));
        Ok(store)
    }
}
