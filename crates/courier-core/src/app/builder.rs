//! PipelineBuilder - validation and wiring.
//!
//! # Fail-fast
//! - every queue must allow at least one retry
//! - every queue must wait a non-zero interval between eligibility checks
//! - a webhook section needs a URL
//! - multipart parts must be at least 5 MiB
//!
//! Settings that pass `build()` cannot make the pipeline fail later for a
//! configuration reason, except a missing bucket, which a connection may
//! still supply.

use std::sync::Arc;

use tracing::info;

use super::pipeline::Pipeline;
use crate::config::{MIN_PART_SIZE, QueueSettings, Settings, StorageSettings, WebhookSettings};
use crate::error::CourierError;
use crate::impls::S3StoreProvider;
use crate::ports::{Clock, StoreProvider, SystemClock};
use crate::queue::DeliveryQueue;
use crate::sinks::{
    NotificationJob, Notifier, StorageClient, UploadJob, UploadSink, WebhookClient, WebhookSink,
};

/// # Example
/// ```ignore
/// let pipeline = PipelineBuilder::new(Settings::load(path)?)
///     .store_provider(Arc::new(InMemoryStoreProvider::new()))
///     .build()?;
/// ```
pub struct PipelineBuilder {
    settings: Settings,
    store_provider: Option<Arc<dyn StoreProvider>>,
    clock: Option<Arc<dyn Clock>>,
}

impl PipelineBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            store_provider: None,
            clock: None,
        }
    }

    /// Replace the S3 provider built from the storage settings.
    pub fn store_provider(mut self, provider: Arc<dyn StoreProvider>) -> Self {
        self.store_provider = Some(provider);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Pipeline, CourierError> {
        validate(&self.settings)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let notifier = match &self.settings.webhook {
            Some(webhook) => {
                let client = WebhookClient::new(webhook)?;
                let queue = DeliveryQueue::<NotificationJob>::new(
                    "notifications",
                    webhook.retry.to_policy(),
                    Arc::new(WebhookSink::new(client)),
                );
                Some(Notifier::new(queue, webhook.clone(), Arc::clone(&clock)))
            }
            None => None,
        };

        let uploads = match &self.settings.storage {
            Some(storage) => {
                let provider = self
                    .store_provider
                    .unwrap_or_else(|| Arc::new(S3StoreProvider::new(storage.clone())));
                let client = StorageClient::new(
                    provider,
                    storage.multipart_threshold_bytes,
                    storage.part_size_bytes,
                );
                let sink = UploadSink::new(
                    client,
                    self.settings.recording.delete_after_upload,
                    notifier.clone(),
                );
                Some(DeliveryQueue::<UploadJob>::new(
                    "uploads",
                    storage.retry.to_policy(),
                    Arc::new(sink),
                ))
            }
            None => None,
        };

        info!(
            uploads = uploads.is_some(),
            notifications = notifier.is_some(),
            compression = ?self.settings.recording.compression,
            "pipeline built"
        );

        Ok(Pipeline::new(self.settings, clock, uploads, notifier))
    }
}

fn validate(settings: &Settings) -> Result<(), CourierError> {
    if let Some(storage) = &settings.storage {
        validate_storage(storage)?;
    }
    if let Some(webhook) = &settings.webhook {
        validate_webhook(webhook)?;
    }
    Ok(())
}

fn validate_storage(storage: &StorageSettings) -> Result<(), CourierError> {
    validate_queue("storage.retry", &storage.retry)?;
    if storage.part_size_bytes < MIN_PART_SIZE {
        return Err(CourierError::Config(format!(
            "storage.part_size_bytes must be at least {MIN_PART_SIZE}, got {}",
            storage.part_size_bytes
        )));
    }
    if storage.key_template.trim().is_empty() {
        return Err(CourierError::Config("storage.key_template is empty".into()));
    }
    Ok(())
}

fn validate_webhook(webhook: &WebhookSettings) -> Result<(), CourierError> {
    validate_queue("webhook.retry", &webhook.retry)?;
    match webhook.url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(()),
        _ => Err(CourierError::Config(
            "webhook.url is required when [webhook] is present".into(),
        )),
    }
}

fn validate_queue(section: &str, queue: &QueueSettings) -> Result<(), CourierError> {
    if queue.max_attempts == 0 {
        return Err(CourierError::Config(format!(
            "{section}.max_attempts must be greater than 0"
        )));
    }
    if queue.poll_interval_ms == 0 {
        return Err(CourierError::Config(format!(
            "{section}.poll_interval_ms must be greater than 0"
        )));
    }
    if queue.max_delay_ms < queue.base_delay_ms {
        return Err(CourierError::Config(format!(
            "{section}.max_delay_ms must not be below base_delay_ms"
        )));
    }
    Ok(())
}
