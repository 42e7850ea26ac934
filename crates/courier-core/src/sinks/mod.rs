//! Sink clients and their queue adapters.
//!
//! Each client call is exactly one delivery attempt; retries come from the
//! queue the adapter is plugged into.

pub mod storage;
pub mod webhook;

pub use self::storage::{StorageClient, UploadJob, UploadSink, content_type_for};
pub use self::webhook::{NotificationJob, Notifier, WebhookClient, WebhookSink};
