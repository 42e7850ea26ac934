//! Resolved settings consumed by the pipeline.
//!
//! Loading is plain TOML; environment overlay is left to the host process.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::EventKind;
use crate::error::CourierError;
use crate::queue::{RetryMode, RetryPolicy};

/// Smallest part size S3 accepts for all but the last part.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub recording: RecordingSettings,

    /// Uploads are disabled when absent.
    #[serde(default)]
    pub storage: Option<StorageSettings>,

    /// Notifications are disabled when absent.
    #[serde(default)]
    pub webhook: Option<WebhookSettings>,
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self, CourierError> {
        toml::from_str(s).map_err(|e| CourierError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, CourierError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionFormat {
    #[default]
    None,
    Gzip,
    Zip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordingSettings {
    #[serde(default = "default_recording_dir")]
    pub directory: PathBuf,

    #[serde(default)]
    pub filename_template: Option<String>,

    #[serde(default)]
    pub drive_path_template: Option<String>,

    #[serde(default)]
    pub compression: CompressionFormat,

    /// Remove the local file once the upload succeeded.
    #[serde(default)]
    pub delete_after_upload: bool,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            directory: default_recording_dir(),
            filename_template: None,
            drive_path_template: None,
            compression: CompressionFormat::None,
            delete_after_upload: false,
        }
    }
}

fn default_recording_dir() -> PathBuf {
    PathBuf::from("recordings")
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSettings {
    #[serde(default)]
    pub bucket: Option<String>,

    #[serde(default = "default_key_template")]
    pub key_template: String,

    #[serde(default)]
    pub region: Option<String>,

    /// S3-compatible endpoint (MinIO, Ceph, ...). Enables plain HTTP.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<String>,

    #[serde(default = "default_part_size")]
    pub multipart_threshold_bytes: usize,

    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,

    #[serde(default = "QueueSettings::uploads", deserialize_with = "upload_retry")]
    pub retry: QueueSettings,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            bucket: None,
            key_template: default_key_template(),
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            multipart_threshold_bytes: default_part_size(),
            part_size_bytes: default_part_size(),
            retry: QueueSettings::uploads(),
        }
    }
}

impl std::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSettings")
            .field("bucket", &self.bucket)
            .field("key_template", &self.key_template)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| ".."))
            .field("multipart_threshold_bytes", &self.multipart_threshold_bytes)
            .field("part_size_bytes", &self.part_size_bytes)
            .field("retry", &self.retry)
            .finish()
    }
}

fn default_key_template() -> String {
    "{{filename}}".to_string()
}

fn default_part_size() -> usize {
    MIN_PART_SIZE
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookSettings {
    #[serde(default)]
    pub url: Option<String>,

    /// `none`, `bearer` or `basic`; anything else sends no credentials.
    #[serde(default)]
    pub auth_type: Option<String>,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Event kinds to post. Empty means all.
    #[serde(default)]
    pub events: Vec<EventKind>,

    #[serde(
        default = "QueueSettings::notifications",
        deserialize_with = "notification_retry"
    )]
    pub retry: QueueSettings,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            url: None,
            auth_type: None,
            token: None,
            username: None,
            password: None,
            timeout_secs: default_timeout_secs(),
            max_redirects: default_max_redirects(),
            events: Vec::new(),
            retry: QueueSettings::notifications(),
        }
    }
}

impl WebhookSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn wants(&self, kind: EventKind) -> bool {
        self.events.is_empty() || self.events.contains(&kind)
    }
}

impl std::fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("url", &self.url)
            .field("auth_type", &self.auth_type)
            .field("token", &self.token.as_ref().map(|_| ".."))
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| ".."))
            .field("timeout_secs", &self.timeout_secs)
            .field("max_redirects", &self.max_redirects)
            .field("events", &self.events)
            .field("retry", &self.retry)
            .finish()
    }
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_redirects() -> usize {
    3
}

/// Retry knobs of one queue instance, in config units.
///
/// Read from a `retry` table field by field: whatever the table leaves out
/// keeps the default of the sink it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct QueueSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub mode: RetryMode,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct QueueOverrides {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    mode: Option<RetryMode>,
}

impl QueueOverrides {
    fn over(self, base: QueueSettings) -> QueueSettings {
        QueueSettings {
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            base_delay_ms: self.base_delay_ms.unwrap_or(base.base_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(base.max_delay_ms),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(base.poll_interval_ms),
            mode: self.mode.unwrap_or(base.mode),
        }
    }
}

fn upload_retry<'de, D: Deserializer<'de>>(d: D) -> Result<QueueSettings, D::Error> {
    Ok(QueueOverrides::deserialize(d)?.over(QueueSettings::uploads()))
}

fn notification_retry<'de, D: Deserializer<'de>>(d: D) -> Result<QueueSettings, D::Error> {
    Ok(QueueOverrides::deserialize(d)?.over(QueueSettings::notifications()))
}

impl QueueSettings {
    pub fn uploads() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2_000,
            max_delay_ms: default_max_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            mode: RetryMode::Serial,
        }
    }

    pub fn notifications() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: default_max_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            mode: RetryMode::Requeue,
        }
    }

    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: 2.0,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            mode: self.mode,
        }
    }
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}
