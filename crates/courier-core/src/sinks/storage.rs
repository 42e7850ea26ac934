//! Object-storage sink.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path as ObjectPath;
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, PutMultipartOpts, PutOptions, PutPayload,
    WriteMultipart,
};
use serde_json::{Map, Value, json};
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};

use super::webhook::Notifier;
use crate::domain::{ArtifactState, ConnectionContext, EventKind, StorageDestination};
use crate::error::CourierError;
use crate::ports::StoreProvider;
use crate::queue::Deliver;

/// Parts in flight during a multipart upload.
const MAX_CONCURRENT_PARTS: usize = 2;

/// Content type by extension of the uploaded file.
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => "application/gzip",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Streams local files into object storage. One call is one attempt.
pub struct StorageClient {
    stores: Arc<dyn StoreProvider>,
    multipart_threshold: usize,
    part_size: usize,
}

impl StorageClient {
    pub fn new(stores: Arc<dyn StoreProvider>, multipart_threshold: usize, part_size: usize) -> Self {
        Self {
            stores,
            multipart_threshold,
            part_size,
        }
    }

    /// Upload `path` to the destination; returns the byte count.
    pub async fn upload(
        &self,
        path: &Path,
        destination: &StorageDestination,
    ) -> Result<u64, CourierError> {
        let size = match tokio::fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CourierError::ArtifactMissing(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let store = self.stores.store_for(&destination.bucket).await?;
        let location = ObjectPath::from(destination.key.as_str());
        let attributes = Attributes::from_iter([(
            Attribute::ContentType,
            AttributeValue::from(content_type_for(path)),
        )]);

        if size < self.multipart_threshold as u64 {
            let data = tokio::fs::read(path).await?;
            let opts = PutOptions {
                attributes,
                ..Default::default()
            };
            store
                .put_opts(&location, PutPayload::from(Bytes::from(data)), opts)
                .await?;
        } else {
            self.put_multipart(&*store, &location, path, attributes)
                .await?;
        }

        debug!(
            bucket = %destination.bucket,
            key = %destination.key,
            bytes = size,
            "object written"
        );
        Ok(size)
    }

    /// Read the file in `part_size` chunks and feed them to a multipart upload.
    async fn put_multipart(
        &self,
        store: &dyn ObjectStore,
        location: &ObjectPath,
        path: &Path,
        attributes: Attributes,
    ) -> Result<(), CourierError> {
        let mut file = tokio::fs::File::open(path).await?;
        let opts = PutMultipartOpts {
            attributes,
            ..Default::default()
        };
        let upload = store.put_multipart_opts(location, opts).await?;
        let mut writer = WriteMultipart::new_with_chunk_size(upload, self.part_size);

        let mut buf = vec![0u8; self.part_size];
        loop {
            let n = match read_chunk(&mut file, &mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    let _ = writer.abort().await;
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }
            if let Err(e) = writer.wait_for_capacity(MAX_CONCURRENT_PARTS).await {
                let _ = writer.abort().await;
                return Err(e.into());
            }
            writer.write(&buf[..n]);
        }

        writer.finish().await?;
        Ok(())
    }
}

/// Fill `buf` as far as the file allows. Returns 0 at end of file.
async fn read_chunk(file: &mut tokio::fs::File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Payload of the upload queue. The destination is fixed at enqueue time.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub path: PathBuf,
    pub destination: StorageDestination,
    pub session_id: String,
    pub context: ConnectionContext,
}

/// `Deliver` impl for the upload queue.
///
/// After a successful upload it retires the local file (if configured) and
/// announces `recording.delivered`.
pub struct UploadSink {
    client: StorageClient,
    delete_after_upload: bool,
    notifier: Option<Notifier>,
}

impl UploadSink {
    pub fn new(client: StorageClient, delete_after_upload: bool, notifier: Option<Notifier>) -> Self {
        Self {
            client,
            delete_after_upload,
            notifier,
        }
    }

    async fn retire(&self, path: &Path) -> ArtifactState {
        if !self.delete_after_upload {
            return ArtifactState::Retained;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => ArtifactState::Retired,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove uploaded recording");
                ArtifactState::Retained
            }
        }
    }
}

#[async_trait]
impl Deliver<UploadJob> for UploadSink {
    async fn deliver(&self, job: &UploadJob) -> Result<(), CourierError> {
        let size = self.client.upload(&job.path, &job.destination).await?;
        let state = self.retire(&job.path).await;

        info!(
            session = %job.session_id,
            bucket = %job.destination.bucket,
            key = %job.destination.key,
            bytes = size,
            state = ?state,
            "recording delivered"
        );

        if let Some(notifier) = &self.notifier {
            let extra: Map<String, Value> = [
                ("bucket".to_string(), json!(job.destination.bucket)),
                ("key".to_string(), json!(job.destination.key)),
                ("size".to_string(), json!(size)),
            ]
            .into_iter()
            .collect();
            // the upload itself succeeded; a notification problem must not retry it
            if let Err(e) = notifier
                .notify(EventKind::RecordingDelivered, &job.session_id, &job.context, extra)
                .await
            {
                warn!(session = %job.session_id, error = %e, "recording.delivered not enqueued");
            }
        }
        Ok(())
    }

    async fn abandoned(&self, job: &UploadJob, reason: &str) {
        error!(
            session = %job.session_id,
            path = %job.path.display(),
            bucket = %job.destination.bucket,
            key = %job.destination.key,
            state = ?ArtifactState::Abandoned,
            error = reason,
            "upload abandoned, recording left on disk"
        );
    }
}
