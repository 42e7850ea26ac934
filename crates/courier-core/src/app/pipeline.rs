//! Pipeline - recording lifecycle to uploads and notifications.
//!
//! Data flow:
//! 1. recording completed
//! 2. compression (optional)
//! 3. destination resolved, upload enqueued
//! 4. upload sink retires the file and enqueues `recording.delivered`
//!
//! `shutdown()` drains uploads before notifications, since a successful
//! upload can still add to the notification queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use super::status::PipelineStatus;
use crate::compress::compress;
use crate::config::Settings;
use crate::domain::artifact::file_name_of;
use crate::domain::{ConnectionContext, EventId, EventKind, TaskId};
use crate::error::CourierError;
use crate::ports::{Clock, LifecycleEvent, LifecycleHandler};
use crate::queue::DeliveryQueue;
use crate::resolve::{drive_path, recording_filename, resolve_storage};
use crate::sinks::{Notifier, UploadJob};

/// Where a session writes its recording and exposes its drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPaths {
    pub recording: PathBuf,
    pub drive: Option<PathBuf>,
}

/// Cheap to clone; clones share both queues.
#[derive(Clone)]
pub struct Pipeline {
    settings: Arc<Settings>,
    clock: Arc<dyn Clock>,
    uploads: Option<DeliveryQueue<UploadJob>>,
    notifier: Option<Notifier>,
}

impl Pipeline {
    pub(crate) fn new(
        settings: Settings,
        clock: Arc<dyn Clock>,
        uploads: Option<DeliveryQueue<UploadJob>>,
        notifier: Option<Notifier>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            clock,
            uploads,
            notifier,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Recording file and drive directory for a new session.
    pub fn session_paths(&self, session_id: &str, context: &ConnectionContext) -> SessionPaths {
        let recording = &self.settings.recording;
        let file_name = recording_filename(
            recording.filename_template.as_deref(),
            context,
            session_id,
            self.clock.now(),
        );
        SessionPaths {
            recording: recording.directory.join(file_name),
            drive: drive_path(recording.drive_path_template.as_deref(), context, session_id),
        }
    }

    /// Queue `path` for upload.
    ///
    /// Errors are returned here and nothing is enqueued:
    /// - file missing: `ArtifactMissing`
    /// - storage disabled or no bucket: `NoDestinationConfigured`
    pub async fn enqueue_upload(
        &self,
        path: &Path,
        context: &ConnectionContext,
        session_id: &str,
    ) -> Result<TaskId, CourierError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(CourierError::ArtifactMissing(path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CourierError::ArtifactMissing(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        }

        let (Some(queue), Some(storage)) = (&self.uploads, &self.settings.storage) else {
            return Err(CourierError::NoDestinationConfigured("upload"));
        };

        let destination = resolve_storage(storage, context, session_id, &file_name_of(path))?;
        debug!(
            session = session_id,
            bucket = %destination.bucket,
            key = %destination.key,
            "upload destination resolved"
        );

        let task = queue
            .enqueue(UploadJob {
                path: path.to_path_buf(),
                destination,
                session_id: session_id.to_string(),
                context: context.clone(),
            })
            .await;
        Ok(task)
    }

    /// Queue a webhook event. `Ok(None)` when notifications are disabled or
    /// the kind is filtered out.
    pub async fn enqueue_notification(
        &self,
        kind: EventKind,
        session_id: &str,
        context: &ConnectionContext,
        extra: Map<String, Value>,
    ) -> Result<Option<EventId>, CourierError> {
        match &self.notifier {
            Some(notifier) => notifier.notify(kind, session_id, context, extra).await,
            None => Ok(None),
        }
    }

    /// Compress (if configured) and enqueue a finished recording.
    async fn ship_recording(
        &self,
        path: PathBuf,
        context: &ConnectionContext,
        session_id: &str,
    ) -> Result<TaskId, CourierError> {
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(CourierError::ArtifactMissing(path));
        }
        let path = compress(path, self.settings.recording.compression).await;
        self.enqueue_upload(&path, context, session_id).await
    }

    /// Drain uploads, then notifications.
    pub async fn shutdown(&self) -> PipelineStatus {
        info!("pipeline shutting down, draining queues");
        if let Some(queue) = &self.uploads {
            queue.drain().await;
        }
        if let Some(notifier) = &self.notifier {
            notifier.queue().drain().await;
        }
        let status = self.status().await;
        info!(
            uploaded = status.uploads.delivered,
            uploads_abandoned = status.uploads.abandoned,
            notified = status.notifications.delivered,
            notifications_abandoned = status.notifications.abandoned,
            "pipeline drained"
        );
        status
    }

    pub async fn status(&self) -> PipelineStatus {
        let uploads = match &self.uploads {
            Some(queue) => queue.status().await,
            None => Default::default(),
        };
        let notifications = match &self.notifier {
            Some(notifier) => notifier.queue().status().await,
            None => Default::default(),
        };
        PipelineStatus {
            uploads,
            notifications,
        }
    }
}

fn file_extra(path: &Path) -> Map<String, Value> {
    let mut extra = Map::new();
    extra.insert("filename".to_string(), json!(file_name_of(path)));
    extra
}

#[async_trait]
impl LifecycleHandler for Pipeline {
    async fn handle(&self, event: LifecycleEvent) -> Result<(), CourierError> {
        debug!(session = event.session_id(), "lifecycle event");
        match event {
            LifecycleEvent::SessionOpened {
                session_id,
                context,
            } => {
                self.enqueue_notification(EventKind::SessionStarted, &session_id, &context, Map::new())
                    .await?;
            }
            LifecycleEvent::SessionClosed {
                session_id,
                context,
            } => {
                self.enqueue_notification(EventKind::SessionEnded, &session_id, &context, Map::new())
                    .await?;
            }
            LifecycleEvent::RecordingStarted {
                session_id,
                context,
                path,
            } => {
                self.enqueue_notification(
                    EventKind::RecordingStarted,
                    &session_id,
                    &context,
                    file_extra(&path),
                )
                .await?;
            }
            LifecycleEvent::RecordingCompleted {
                session_id,
                context,
                path,
            } => {
                // the upload must not depend on the webhook being configured right
                if let Err(e) = self
                    .enqueue_notification(
                        EventKind::RecordingCompleted,
                        &session_id,
                        &context,
                        file_extra(&path),
                    )
                    .await
                {
                    warn!(session = %session_id, error = %e, "recording.completed not enqueued");
                }

                if let Err(e) = self.ship_recording(path, &context, &session_id).await {
                    warn!(session = %session_id, error = %e, kind = ?e.kind(), "recording not enqueued for upload");
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}
