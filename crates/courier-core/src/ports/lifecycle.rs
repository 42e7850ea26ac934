//! Lifecycle port - what the protocol tunnel reports.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::domain::ConnectionContext;
use crate::error::CourierError;

#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    SessionOpened {
        session_id: String,
        context: ConnectionContext,
    },
    SessionClosed {
        session_id: String,
        context: ConnectionContext,
    },
    RecordingStarted {
        session_id: String,
        context: ConnectionContext,
        path: PathBuf,
    },
    /// The recording file is closed and ready to ship.
    RecordingCompleted {
        session_id: String,
        context: ConnectionContext,
        path: PathBuf,
    },
}

impl LifecycleEvent {
    pub fn session_id(&self) -> &str {
        match self {
            LifecycleEvent::SessionOpened { session_id, .. }
            | LifecycleEvent::SessionClosed { session_id, .. }
            | LifecycleEvent::RecordingStarted { session_id, .. }
            | LifecycleEvent::RecordingCompleted { session_id, .. } => session_id,
        }
    }
}

/// Consumer of lifecycle events.
///
/// An error concerns that one event only; the caller logs it and carries on
/// with other sessions.
#[async_trait]
pub trait LifecycleHandler: Send + Sync {
    async fn handle(&self, event: LifecycleEvent) -> Result<(), CourierError>;
}
