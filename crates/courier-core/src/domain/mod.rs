//! Domain model (ids, connection context, events, destinations, artifacts).

pub mod artifact;
pub mod context;
pub mod destination;
pub mod event;
pub mod ids;

pub use artifact::{Artifact, ArtifactState};
pub use context::ConnectionContext;
pub use destination::{StorageDestination, WebhookAuth, WebhookDestination};
pub use event::{EventKind, NotificationEvent};
pub use ids::{EventId, TaskId};
