//! Artifact lifecycle.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Where a recording is in its lifecycle.
///
/// Transitions:
/// - Open -> Closed -> Compressed -> Delivered -> Retired | Retained
/// - Closed -> Delivered (compression disabled or failed)
/// - Closed | Compressed -> Abandoned (upload gave up; file stays on disk)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Open,
    Closed,
    Compressed,
    Delivered,
    Retired,
    Retained,
    Abandoned,
}

impl ArtifactState {
    /// Is the local file still owned by the pipeline?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ArtifactState::Retired | ArtifactState::Retained | ArtifactState::Abandoned
        )
    }
}

/// A recording file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub state: ArtifactState,
}

impl Artifact {
    pub fn closed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: ArtifactState::Closed,
        }
    }

    /// Base name used for the `{{filename}}` placeholder.
    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
