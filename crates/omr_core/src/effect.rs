use std::path::PathBuf;

use crate::{ArtifactKind, BatchStore, GroupKey, TraversalId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CollectFiles {
        traversal_id: TraversalId,
        paths: Vec<PathBuf>,
    },
    /// Snapshot of the batch at the moment the user asked to submit.
    SubmitBatch { batch: BatchStore },
    LoadSummary,
    LoadGroup { key: GroupKey },
    GroupVisibility { key: GroupKey, visible: bool },
    DownloadArtifact { key: GroupKey, kind: ArtifactKind },
}
