use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    ArtifactKind, BatchReceipt, DetailRecord, ExamSummary, FileEntry, GroupKey, TraversalId,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User dropped or picked files and folders.
    FilesDropped(Vec<PathBuf>),
    /// Engine finished walking one drop.
    TraversalFinished {
        traversal_id: TraversalId,
        files: Vec<FileEntry>,
        /// Names of subtrees whose read failed; their siblings were still collected.
        failed_subtrees: Vec<String>,
    },
    /// User removed one file from the preview.
    RemoveFile(usize),
    /// User clicked Clear All.
    ClearFiles,
    /// User clicked Start Scanning.
    SubmitClicked,
    SubmissionFinished(Result<BatchReceipt, String>),
    /// Results view opened or refreshed.
    SummaryRequested,
    SummaryLoaded(Result<Vec<ExamSummary>, String>),
    /// User clicked View/Hide on one exam row.
    GroupToggled(GroupKey),
    GroupLoaded {
        key: GroupKey,
        result: Result<Arc<[DetailRecord]>, String>,
    },
    DownloadRequested {
        key: GroupKey,
        kind: ArtifactKind,
    },
    DownloadFinished {
        key: GroupKey,
        kind: ArtifactKind,
        result: Result<PathBuf, String>,
    },
    /// Fallback for placeholder wiring.
    NoOp,
}
