use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::view_model::{
    AppViewModel, FileRowView, GradeRowView, ResultRowView, ScoreBand,
};
use crate::{
    ArtifactKind, BatchReceipt, BatchStore, ExamSummary, ExpansionController, ExpansionState,
    GroupKey, TraversalId,
};

/// Why a submit click did not start an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyBatch,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SubmissionState {
    #[default]
    Idle,
    InFlight,
    Succeeded(BatchReceipt),
    Failed(String),
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SummaryState {
    #[default]
    NotRequested,
    Loading,
    Loaded(Vec<ExamSummary>),
    Failed(String),
}

/// Outcome of the most recent finished traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectReport {
    pub traversal_id: TraversalId,
    pub added: usize,
    pub failed_subtrees: Vec<String>,
}

impl CollectReport {
    pub fn is_partial(&self) -> bool {
        !self.failed_subtrees.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadStatus {
    pub key: GroupKey,
    pub kind: ArtifactKind,
    pub result: Result<PathBuf, String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    batch: BatchStore,
    next_traversal_id: TraversalId,
    pending_traversals: BTreeSet<TraversalId>,
    last_collect: Option<CollectReport>,
    submission: SubmissionState,
    summary: SummaryState,
    expansion: ExpansionController,
    last_download: Option<DownloadStatus>,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batch(&self) -> &BatchStore {
        &self.batch
    }

    pub fn submission(&self) -> &SubmissionState {
        &self.submission
    }

    pub fn summary(&self) -> &SummaryState {
        &self.summary
    }

    pub fn expansion(&self) -> &ExpansionController {
        &self.expansion
    }

    pub fn pending_traversals(&self) -> usize {
        self.pending_traversals.len()
    }

    pub fn view(&self) -> AppViewModel {
        let files = self
            .batch
            .files()
            .iter()
            .enumerate()
            .map(|(index, file)| FileRowView {
                index,
                name: file.name().to_string(),
                mime: file.mime().to_string(),
                is_image: file.is_image(),
            })
            .collect();

        let (results, summary_loading, summary_error) = match &self.summary {
            SummaryState::NotRequested => (Vec::new(), false, None),
            SummaryState::Loading => (Vec::new(), true, None),
            SummaryState::Failed(err) => (Vec::new(), false, Some(err.clone())),
            SummaryState::Loaded(rows) => (
                rows.iter().map(|row| self.result_row(row)).collect(),
                false,
                None,
            ),
        };

        AppViewModel {
            files,
            file_count: self.batch.count(),
            collecting: self.pending_traversals.len(),
            last_collect: self.last_collect.clone(),
            can_submit: !self.batch.is_empty() && self.submission != SubmissionState::InFlight,
            submission: self.submission.clone(),
            results,
            summary_loading,
            summary_error,
            last_download: self.last_download.clone(),
            dirty: self.dirty,
        }
    }

    fn result_row(&self, row: &ExamSummary) -> ResultRowView {
        let expansion = self
            .expansion
            .state(&row.exam_code)
            .cloned()
            .unwrap_or_default();
        let grades = if expansion == ExpansionState::Expanded {
            self.expansion
                .records(&row.exam_code)
                .map(|records| records.iter().map(GradeRowView::from).collect())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        ResultRowView {
            key: row.exam_code.clone(),
            date: row.date.clone(),
            avg_score: row.avg_score,
            band: ScoreBand::from_score(row.avg_score),
            expansion,
            grades,
        }
    }

    /// Returns whether state changed since the last call, and resets the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn begin_traversal(&mut self) -> TraversalId {
        self.next_traversal_id += 1;
        let id = self.next_traversal_id;
        self.pending_traversals.insert(id);
        self.mark_dirty();
        id
    }

    /// Returns `false` for an id that is unknown or already finished.
    pub(crate) fn finish_traversal(
        &mut self,
        traversal_id: TraversalId,
        files: Vec<crate::FileEntry>,
        failed_subtrees: Vec<String>,
    ) -> bool {
        if !self.pending_traversals.remove(&traversal_id) {
            return false;
        }
        let added = files.len();
        self.batch.add(files);
        self.last_collect = Some(CollectReport {
            traversal_id,
            added,
            failed_subtrees,
        });
        self.mark_dirty();
        true
    }

    pub(crate) fn batch_mut(&mut self) -> &mut BatchStore {
        &mut self.batch
    }

    pub(crate) fn set_submission(&mut self, submission: SubmissionState) {
        self.submission = submission;
        self.mark_dirty();
    }

    pub(crate) fn set_summary(&mut self, summary: SummaryState) {
        if let SummaryState::Loaded(rows) = &summary {
            self.expansion
                .register(rows.iter().map(|row| row.exam_code.clone()));
        }
        self.summary = summary;
        self.mark_dirty();
    }

    pub(crate) fn expansion_mut(&mut self) -> &mut ExpansionController {
        &mut self.expansion
    }

    pub(crate) fn set_last_download(&mut self, status: DownloadStatus) {
        self.last_download = Some(status);
        self.mark_dirty();
    }
}
