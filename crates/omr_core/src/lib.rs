//! OMR client core: pure state machine, batch store and view-model helpers.
mod batch;
mod effect;
mod expansion;
mod model;
mod msg;
mod state;
mod update;
mod view_model;

pub use batch::BatchStore;
pub use effect::Effect;
pub use expansion::{ExpansionController, ExpansionState, ToggleOutcome};
pub use model::{
    ArtifactKind, BatchReceipt, DetailRecord, ExamSummary, FileContent, FileEntry, GroupKey,
    TraversalId,
};
pub use msg::Msg;
pub use state::{
    AppState, CollectReport, DownloadStatus, RejectReason, SubmissionState, SummaryState,
};
pub use update::update;
pub use view_model::{
    format_answers, AppViewModel, FileRowView, GradeRowView, ResultRowView, ScoreBand,
};
