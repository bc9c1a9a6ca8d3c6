use crate::{
    ArtifactKind, CollectReport, DetailRecord, DownloadStatus, ExpansionState, GroupKey,
    SubmissionState,
};

/// Colour band used for scores in both the overview and the grade rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBand {
    Good,
    Fair,
    Poor,
}

impl ScoreBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            ScoreBand::Good
        } else if score >= 50.0 {
            ScoreBand::Fair
        } else {
            ScoreBand::Poor
        }
    }
}

/// Renders option indices as letters: `0..=3` map to `A..=D`, `-1` is
/// unanswered (`-`), anything else is `N/A`.
pub fn format_answers(answers: &[i32]) -> String {
    answers
        .iter()
        .map(|answer| match answer {
            0 => "A",
            1 => "B",
            2 => "C",
            3 => "D",
            -1 => "-",
            _ => "N/A",
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub files: Vec<FileRowView>,
    pub file_count: usize,
    /// Traversals started but not yet finished.
    pub collecting: usize,
    pub last_collect: Option<CollectReport>,
    pub can_submit: bool,
    pub submission: SubmissionState,
    pub results: Vec<ResultRowView>,
    pub summary_loading: bool,
    pub summary_error: Option<String>,
    pub last_download: Option<DownloadStatus>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRowView {
    pub index: usize,
    pub name: String,
    pub mime: String,
    pub is_image: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRowView {
    pub key: GroupKey,
    pub date: Option<String>,
    pub avg_score: f64,
    pub band: ScoreBand,
    pub expansion: ExpansionState,
    /// Empty unless the row is expanded.
    pub grades: Vec<GradeRowView>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradeRowView {
    pub roll_number: String,
    pub score: f64,
    pub band: ScoreBand,
    pub date: Option<String>,
    pub invalid_count: u32,
    pub answers: String,
    pub graded_image: Option<String>,
}

impl From<&DetailRecord> for GradeRowView {
    fn from(record: &DetailRecord) -> Self {
        Self {
            roll_number: record.roll_number.clone(),
            score: record.score,
            band: ScoreBand::from_score(record.score),
            date: record.date.clone(),
            invalid_count: record.invalid_count,
            answers: format_answers(&record.student_answers),
            graded_image: record.graded_image.clone(),
        }
    }
}

impl GradeRowView {
    /// The per-sheet download offered next to this row, if the sheet was graded.
    pub fn image_artifact(&self) -> Option<ArtifactKind> {
        self.graded_image
            .as_ref()
            .filter(|name| !name.is_empty())
            .map(|name| ArtifactKind::GradedImage(name.clone()))
    }
}
