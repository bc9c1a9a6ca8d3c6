use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use omr_core::{ArtifactKind, BatchReceipt, DetailRecord, ExamSummary, GroupKey, TraversalId};

use crate::{CollectOutcome, PersistError, SubmitError};

#[derive(Debug)]
pub enum EngineEvent {
    TraversalCompleted {
        traversal_id: TraversalId,
        outcome: CollectOutcome,
    },
    SubmissionCompleted(Result<BatchReceipt, SubmitError>),
    SummaryLoaded(Result<Vec<ExamSummary>, ServiceError>),
    GroupLoaded {
        key: GroupKey,
        result: Result<Arc<[DetailRecord]>, ServiceError>,
    },
    ArtifactSaved {
        key: GroupKey,
        kind: ArtifactKind,
        result: Result<PathBuf, ArtifactError>,
    },
}

/// A failed exchange with the evaluation service.
///
/// Cheap to clone so that one failure can be handed to every caller that
/// awaited the same de-duplicated fetch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: FailureKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    InvalidRequest,
    HttpStatus(u16),
    Timeout,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    MalformedBody,
    Io,
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::InvalidRequest => write!(f, "invalid request"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::MalformedBody => write!(f, "malformed response body"),
            FailureKind::Io => write!(f, "io error"),
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("download failed: {0}")]
    Download(#[from] ServiceError),
    #[error("could not save artifact: {0}")]
    Persist(#[from] PersistError),
}
