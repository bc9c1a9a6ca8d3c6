use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use omr_core::{BatchReceipt, BatchStore};
use omr_logging::{next_correlation_id, omr_info, omr_warn};
use thiserror::Error;

use crate::{EvaluationService, ServiceError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("batch is empty")]
    EmptyBatch,
    #[error("a submission is already in progress")]
    SubmissionInProgress,
    #[error("submission failed: {0}")]
    SubmissionFailed(#[source] ServiceError),
}

/// Uploads a batch as a single multipart request. Never retries on its own.
pub struct BatchSubmitter {
    service: Arc<dyn EvaluationService>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag however the submission ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BatchSubmitter {
    pub fn new(service: Arc<dyn EvaluationService>) -> Self {
        Self {
            service,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Both precondition failures are returned before anything touches the network.
    pub async fn submit(&self, batch: &BatchStore) -> Result<BatchReceipt, SubmitError> {
        if batch.is_empty() {
            return Err(SubmitError::EmptyBatch);
        }
        let _guard = InFlightGuard::acquire(&self.in_flight)
            .ok_or(SubmitError::SubmissionInProgress)?;

        let id = next_correlation_id();
        omr_info!("submission {}: uploading {} files", id, batch.count());
        match self.service.submit_batch(batch.files()).await {
            Ok(receipt) => {
                omr_info!("submission {}: accepted", id);
                Ok(receipt)
            }
            Err(err) => {
                omr_warn!("submission {}: {}", id, err);
                Err(SubmitError::SubmissionFailed(err))
            }
        }
    }
}
