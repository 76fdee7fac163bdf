use shared::{
    domain::{DealId, DealStatus},
    error::ErrorCode,
};
use thiserror::Error;

/// Failure talking to the Deal Service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ServiceError {
    #[error("deal service unreachable: {0}")]
    Transport(String),
    #[error("deal service rejected the request with status {status}: {message}")]
    Rejected {
        status: u16,
        code: Option<ErrorCode>,
        message: String,
    },
    #[error("malformed deal service response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("failed to load deals: {0}")]
    Fetch(#[source] ServiceError),
    #[error("failed to move deal {deal_id} to {attempted}: {source}")]
    TransitionRejected {
        deal_id: DealId,
        attempted: DealStatus,
        #[source]
        source: ServiceError,
    },
    #[error("deal {0} is not present in the pipeline store")]
    NotFound(DealId),
    #[error("a drag is already in progress for deal {0}")]
    DragInProgress(DealId),
    #[error("no drag is in progress")]
    NoActiveDrag,
}

impl PipelineError {
    /// Store invariant violations are programming defects, not user errors.
    pub fn is_defect(&self) -> bool {
        matches!(self, PipelineError::NotFound(_))
    }
}
