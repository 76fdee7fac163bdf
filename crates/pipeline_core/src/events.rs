use shared::domain::DealId;

use crate::error::PipelineError;

pub const MOVE_REVERTED_MESSAGE: &str = "Failed to update deal status. Reverting change.";

/// Transient, dismissible message for the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub deal_id: DealId,
    pub message: String,
    pub error: PipelineError,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// The deal store changed; re-project the columns.
    StoreChanged { revision: u64 },
    Notice(Notice),
}
