//! Client side of the sales pipeline board.
//!
//! [`PipelineBoard`] keeps a session-local [`DealStore`], projects it into
//! status columns, and turns finished drag gestures into optimistic status
//! transitions against a [`DealService`].

pub mod board;
pub mod columns;
pub mod deal_store;
pub mod drag;
pub mod error;
pub mod events;
pub mod service;
pub mod transition;

pub use board::{DragOutcome, PipelineBoard};
pub use columns::{columns, project, Column};
pub use deal_store::DealStore;
pub use drag::{DragResolution, DragSession, DragState, DropTarget};
pub use error::{PipelineError, ServiceError};
pub use events::{Notice, PipelineEvent, MOVE_REVERTED_MESSAGE};
pub use service::{ClientSettings, DealService, HttpDealService};
pub use transition::{PendingTransition, TransitionController, TransitionOutcome};

#[cfg(test)]
mod test_support;
