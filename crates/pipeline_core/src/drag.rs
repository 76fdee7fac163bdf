//! Lifecycle of a single drag gesture, independent of any gesture library.

use shared::domain::{DealId, DealStatus};
use tracing::debug;

use crate::error::PipelineError;

/// What the pointer was over when the gesture ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTarget {
    Column(DealStatus),
    /// Dropped onto a card; resolves to the column that card sits in.
    Card(DealId),
}

impl DropTarget {
    /// Parses the droppable id reported by a gesture library: a status name
    /// (`"won"`), or a card id (`"12"` / `"deal-12"`).
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim();
        if let Ok(status) = id.parse::<DealStatus>() {
            return Some(DropTarget::Column(status));
        }
        id.strip_prefix("deal-")
            .unwrap_or(id)
            .parse::<i64>()
            .ok()
            .map(|raw| DropTarget::Card(DealId(raw)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        deal_id: DealId,
    },
    Resolved {
        deal_id: DealId,
        target: DealStatus,
    },
    Cancelled {
        deal_id: DealId,
    },
}

/// A finished gesture, handed to the transition controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragResolution {
    Resolved { deal_id: DealId, target: DealStatus },
    Cancelled { deal_id: DealId },
}

#[derive(Debug, Default)]
pub struct DragSession {
    state: DragState,
}

impl DragSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == DragState::Idle
    }

    /// Idle -> Dragging. A finished but unconsumed gesture also blocks a new one.
    pub fn start(&mut self, deal_id: DealId) -> Result<(), PipelineError> {
        match self.state {
            DragState::Idle => {
                debug!(deal_id = deal_id.0, "drag started");
                self.state = DragState::Dragging { deal_id };
                Ok(())
            }
            DragState::Dragging { deal_id: active }
            | DragState::Resolved {
                deal_id: active, ..
            }
            | DragState::Cancelled { deal_id: active } => {
                Err(PipelineError::DragInProgress(active))
            }
        }
    }

    /// Dragging -> Resolved when released over a column (its own column
    /// included), Dragging -> Cancelled when released over nothing.
    pub fn end(&mut self, target: Option<DealStatus>) -> Result<DragState, PipelineError> {
        let DragState::Dragging { deal_id } = self.state else {
            return Err(PipelineError::NoActiveDrag);
        };
        self.state = match target {
            Some(target) => DragState::Resolved { deal_id, target },
            None => DragState::Cancelled { deal_id },
        };
        debug!(deal_id = deal_id.0, state = ?self.state, "drag ended");
        Ok(self.state)
    }

    /// Dragging -> Cancelled, e.g. on escape.
    pub fn cancel(&mut self) -> Result<DragState, PipelineError> {
        self.end(None)
    }

    /// Consumes a finished gesture and returns the session to Idle.
    pub fn take(&mut self) -> Option<DragResolution> {
        let resolution = match self.state {
            DragState::Resolved { deal_id, target } => {
                DragResolution::Resolved { deal_id, target }
            }
            DragState::Cancelled { deal_id } => DragResolution::Cancelled { deal_id },
            DragState::Idle | DragState::Dragging { .. } => return None,
        };
        self.state = DragState::Idle;
        Some(resolution)
    }
}

#[cfg(test)]
#[path = "tests/drag_tests.rs"]
mod tests;
