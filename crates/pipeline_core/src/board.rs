use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use shared::{
    domain::{DealId, DealStatus},
    protocol::Deal,
};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{
    columns::Column,
    deal_store::DealStore,
    drag::{DragResolution, DragSession, DragState, DropTarget},
    error::PipelineError,
    events::PipelineEvent,
    service::DealService,
    transition::{TransitionController, TransitionOutcome},
};

#[derive(Debug, Clone, PartialEq)]
pub enum DragOutcome {
    /// Released over nothing; no transition was attempted.
    Cancelled { deal_id: DealId },
    Transition(TransitionOutcome),
}

/// The pipeline board: deal store, column projection and drag handling for
/// one rendering session.
pub struct PipelineBoard {
    controller: Arc<TransitionController>,
    session: Mutex<DragSession>,
}

impl PipelineBoard {
    pub fn new(service: Arc<dyn DealService>) -> Self {
        Self::with_controller(Arc::new(TransitionController::new(service)))
    }

    pub fn with_controller(controller: Arc<TransitionController>) -> Self {
        Self {
            controller,
            session: Mutex::new(DragSession::new()),
        }
    }

    pub fn controller(&self) -> &Arc<TransitionController> {
        &self.controller
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.controller.subscribe()
    }

    /// Fetches the full collection and replaces the store with it. The board
    /// keeps showing what it had if the fetch fails.
    pub async fn load(&self) -> Result<usize, PipelineError> {
        let deals = DealStore::fetch(self.controller.service().as_ref()).await?;
        let count = deals.len();
        self.controller.replace_deals(deals)?;
        Ok(count)
    }

    pub fn deals(&self) -> Vec<Deal> {
        self.controller.snapshot()
    }

    pub fn columns(&self) -> Vec<Column> {
        self.controller.columns()
    }

    pub fn project(&self) -> BTreeMap<DealStatus, Vec<Deal>> {
        self.controller.project()
    }

    pub fn drag_state(&self) -> DragState {
        self.session().state()
    }

    pub fn start_drag(&self, deal_id: DealId) -> Result<(), PipelineError> {
        if !self.controller.contains(deal_id) {
            return Err(PipelineError::NotFound(deal_id));
        }
        self.session().start(deal_id)
    }

    pub fn cancel_drag(&self) -> Result<DragOutcome, PipelineError> {
        let deal_id = {
            let mut session = self.session();
            session.cancel()?;
            match session.take() {
                Some(DragResolution::Cancelled { deal_id }) => deal_id,
                _ => return Err(PipelineError::NoActiveDrag),
            }
        };
        debug!(deal_id = deal_id.0, "drag cancelled");
        Ok(DragOutcome::Cancelled { deal_id })
    }

    /// Ends the active drag and, if it resolved onto a column, runs the
    /// optimistic transition.
    pub async fn end_drag(&self, target: Option<DropTarget>) -> Result<DragOutcome, PipelineError> {
        let resolution = {
            let mut session = self.session();
            let status = target.and_then(|target| self.resolve_target(target));
            session.end(status)?;
            session.take().ok_or(PipelineError::NoActiveDrag)?
        };

        match resolution {
            DragResolution::Cancelled { deal_id } => Ok(DragOutcome::Cancelled { deal_id }),
            DragResolution::Resolved { deal_id, target } => self
                .controller
                .handle_resolved(deal_id, target)
                .await
                .map(DragOutcome::Transition),
        }
    }

    /// Adapter for gesture libraries that report only the dragged card and the
    /// raw id of whatever it was released over.
    pub async fn on_drag_end(
        &self,
        source: DealId,
        over: Option<&str>,
    ) -> Result<DragOutcome, PipelineError> {
        let target = over.and_then(|raw| {
            let parsed = DropTarget::parse(raw);
            if parsed.is_none() {
                warn!(deal_id = source.0, over = raw, "unrecognised drop target");
            }
            parsed
        });

        match self.drag_state() {
            DragState::Idle => self.start_drag(source)?,
            DragState::Dragging { deal_id } if deal_id == source => {}
            DragState::Dragging { deal_id }
            | DragState::Resolved { deal_id, .. }
            | DragState::Cancelled { deal_id } => {
                return Err(PipelineError::DragInProgress(deal_id));
            }
        }
        self.end_drag(target).await
    }

    fn resolve_target(&self, target: DropTarget) -> Option<DealStatus> {
        match target {
            DropTarget::Column(status) => Some(status),
            DropTarget::Card(deal_id) => {
                let status = self.controller.status_of(deal_id).ok();
                if status.is_none() {
                    debug!(deal_id = deal_id.0, "dropped onto a card that is no longer on the board");
                }
                status
            }
        }
    }

    fn session(&self) -> MutexGuard<'_, DragSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "tests/board_tests.rs"]
mod tests;
