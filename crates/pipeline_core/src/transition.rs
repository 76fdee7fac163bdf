//! Apply-then-confirm status transitions with compensating rollback.
//!
//! A transition runs in two phases. [`TransitionController::begin`] reads the
//! deal's current status and applies the new one under a single lock, with no
//! suspension point in between. [`TransitionController::settle`] sends the
//! remote update and, if the Deal Service rejects it, rolls the deal back.
//!
//! Several transitions on the same deal may be in flight at once. They form a
//! per-deal chain:
//!
//! * remote updates for one deal are sent in the order the transitions began,
//!   each waiting for its predecessor to settle;
//! * a rejected transition that has a newer pending successor leaves the local
//!   status alone and hands its own rollback point to that successor;
//! * a rejected transition with no successor restores its rollback point, but
//!   only while the deal still shows the rejected status.
//!
//! Rollback points belong to the store generation they were captured in. Once
//! the store is reloaded, older transitions neither restore nor hand over.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use shared::{
    domain::{DealId, DealStatus},
    protocol::{Deal, DealUpdate},
};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, warn};

use crate::{
    columns::{self, Column},
    deal_store::DealStore,
    error::PipelineError,
    events::{Notice, PipelineEvent, MOVE_REVERTED_MESSAGE},
    service::DealService,
};

const EVENT_CAPACITY: usize = 256;

/// Result of one resolved drag.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// Dropped onto the deal's own column; nothing was changed or sent.
    NotApplicable { deal_id: DealId, status: DealStatus },
    /// The Deal Service accepted the new status.
    Committed {
        deal_id: DealId,
        previous: DealStatus,
        current: DealStatus,
        deal: Box<Deal>,
    },
    /// The Deal Service rejected the update and the local change was compensated.
    RolledBack {
        deal_id: DealId,
        attempted: DealStatus,
        /// Local status after compensation; `None` if a reload dropped the deal.
        restored: Option<DealStatus>,
        /// A newer transition on the same deal owned the local status.
        superseded: bool,
        error: PipelineError,
    },
}

/// Phase-one receipt. Must be passed to [`TransitionController::settle`].
///
/// Dropping it unsettled (or dropping the `settle` future) releases its ledger
/// entry. If the remote update was never sent, the local change is
/// compensated as if it had been rejected.
#[must_use = "an optimistic transition must be settled"]
#[derive(Debug)]
pub struct PendingTransition {
    deal_id: DealId,
    seq: u64,
    previous: DealStatus,
    target: DealStatus,
    predecessor: Option<oneshot::Receiver<()>>,
    settled: Option<oneshot::Sender<()>>,
    dispatched: bool,
    ledger: Weak<Ledger>,
}

impl PendingTransition {
    pub fn deal_id(&self) -> DealId {
        self.deal_id
    }

    pub fn previous(&self) -> DealStatus {
        self.previous
    }

    pub fn target(&self) -> DealStatus {
        self.target
    }
}

impl Drop for PendingTransition {
    fn drop(&mut self) {
        if self.settled.is_none() {
            return;
        }
        let Some(ledger) = self.ledger.upgrade() else {
            return;
        };
        if self.dispatched {
            warn!(
                deal_id = self.deal_id.0,
                target = %self.target,
                "transition abandoned after its update was sent; outcome unknown"
            );
            ledger.release(self.deal_id, self.seq);
        } else {
            warn!(
                deal_id = self.deal_id.0,
                target = %self.target,
                "transition abandoned before its update was sent"
            );
            ledger.compensate(self.deal_id, self.seq);
        }
    }
}

#[derive(Debug)]
struct InFlight {
    seq: u64,
    epoch: u64,
    rollback_to: DealStatus,
    target: DealStatus,
}

#[derive(Debug, Default)]
struct Lane {
    pending: Vec<InFlight>,
    tail: Option<oneshot::Receiver<()>>,
}

#[derive(Debug, Default)]
struct Inner {
    store: DealStore,
    lanes: HashMap<DealId, Lane>,
    next_seq: u64,
    /// Bumped on every store reload.
    epoch: u64,
}

enum Compensation {
    Restored(DealStatus),
    Superseded(Option<DealStatus>),
    Diverged(Option<DealStatus>),
}

/// Store, in-flight ledger and event fan-out shared with pending receipts.
#[derive(Debug)]
struct Ledger {
    inner: Mutex<Inner>,
    events: broadcast::Sender<PipelineEvent>,
}

impl Ledger {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine; the view may not be mounted.
        let _ = self.events.send(event);
    }

    /// Drops the ledger entry without touching the store.
    fn release(&self, deal_id: DealId, seq: u64) {
        let mut inner = self.lock();
        if let Some(lane) = inner.lanes.get_mut(&deal_id) {
            lane.pending.retain(|entry| entry.seq != seq);
            if lane.pending.is_empty() {
                inner.lanes.remove(&deal_id);
            }
        }
    }

    fn compensate(&self, deal_id: DealId, seq: u64) -> Compensation {
        let (compensation, revision) = {
            let mut guard = self.lock();
            let Inner {
                store,
                lanes,
                epoch,
                ..
            } = &mut *guard;
            let current = store.status_of(deal_id).ok();

            let Some(lane) = lanes.get_mut(&deal_id) else {
                return Compensation::Diverged(current);
            };
            let Some(position) = lane.pending.iter().position(|entry| entry.seq == seq) else {
                return Compensation::Diverged(current);
            };
            let failed = lane.pending.remove(position);

            let compensation = if failed.epoch != *epoch {
                warn!(
                    deal_id = deal_id.0,
                    attempted = %failed.target,
                    current = ?current,
                    "store reloaded while the transition was in flight; keeping reloaded status"
                );
                Compensation::Diverged(current)
            } else if let Some(successor) = lane.pending.get_mut(position) {
                debug!(
                    deal_id = deal_id.0,
                    rollback_to = %failed.rollback_to,
                    "newer transition pending; handing over rollback point"
                );
                successor.rollback_to = failed.rollback_to;
                Compensation::Superseded(current)
            } else if current == Some(failed.target) {
                match store.set_status(deal_id, failed.rollback_to) {
                    Ok(_) => Compensation::Restored(failed.rollback_to),
                    Err(_) => Compensation::Diverged(None),
                }
            } else {
                warn!(
                    deal_id = deal_id.0,
                    expected = %failed.target,
                    current = ?current,
                    "deal changed underneath a failed transition; leaving it as is"
                );
                Compensation::Diverged(current)
            };

            if lane.pending.is_empty() {
                lanes.remove(&deal_id);
            }
            (compensation, store.revision())
        };

        if let Compensation::Restored(status) = compensation {
            info!(deal_id = deal_id.0, %status, "rolled back status change");
            self.emit(PipelineEvent::StoreChanged { revision });
        }
        compensation
    }
}

pub struct TransitionController {
    service: Arc<dyn DealService>,
    ledger: Arc<Ledger>,
}

impl TransitionController {
    pub fn new(service: Arc<dyn DealService>) -> Self {
        Self::with_store(service, DealStore::new())
    }

    pub fn with_store(service: Arc<dyn DealService>, store: DealStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            service,
            ledger: Arc::new(Ledger {
                inner: Mutex::new(Inner {
                    store,
                    ..Inner::default()
                }),
                events,
            }),
        }
    }

    pub fn service(&self) -> &Arc<dyn DealService> {
        &self.service
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.ledger.events.subscribe()
    }

    pub fn status_of(&self, deal_id: DealId) -> Result<DealStatus, PipelineError> {
        self.ledger.lock().store.status_of(deal_id)
    }

    pub fn contains(&self, deal_id: DealId) -> bool {
        self.ledger.lock().store.contains(deal_id)
    }

    pub fn revision(&self) -> u64 {
        self.ledger.lock().store.revision()
    }

    pub fn snapshot(&self) -> Vec<Deal> {
        self.ledger.lock().store.deals().to_vec()
    }

    pub fn project(&self) -> BTreeMap<DealStatus, Vec<Deal>> {
        columns::project(self.ledger.lock().store.deals())
    }

    pub fn columns(&self) -> Vec<Column> {
        columns::columns(self.ledger.lock().store.deals())
    }

    /// Number of transitions whose remote update has not settled yet.
    pub fn in_flight(&self) -> usize {
        self.ledger
            .lock()
            .lanes
            .values()
            .map(|lane| lane.pending.len())
            .sum()
    }

    /// Replaces the store with a fresh collection. Transitions still in flight
    /// keep their dispatch order but lose their rollback points.
    pub fn replace_deals(&self, deals: Vec<Deal>) -> Result<(), PipelineError> {
        let revision = {
            let mut inner = self.ledger.lock();
            inner.store.replace_all(deals)?;
            inner.epoch += 1;
            inner.store.revision()
        };
        self.ledger.emit(PipelineEvent::StoreChanged { revision });
        Ok(())
    }

    /// Runs both phases for one resolved drag.
    pub async fn handle_resolved(
        &self,
        deal_id: DealId,
        target: DealStatus,
    ) -> Result<TransitionOutcome, PipelineError> {
        match self.begin(deal_id, target)? {
            Some(pending) => Ok(self.settle(pending).await),
            None => Ok(TransitionOutcome::NotApplicable {
                deal_id,
                status: target,
            }),
        }
    }

    /// Phase one: read the current status and apply `target` locally.
    ///
    /// Returns `None` when the deal already has `target`.
    pub fn begin(
        &self,
        deal_id: DealId,
        target: DealStatus,
    ) -> Result<Option<PendingTransition>, PipelineError> {
        let (pending, revision) = {
            let mut inner = self.ledger.lock();
            let previous = inner.store.status_of(deal_id).map_err(|err| {
                error!(deal_id = deal_id.0, %target, "resolved drag for a deal missing from the store");
                err
            })?;
            if previous == target {
                debug!(deal_id = deal_id.0, status = %target, "drop onto own column ignored");
                return Ok(None);
            }
            inner.store.set_status(deal_id, target)?;

            let seq = inner.next_seq;
            inner.next_seq += 1;
            let epoch = inner.epoch;
            let revision = inner.store.revision();

            let (settled, tail) = oneshot::channel();
            let lane = inner.lanes.entry(deal_id).or_default();
            lane.pending.push(InFlight {
                seq,
                epoch,
                rollback_to: previous,
                target,
            });
            let predecessor = lane.tail.replace(tail);

            let pending = PendingTransition {
                deal_id,
                seq,
                previous,
                target,
                predecessor,
                settled: Some(settled),
                dispatched: false,
                ledger: Arc::downgrade(&self.ledger),
            };
            (pending, revision)
        };

        info!(
            deal_id = deal_id.0,
            from = %pending.previous,
            to = %target,
            "applied optimistic status change"
        );
        self.ledger.emit(PipelineEvent::StoreChanged { revision });
        Ok(Some(pending))
    }

    /// Phase two: persist remotely, then confirm or compensate.
    pub async fn settle(&self, mut pending: PendingTransition) -> TransitionOutcome {
        let (deal_id, seq, previous, target) = (
            pending.deal_id,
            pending.seq,
            pending.previous,
            pending.target,
        );

        if let Some(predecessor) = pending.predecessor.take() {
            // An error only means the predecessor was dropped unsettled.
            let _ = predecessor.await;
        }

        pending.dispatched = true;
        let result = self
            .service
            .update_deal(deal_id, &DealUpdate::status(target))
            .await;

        let outcome = match result {
            Ok(deal) => {
                self.ledger.release(deal_id, seq);
                info!(deal_id = deal_id.0, status = %target, "status change persisted");
                TransitionOutcome::Committed {
                    deal_id,
                    previous,
                    current: target,
                    deal: Box::new(deal),
                }
            }
            Err(source) => {
                warn!(
                    deal_id = deal_id.0,
                    attempted = %target,
                    error = %source,
                    "deal service rejected status change"
                );
                let error = PipelineError::TransitionRejected {
                    deal_id,
                    attempted: target,
                    source,
                };
                let (restored, superseded) = match self.ledger.compensate(deal_id, seq) {
                    Compensation::Restored(status) => (Some(status), false),
                    Compensation::Superseded(current) => (current, true),
                    Compensation::Diverged(current) => (current, false),
                };
                self.ledger.emit(PipelineEvent::Notice(Notice {
                    deal_id,
                    message: MOVE_REVERTED_MESSAGE.to_string(),
                    error: error.clone(),
                }));
                TransitionOutcome::RolledBack {
                    deal_id,
                    attempted: target,
                    restored,
                    superseded,
                    error,
                }
            }
        };

        if let Some(settled) = pending.settled.take() {
            let _ = settled.send(());
        }
        outcome
    }
}

#[cfg(test)]
#[path = "tests/transition_tests.rs"]
mod tests;
