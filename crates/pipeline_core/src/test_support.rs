use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use shared::{
    domain::{CompanyId, DealId, DealStatus, DealType, UserId},
    error::ErrorCode,
    protocol::{Deal, DealUpdate},
};
use tokio::sync::{mpsc, oneshot};

use crate::{error::ServiceError, service::DealService};

pub(crate) fn deal(id: i64, status: DealStatus) -> Deal {
    let created = Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap();
    Deal {
        id: DealId(id),
        title: format!("Deal {id}"),
        value: 1_000.0 * id as f64,
        status,
        deal_type: DealType::Direct,
        user_id: UserId(1),
        company_id: CompanyId(1),
        lead_source: None,
        product_name: None,
        closed_at: None,
        created_at: created,
        updated_at: created,
        user: None,
        company: None,
    }
}

pub(crate) fn rejection() -> ServiceError {
    ServiceError::Rejected {
        status: 500,
        code: Some(ErrorCode::Internal),
        message: "database unavailable".to_string(),
    }
}

/// An update held by a gated fake until the test answers it.
pub(crate) struct GatedUpdate {
    pub deal_id: DealId,
    pub status: DealStatus,
    reply: oneshot::Sender<Result<(), ServiceError>>,
}

impl GatedUpdate {
    pub fn accept(self) {
        let _ = self.reply.send(Ok(()));
    }

    pub fn reject(self) {
        let _ = self.reply.send(Err(rejection()));
    }
}

#[derive(Clone)]
enum Mode {
    Accept,
    Reject,
    Gated(mpsc::UnboundedSender<GatedUpdate>),
}

pub(crate) struct FakeDealService {
    deals: Mutex<Result<Vec<Deal>, ServiceError>>,
    mode: Mutex<Mode>,
    updates: Mutex<Vec<(DealId, DealStatus)>>,
}

impl FakeDealService {
    pub fn accepting(deals: Vec<Deal>) -> Self {
        Self::with_mode(deals, Mode::Accept)
    }

    pub fn rejecting(deals: Vec<Deal>) -> Self {
        Self::with_mode(deals, Mode::Reject)
    }

    pub fn gated(deals: Vec<Deal>) -> (Self, mpsc::UnboundedReceiver<GatedUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::with_mode(deals, Mode::Gated(tx)), rx)
    }

    fn with_mode(deals: Vec<Deal>, mode: Mode) -> Self {
        Self {
            deals: Mutex::new(Ok(deals)),
            mode: Mutex::new(mode),
            updates: Mutex::new(Vec::new()),
        }
    }

    pub fn set_deals(&self, deals: Vec<Deal>) {
        *self.deals.lock().unwrap() = Ok(deals);
    }

    pub fn fail_list(&self, error: ServiceError) {
        *self.deals.lock().unwrap() = Err(error);
    }

    pub fn reject_updates(&self) {
        *self.mode.lock().unwrap() = Mode::Reject;
    }

    pub fn updates(&self) -> Vec<(DealId, DealStatus)> {
        self.updates.lock().unwrap().clone()
    }

    fn updated(&self, deal_id: DealId, status: DealStatus) -> Deal {
        let mut updated = self
            .deals
            .lock()
            .unwrap()
            .as_ref()
            .ok()
            .and_then(|deals| deals.iter().find(|d| d.id == deal_id).cloned())
            .unwrap_or_else(|| deal(deal_id.0, status));
        updated.status = status;
        updated
    }
}

#[async_trait]
impl DealService for FakeDealService {
    async fn list_deals(&self) -> Result<Vec<Deal>, ServiceError> {
        self.deals.lock().unwrap().clone()
    }

    async fn update_deal(
        &self,
        deal_id: DealId,
        update: &DealUpdate,
    ) -> Result<Deal, ServiceError> {
        let status = update.status.expect("board only sends status updates");
        self.updates.lock().unwrap().push((deal_id, status));

        let mode = self.mode.lock().unwrap().clone();
        match mode {
            Mode::Accept => Ok(self.updated(deal_id, status)),
            Mode::Reject => Err(rejection()),
            Mode::Gated(tx) => {
                let (reply, answer) = oneshot::channel();
                tx.send(GatedUpdate {
                    deal_id,
                    status,
                    reply,
                })
                .expect("test dropped the gate receiver");
                answer
                    .await
                    .unwrap_or_else(|_| Err(ServiceError::Transport("gate dropped".into())))?;
                Ok(self.updated(deal_id, status))
            }
        }
    }
}
