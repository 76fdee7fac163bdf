use std::collections::HashMap;

use shared::{
    domain::{DealId, DealStatus},
    protocol::Deal,
};
use tracing::{error, info, warn};

use crate::{
    error::{PipelineError, ServiceError},
    service::DealService,
};

/// Session-local copy of the deal collection.
///
/// Owned by whoever renders the board; there is no process-wide instance.
/// Every mutation bumps [`DealStore::revision`], which is what views watch to
/// know they must re-project the columns.
#[derive(Debug, Default, Clone)]
pub struct DealStore {
    deals: Vec<Deal>,
    index: HashMap<DealId, usize>,
    revision: u64,
}

impl DealStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_deals(deals: Vec<Deal>) -> Result<Self, PipelineError> {
        let mut store = Self::new();
        store.replace_all(deals)?;
        Ok(store)
    }

    /// Fetches and validates the full collection without touching any store.
    pub async fn fetch(service: &dyn DealService) -> Result<Vec<Deal>, PipelineError> {
        let deals = service.list_deals().await.map_err(|source| {
            warn!(error = %source, "deal collection fetch failed");
            PipelineError::Fetch(source)
        })?;
        index_deals(&deals)?;
        Ok(deals)
    }

    /// Replaces the contents with a fresh fetch. On failure the previous
    /// contents are kept.
    pub async fn load(&mut self, service: &dyn DealService) -> Result<&[Deal], PipelineError> {
        let deals = Self::fetch(service).await?;
        self.replace_all(deals)?;
        Ok(&self.deals)
    }

    pub fn replace_all(&mut self, deals: Vec<Deal>) -> Result<(), PipelineError> {
        let index = index_deals(&deals)?;
        self.deals = deals;
        self.index = index;
        self.revision += 1;
        info!(
            deals = self.deals.len(),
            revision = self.revision,
            "deal store replaced"
        );
        Ok(())
    }

    pub fn deals(&self) -> &[Deal] {
        &self.deals
    }

    pub fn get(&self, deal_id: DealId) -> Option<&Deal> {
        self.index.get(&deal_id).map(|&i| &self.deals[i])
    }

    pub fn contains(&self, deal_id: DealId) -> bool {
        self.index.contains_key(&deal_id)
    }

    pub fn status_of(&self, deal_id: DealId) -> Result<DealStatus, PipelineError> {
        self.get(deal_id)
            .map(|deal| deal.status)
            .ok_or(PipelineError::NotFound(deal_id))
    }

    /// Sets the status of one deal and returns the status it had before.
    pub fn set_status(
        &mut self,
        deal_id: DealId,
        status: DealStatus,
    ) -> Result<DealStatus, PipelineError> {
        let Some(&i) = self.index.get(&deal_id) else {
            error!(deal_id = deal_id.0, %status, "status change for a deal missing from the store");
            return Err(PipelineError::NotFound(deal_id));
        };
        let deal = &mut self.deals[i];
        let previous = deal.status;
        if previous != status {
            deal.status = status;
            self.revision += 1;
        }
        Ok(previous)
    }

    pub fn len(&self) -> usize {
        self.deals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deals.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

fn index_deals(deals: &[Deal]) -> Result<HashMap<DealId, usize>, PipelineError> {
    let mut index = HashMap::with_capacity(deals.len());
    for (i, deal) in deals.iter().enumerate() {
        if index.insert(deal.id, i).is_some() {
            return Err(PipelineError::Fetch(ServiceError::Malformed(format!(
                "deal {} appears more than once in the collection",
                deal.id
            ))));
        }
    }
    Ok(index)
}

#[cfg(test)]
#[path = "tests/deal_store_tests.rs"]
mod tests;
