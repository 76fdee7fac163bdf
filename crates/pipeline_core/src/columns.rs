use std::collections::BTreeMap;

use shared::{
    domain::{DealId, DealStatus},
    protocol::Deal,
};

/// Groups deals by status. All four statuses are always present as keys and
/// each group keeps the source order.
pub fn project(deals: &[Deal]) -> BTreeMap<DealStatus, Vec<Deal>> {
    let mut groups: BTreeMap<DealStatus, Vec<Deal>> = DealStatus::ALL
        .into_iter()
        .map(|status| (status, Vec::new()))
        .collect();
    for deal in deals {
        groups.entry(deal.status).or_default().push(deal.clone());
    }
    groups
}

/// One rendered pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub status: DealStatus,
    pub label: &'static str,
    pub deals: Vec<Deal>,
}

impl Column {
    pub fn len(&self) -> usize {
        self.deals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deals.is_empty()
    }

    pub fn total_value(&self) -> f64 {
        self.deals.iter().map(|deal| deal.value).sum()
    }

    pub fn deal_ids(&self) -> Vec<DealId> {
        self.deals.iter().map(|deal| deal.id).collect()
    }
}

/// Board columns in display order: in progress, won, lost, cancelled.
pub fn columns(deals: &[Deal]) -> Vec<Column> {
    project(deals)
        .into_iter()
        .map(|(status, deals)| Column {
            status,
            label: status.label(),
            deals,
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/columns_tests.rs"]
mod tests;
