use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CompanyId, DealId, DealStatus, DealType, UserId};

pub const DEFAULT_PAGE_LIMIT: u32 = 100;
pub const MAX_PAGE_LIMIT: u32 = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySummary {
    pub id: CompanyId,
    pub company_name: String,
    #[serde(default)]
    pub industry: String,
}

/// A deal as returned by the Deal Service, with its owner and company embedded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: DealId,
    pub title: String,
    pub value: f64,
    pub status: DealStatus,
    #[serde(rename = "type", default)]
    pub deal_type: DealType,
    pub user_id: UserId,
    pub company_id: CompanyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<CompanySummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeal {
    pub title: String,
    pub value: f64,
    #[serde(default = "default_status")]
    pub status: DealStatus,
    #[serde(rename = "type", default)]
    pub deal_type: DealType,
    pub user_id: UserId,
    pub company_id: CompanyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

fn default_status() -> DealStatus {
    DealStatus::InProgress
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DealStatus>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub deal_type: Option<DealType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<CompanyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
}

impl DealUpdate {
    pub fn status(status: DealStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DealStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<CompanyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl DealFilters {
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCompany {
    pub company_name: String,
    #[serde(default)]
    pub industry: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_update_serializes_only_status() {
        let body = serde_json::to_value(DealUpdate::status(DealStatus::Lost)).expect("json");
        assert_eq!(body, serde_json::json!({ "status": "lost" }));
    }

    #[test]
    fn deal_reads_frontend_shape() {
        let deal: Deal = serde_json::from_value(serde_json::json!({
            "id": 7,
            "title": "Renewal",
            "value": 1200.5,
            "status": "in_progress",
            "type": "agency",
            "user_id": 1,
            "company_id": 2,
            "created_at": "2024-05-01T00:00:00Z",
            "updated_at": "2024-05-01T00:00:00Z",
            "company": { "id": 2, "company_name": "Acme", "industry": "retail" }
        }))
        .expect("deal");
        assert_eq!(deal.id, DealId(7));
        assert_eq!(deal.deal_type, DealType::Agency);
        assert_eq!(deal.company.map(|c| c.company_name), Some("Acme".into()));
        assert!(deal.user.is_none());
    }

    #[test]
    fn page_limit_is_clamped() {
        assert_eq!(DealFilters::default().effective_limit(), DEFAULT_PAGE_LIMIT);
        let filters = DealFilters {
            limit: Some(10_000),
            ..DealFilters::default()
        };
        assert_eq!(filters.effective_limit(), MAX_PAGE_LIMIT);
        let filters = DealFilters {
            limit: Some(0),
            ..DealFilters::default()
        };
        assert_eq!(filters.effective_limit(), 1);
    }
}
