use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(CompanyId);
id_newtype!(DealId);

/// Lifecycle status of a deal. Declaration order is the board's column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    InProgress,
    Won,
    Lost,
    Cancelled,
}

impl DealStatus {
    pub const ALL: [DealStatus; 4] = [
        DealStatus::InProgress,
        DealStatus::Won,
        DealStatus::Lost,
        DealStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DealStatus::InProgress => "in_progress",
            DealStatus::Won => "won",
            DealStatus::Lost => "lost",
            DealStatus::Cancelled => "cancelled",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DealStatus::InProgress => "進行中 (In Progress)",
            DealStatus::Won => "受注 (Won)",
            DealStatus::Lost => "失注 (Lost)",
            DealStatus::Cancelled => "キャンセル (Cancelled)",
        }
    }

    /// Won, lost and cancelled deals carry a `closed_at` timestamp.
    pub fn is_closed(self) -> bool {
        !matches!(self, DealStatus::InProgress)
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown deal status '{0}'")]
pub struct UnknownDealStatus(pub String);

impl FromStr for DealStatus {
    type Err = UnknownDealStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        DealStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value.trim())
            .ok_or_else(|| UnknownDealStatus(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealType {
    #[default]
    Direct,
    Agency,
}

impl DealType {
    pub fn as_str(self) -> &'static str {
        match self {
            DealType::Direct => "direct",
            DealType::Agency => "agency",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_wire_name() {
        for status in DealStatus::ALL {
            assert_eq!(status.as_str().parse::<DealStatus>(), Ok(status));
            let json = serde_json::to_string(&status).expect("json");
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn rejects_unknown_status() {
        let err = "archived".parse::<DealStatus>().expect_err("should fail");
        assert_eq!(err.to_string(), "unknown deal status 'archived'");
        assert!(serde_json::from_str::<DealStatus>("\"archived\"").is_err());
    }

    #[test]
    fn only_in_progress_is_open() {
        assert!(!DealStatus::InProgress.is_closed());
        assert!(DealStatus::Won.is_closed());
        assert!(DealStatus::Lost.is_closed());
        assert!(DealStatus::Cancelled.is_closed());
    }
}
