//! Core domain model for drop campaign sync.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "drops-core";

/// Column width of campaign and benefit ids in the relational store.
pub const MAX_ID_LEN: usize = 40;

/// Whether `id` fits an id column. Length is counted in characters, as
/// `VARCHAR(n)` does.
pub fn id_fits(id: &str) -> bool {
    id.chars().count() <= MAX_ID_LEN
}

/// A game a campaign is attached to. Written once; never updated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub id: i32,
    pub display_name: String,
    pub box_art_url: Option<String>,
}

/// Campaign lifecycle state as reported by the API.
///
/// The set is open: anything not recognised is carried through verbatim as
/// [`CampaignStatus::Other`] so it survives a round trip through storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CampaignStatus {
    Active,
    Upcoming,
    Expired,
    Other(String),
}

impl CampaignStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "ACTIVE",
            Self::Upcoming => "UPCOMING",
            Self::Expired => "EXPIRED",
            Self::Other(raw) => raw,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }
}

impl From<&str> for CampaignStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "ACTIVE" => Self::Active,
            "UPCOMING" => Self::Upcoming,
            "EXPIRED" => Self::Expired,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for CampaignStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "ACTIVE" | "UPCOMING" | "EXPIRED" => Self::from(raw.as_str()),
            _ => Self::Other(raw),
        }
    }
}

impl From<CampaignStatus> for String {
    fn from(status: CampaignStatus) -> Self {
        match status {
            CampaignStatus::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-boxed promotional event. Only `status` changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropCampaign {
    pub id: String,
    pub name: String,
    pub game_id: i32,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: CampaignStatus,
}

/// Reward obtainable within a campaign. Keyed by the time-based drop entry id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropBenefit {
    pub id: String,
    pub name: String,
    pub drop_campaign_id: String,
    pub required_minutes_watched: i32,
    pub entitlement_limit: i32,
    pub benefit_art_url: Option<String>,
}

/// Directed edge: `benefit_id` requires `prerequisite_benefit_id` first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BenefitPrerequisite {
    pub benefit_id: String,
    pub prerequisite_benefit_id: String,
}

impl BenefitPrerequisite {
    pub fn new(benefit_id: impl Into<String>, prerequisite_benefit_id: impl Into<String>) -> Self {
        Self {
            benefit_id: benefit_id.into(),
            prerequisite_benefit_id: prerequisite_benefit_id.into(),
        }
    }
}
