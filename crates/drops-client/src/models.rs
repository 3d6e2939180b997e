//! Response shapes for the dashboard and details operations.

use chrono::{DateTime, Utc};
use drops_core::{CampaignStatus, DropCampaign, Game};
use serde::de::{self, Deserializer};
use serde::Deserialize;

/// One element of a batched GraphQL response.
#[derive(Debug, Deserialize)]
pub struct GqlResponse<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GqlErrorEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GqlErrorEntry {
    pub message: String,
}

impl<T> GqlResponse<T> {
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub current_user: Option<CurrentUser>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub login: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub drop_campaigns: Vec<CampaignListing>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignListing {
    pub id: String,
    pub name: String,
    pub game: GameRef,
    pub status: CampaignStatus,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl CampaignListing {
    pub fn to_campaign(&self) -> DropCampaign {
        DropCampaign {
            id: self.id.clone(),
            name: self.name.clone(),
            game_id: self.game.id,
            start_at: self.start_at,
            end_at: self.end_at,
            status: self.status.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRef {
    #[serde(deserialize_with = "int_from_str_or_number")]
    pub id: i32,
    pub display_name: String,
    #[serde(rename = "boxArtURL", default)]
    pub box_art_url: Option<String>,
}

impl GameRef {
    pub fn to_game(&self) -> Game {
        Game {
            id: self.id,
            display_name: self.display_name.clone(),
            box_art_url: self.box_art_url.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsData {
    pub user: Option<DetailsUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsUser {
    pub drop_campaign: Option<DropCampaignDetails>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropCampaignDetails {
    #[serde(rename = "id")]
    pub campaign_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub time_based_drops: Vec<TimeBasedDrop>,
}

/// A watch-time drop entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBasedDrop {
    pub id: String,
    pub name: String,
    pub required_minutes_watched: i32,
    #[serde(default)]
    pub precondition_drops: Option<Vec<PreconditionDrop>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub benefit_edges: Vec<BenefitEdge>,
}

/// Reference to an entry that must be earned first. Only the id is queried,
/// plus any further preconditions of its own.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreconditionDrop {
    pub id: String,
    #[serde(default)]
    pub precondition_drops: Option<Vec<PreconditionDrop>>,
}

impl PreconditionDrop {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            precondition_drops: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenefitEdge {
    pub benefit: Benefit,
    pub entitlement_limit: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Benefit {
    pub id: String,
    pub name: String,
    #[serde(rename = "imageAssetURL", default)]
    pub image_asset_url: Option<String>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn int_from_str_or_number<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    let value = match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n,
        Raw::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| de::Error::custom(format!("invalid integer id {s:?}")))?,
    };
    i32::try_from(value).map_err(|_| de::Error::custom(format!("id {value} out of range")))
}
