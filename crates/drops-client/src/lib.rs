//! Twitch GraphQL client for the drops dashboard and campaign detail lookups.

pub mod client;
pub mod gql;
pub mod models;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{authorization_value, GqlClient, GqlClientConfig, DEFAULT_GQL_ENDPOINT};
pub use models::{
    Benefit, BenefitEdge, CampaignListing, CurrentUser, DropCampaignDetails, GameRef,
    PreconditionDrop, TimeBasedDrop,
};

pub const CRATE_NAME: &str = "drops-client";

/// Upper bound on campaign ids per `DropCampaignDetails` call.
pub const MAX_DETAILS_BATCH: usize = 35;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("http status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response shape: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("graphql error: {0}")]
    Graphql(String),
    #[error("details batch of {len} exceeds limit of {max}")]
    BatchTooLarge { len: usize, max: usize },
    #[error("invalid header value for {0}")]
    InvalidHeader(&'static str),
}

/// The two API calls a sync pass makes.
#[async_trait]
pub trait DropsApi: Send + Sync {
    /// Campaigns visible on the authenticated user's drops dashboard.
    async fn list_drop_campaigns(&self) -> Result<CurrentUser, ClientError>;

    /// Detail lookups for at most [`MAX_DETAILS_BATCH`] campaigns in one request.
    async fn campaign_details(
        &self,
        channel_login: &str,
        campaign_ids: &[String],
    ) -> Result<Vec<DropCampaignDetails>, ClientError>;
}
