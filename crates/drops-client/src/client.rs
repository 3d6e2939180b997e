//! reqwest-backed [`DropsApi`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info_span, warn, Instrument};

use crate::gql::{self, PersistedOperation, DROP_CAMPAIGN_DETAILS, VIEWER_DROPS_DASHBOARD};
use crate::models::{CurrentUser, DashboardData, DetailsData, DropCampaignDetails, GqlResponse};
use crate::{ClientError, DropsApi, MAX_DETAILS_BATCH};

pub const DEFAULT_GQL_ENDPOINT: &str = "https://gql.twitch.tv/gql";

#[derive(Clone)]
pub struct GqlClientConfig {
    pub endpoint: String,
    pub oauth_token: String,
    pub client_id: String,
    /// `None` keeps reqwest's default (no overall timeout).
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

impl std::fmt::Debug for GqlClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GqlClientConfig")
            .field("endpoint", &self.endpoint)
            .field("oauth_token", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// `Authorization` header value for a configured token.
///
/// Tokens that already name a scheme (`OAuth abc`, `Bearer abc`) pass through;
/// a bare token gets the `OAuth` scheme the GraphQL endpoint expects.
pub fn authorization_value(token: &str) -> String {
    let token = token.trim();
    if token.contains(' ') {
        token.to_string()
    } else {
        format!("OAuth {token}")
    }
}

#[derive(Debug, Clone)]
pub struct GqlClient {
    http: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
}

impl GqlClient {
    pub fn new(config: GqlClientConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder().gzip(true).brotli(true);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&authorization_value(&config.oauth_token))
            .map_err(|_| ClientError::InvalidHeader("Authorization"))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            "Client-ID",
            HeaderValue::from_str(config.client_id.trim())
                .map_err(|_| ClientError::InvalidHeader("Client-ID"))?,
        );

        Ok(Self {
            http: builder.build()?,
            endpoint: config.endpoint,
            headers,
        })
    }

    /// POST a batched operation and decode the batched response.
    async fn post<B, T>(
        &self,
        op: PersistedOperation,
        body: &B,
    ) -> Result<Vec<GqlResponse<T>>, ClientError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let resp = self
            .http
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: Vec<GqlResponse<T>> = serde_json::from_str(&text)?;
        debug!(operation = op.name, items = parsed.len(), "gql response");
        Ok(parsed)
    }
}

#[async_trait]
impl DropsApi for GqlClient {
    async fn list_drop_campaigns(&self) -> Result<CurrentUser, ClientError> {
        let span = info_span!("gql", operation = VIEWER_DROPS_DASHBOARD.name);
        let responses: Vec<GqlResponse<DashboardData>> = self
            .post(VIEWER_DROPS_DASHBOARD, &gql::dashboard_request())
            .instrument(span)
            .await?;

        let response = responses
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::Graphql("empty batch response".into()))?;
        if !response.errors.is_empty() {
            warn!(errors = %response.error_summary(), "dashboard returned graphql errors");
        }
        let summary = response.error_summary();
        response
            .data
            .and_then(|d| d.current_user)
            .ok_or_else(|| {
                if summary.is_empty() {
                    ClientError::Graphql("response has no currentUser".into())
                } else {
                    ClientError::Graphql(summary)
                }
            })
    }

    async fn campaign_details(
        &self,
        channel_login: &str,
        campaign_ids: &[String],
    ) -> Result<Vec<DropCampaignDetails>, ClientError> {
        if campaign_ids.len() > MAX_DETAILS_BATCH {
            return Err(ClientError::BatchTooLarge {
                len: campaign_ids.len(),
                max: MAX_DETAILS_BATCH,
            });
        }
        if campaign_ids.is_empty() {
            return Ok(Vec::new());
        }

        let span = info_span!(
            "gql",
            operation = DROP_CAMPAIGN_DETAILS.name,
            batch = campaign_ids.len()
        );
        let body = gql::details_request(campaign_ids, channel_login);
        let responses: Vec<GqlResponse<DetailsData>> =
            self.post(DROP_CAMPAIGN_DETAILS, &body).instrument(span).await?;

        let mut out = Vec::with_capacity(responses.len());
        for (idx, response) in responses.into_iter().enumerate() {
            let requested = campaign_ids.get(idx).map(String::as_str).unwrap_or("?");
            let summary = response.error_summary();
            let Some(data) = response.data else {
                return Err(ClientError::Graphql(format!(
                    "details for {requested}: {summary}"
                )));
            };
            if !summary.is_empty() {
                warn!(
                    campaign_id = requested,
                    errors = %summary,
                    "details returned graphql errors"
                );
            }
            match data.user.and_then(|u| u.drop_campaign) {
                Some(details) => out.push(details),
                None => warn!(
                    campaign_id = requested,
                    "details response has no dropCampaign; skipping"
                ),
            }
        }
        Ok(out)
    }
}
