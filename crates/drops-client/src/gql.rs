//! Persisted-query request bodies.
//!
//! The endpoint accepts a JSON array of operations and answers with an array
//! of the same length and order.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistedOperation {
    pub name: &'static str,
    pub sha256_hash: &'static str,
}

pub const VIEWER_DROPS_DASHBOARD: PersistedOperation = PersistedOperation {
    name: "ViewerDropsDashboard",
    sha256_hash: "c4d61d7b71d03b324914d3cf8ca0bc23fe25dacf54120cc954321b9704a3f4e2",
};

pub const DROP_CAMPAIGN_DETAILS: PersistedOperation = PersistedOperation {
    name: "DropCampaignDetails",
    sha256_hash: "f6396f5ffdde867a8f6f6da18286e4baf02e5b98d14689a69b5af320a4c7b7b8",
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GqlRequest<V> {
    pub operation_name: &'static str,
    pub variables: V,
    pub extensions: Extensions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extensions {
    pub persisted_query: PersistedQuery,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedQuery {
    pub version: u8,
    pub sha256_hash: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NoVariables {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailsVariables {
    #[serde(rename = "dropID")]
    pub drop_id: String,
    pub channel_login: String,
}

impl<V> GqlRequest<V> {
    pub fn new(op: PersistedOperation, variables: V) -> Self {
        Self {
            operation_name: op.name,
            variables,
            extensions: Extensions {
                persisted_query: PersistedQuery {
                    version: 1,
                    sha256_hash: op.sha256_hash,
                },
            },
        }
    }
}

pub fn dashboard_request() -> Vec<GqlRequest<NoVariables>> {
    vec![GqlRequest::new(VIEWER_DROPS_DASHBOARD, NoVariables::default())]
}

/// One operation per campaign id, in input order.
pub fn details_request(
    campaign_ids: &[String],
    channel_login: &str,
) -> Vec<GqlRequest<DetailsVariables>> {
    campaign_ids
        .iter()
        .map(|id| {
            GqlRequest::new(
                DROP_CAMPAIGN_DETAILS,
                DetailsVariables {
                    drop_id: id.clone(),
                    channel_login: channel_login.to_string(),
                },
            )
        })
        .collect()
}
