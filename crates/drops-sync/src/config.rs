//! Environment-driven configuration.

use std::time::Duration;

use drops_client::{GqlClientConfig, DEFAULT_GQL_ENDPOINT};
use drops_store::{PgSettings, PgTarget};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {name}")]
    Invalid { name: &'static str, value: String },
}

/// Where the relational store lives.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// Overrides the discrete settings when present.
    pub url: Option<String>,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| non_empty(&lookup, name);
        let port = match get("POSTGRES_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "POSTGRES_PORT",
                value: raw.clone(),
            })?,
            None => 5432,
        };

        Ok(Self {
            host: get("POSTGRES_HOST").unwrap_or_else(|| "postgres".to_string()),
            port,
            user: get("POSTGRES_USER").unwrap_or_else(|| "postgres".to_string()),
            password: get("POSTGRES_PASSWORD").unwrap_or_else(|| "postgres".to_string()),
            database: get("POSTGRES_DB").unwrap_or_else(|| "twitchdrops".to_string()),
            url: get("DATABASE_URL"),
        })
    }

    pub fn target(&self) -> PgTarget {
        match &self.url {
            Some(url) => PgTarget::Url(url.clone()),
            None => PgTarget::Settings(PgSettings {
                host: self.host.clone(),
                port: self.port,
                username: self.user.clone(),
                password: self.password.clone(),
                database: self.database.clone(),
            }),
        }
    }
}

#[derive(Clone)]
pub struct SyncConfig {
    pub database: DatabaseConfig,
    pub oauth_token: String,
    pub client_id: String,
    /// Only needed once there are campaigns to look up.
    pub channel_login: Option<String>,
    pub gql_endpoint: String,
    pub http_timeout: Option<Duration>,
    /// `None` keeps reqwest's default.
    pub user_agent: Option<String>,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("database", &self.database)
            .field("oauth_token", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("channel_login", &self.channel_login)
            .field("gql_endpoint", &self.gql_endpoint)
            .field("http_timeout", &self.http_timeout)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| non_empty(&lookup, name);
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let http_timeout = match get("DROPS_HTTP_TIMEOUT_SECS") {
            Some(raw) => Some(Duration::from_secs(raw.trim().parse().map_err(|_| {
                ConfigError::Invalid {
                    name: "DROPS_HTTP_TIMEOUT_SECS",
                    value: raw.clone(),
                }
            })?)),
            None => None,
        };

        Ok(Self {
            database: DatabaseConfig::from_lookup(&lookup)?,
            oauth_token: require("OAUTH_TOKEN")?,
            client_id: require("CLIENT_ID")?,
            channel_login: get("CHANNEL_LOGIN").map(|v| v.trim().to_string()),
            gql_endpoint: get("GQL_ENDPOINT").unwrap_or_else(|| DEFAULT_GQL_ENDPOINT.to_string()),
            http_timeout,
            user_agent: get("DROPS_USER_AGENT").map(|v| v.trim().to_string()),
        })
    }

    pub fn client_config(&self) -> GqlClientConfig {
        GqlClientConfig {
            endpoint: self.gql_endpoint.clone(),
            oauth_token: self.oauth_token.clone(),
            client_id: self.client_id.clone(),
            timeout: self.http_timeout,
            user_agent: self.user_agent.clone(),
        }
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.trim().is_empty())
}
