//! PostgreSQL-backed store.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use drops_core::{BenefitPrerequisite, CampaignStatus, DropBenefit, DropCampaign, Game};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{debug, info, instrument};

use crate::schema::Schema;
use crate::{check_id, DropStore, StoreError, StoreResult, StoreTx, StoredCampaign};

/// Discrete connection settings, used when no DSN is configured.
#[derive(Clone, PartialEq, Eq)]
pub struct PgSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl std::fmt::Debug for PgSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum PgTarget {
    Url(String),
    Settings(PgSettings),
}

impl std::fmt::Debug for PgTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(_) => f.write_str("Url(<redacted>)"),
            Self::Settings(settings) => f.debug_tuple("Settings").field(settings).finish(),
        }
    }
}

impl PgTarget {
    pub fn connect_options(&self) -> StoreResult<PgConnectOptions> {
        match self {
            Self::Url(url) => Ok(PgConnectOptions::from_str(url)?),
            Self::Settings(s) => Ok(PgConnectOptions::new()
                .host(&s.host)
                .port(s.port)
                .username(&s.username)
                .password(&s.password)
                .database(&s.database)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    schema: Schema,
}

impl PgStore {
    #[instrument(skip_all)]
    pub async fn connect(target: &PgTarget) -> StoreResult<Self> {
        let options = target.connect_options()?;
        // One phase holds one transaction at a time.
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        info!("connected to postgres");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema: Schema::drops(),
        }
    }
}

#[async_trait]
impl DropStore for PgStore {
    async fn ensure_schema(&self) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for stmt in self.schema.statements() {
            debug!(%stmt, "ensure schema");
            sqlx::query(&stmt).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!(tables = self.schema.tables.len(), "schema ensured");
        Ok(())
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx: Some(tx) }))
    }
}

pub struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    fn conn(&mut self) -> StoreResult<&mut PgConnection> {
        self.tx.as_deref_mut().ok_or(StoreError::Finished)
    }
}

fn utc(naive: NaiveDateTime) -> chrono::DateTime<Utc> {
    Utc.from_utc_datetime(&naive)
}

#[async_trait]
impl StoreTx for PgTx {
    async fn upsert_game(&mut self, game: &Game) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO games (id, name, box_art_url)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(game.id)
        .bind(&game.display_name)
        .bind(game.box_art_url.as_deref())
        .execute(self.conn()?)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn campaign_exists(&mut self, id: &str) -> StoreResult<bool> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM drops WHERE id = $1)")
                .bind(id)
                .fetch_one(self.conn()?)
                .await?;
        Ok(exists)
    }

    async fn campaigns_with_different_status(
        &mut self,
        id: &str,
        status: &CampaignStatus,
    ) -> StoreResult<Vec<StoredCampaign>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, started, status
              FROM drops
             WHERE id = $1
               AND status <> $2
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_all(self.conn()?)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let started: NaiveDateTime = row.try_get("started")?;
            let status: String = row.try_get("status")?;
            out.push(StoredCampaign {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                started: utc(started),
                status: CampaignStatus::from(status),
            });
        }
        Ok(out)
    }

    async fn upsert_campaign(&mut self, campaign: &DropCampaign) -> StoreResult<bool> {
        check_id("drops.id", &campaign.id)?;
        let result = sqlx::query(
            r#"
            INSERT INTO drops (id, name, game_id, started, ended, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&campaign.id)
        .bind(&campaign.name)
        .bind(campaign.game_id)
        .bind(campaign.start_at.naive_utc())
        .bind(campaign.end_at.naive_utc())
        .bind(campaign.status.as_str())
        .execute(self.conn()?)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_campaign_status(
        &mut self,
        id: &str,
        status: &CampaignStatus,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE drops SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(self.conn()?)
            .await?;
        Ok(())
    }

    async fn upsert_benefit(&mut self, benefit: &DropBenefit) -> StoreResult<bool> {
        check_id("dropbenefits.id", &benefit.id)?;
        check_id("dropbenefits.drop_id", &benefit.drop_campaign_id)?;
        let result = sqlx::query(
            r#"
            INSERT INTO dropbenefits
                (id, name, drop_id, required_minutes_watched, entitlement_limit, benefit_art_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&benefit.id)
        .bind(&benefit.name)
        .bind(&benefit.drop_campaign_id)
        .bind(benefit.required_minutes_watched)
        .bind(benefit.entitlement_limit)
        .bind(benefit.benefit_art_url.as_deref())
        .execute(self.conn()?)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn benefit_exists(&mut self, id: &str) -> StoreResult<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM dropbenefits WHERE id = $1)",
        )
        .bind(id)
        .fetch_one(self.conn()?)
        .await?;
        Ok(exists)
    }

    async fn upsert_prerequisite(&mut self, edge: &BenefitPrerequisite) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO dropbenefitprereqs (benefit_id, pre_req_benefit_id)
            VALUES ($1, $2)
            ON CONFLICT (benefit_id, pre_req_benefit_id) DO NOTHING
            "#,
        )
        .bind(&edge.benefit_id)
        .bind(&edge.prerequisite_benefit_id)
        .execute(self.conn()?)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self.tx.take().ok_or(StoreError::Finished)?;
        tx.commit().await?;
        Ok(())
    }
}
