//! Two-phase reconciliation of drop campaigns into the relational store.
//!
//! Phase A writes games and campaigns and detects new campaigns and status
//! changes. Phase B looks up details for every non-expired campaign and writes
//! benefits and prerequisite edges. Each phase is one transaction, so a failure
//! rolls back only the phase it happened in.

pub mod config;
pub mod derive;

#[cfg(test)]
mod tests;

use std::fmt;

use anyhow::Context;
use chrono::{DateTime, Utc};
use drops_client::{CampaignListing, ClientError, DropsApi, GqlClient, MAX_DETAILS_BATCH};
use drops_core::{id_fits, BenefitPrerequisite, CampaignStatus, MAX_ID_LEN};
use drops_store::{DropStore, PgStore, StoreError, StoreResult, StoreTx};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub use config::{ConfigError, DatabaseConfig, SyncConfig};
pub use derive::{derive_details, DerivedDetails};

pub const CRATE_NAME: &str = "drops-sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Schema,
    Campaigns,
    Benefits,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Schema => "schema",
            Self::Campaigns => "campaigns",
            Self::Benefits => "benefits",
        })
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("{phase} phase rolled back: {source}")]
    Store {
        phase: Phase,
        #[source]
        source: StoreError,
    },
}

fn in_phase(phase: Phase) -> impl Fn(StoreError) -> SyncError {
    move |source| SyncError::Store { phase, source }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CampaignEvent {
    New {
        id: String,
        name: String,
        game: String,
        status: CampaignStatus,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    },
    StatusChanged {
        id: String,
        name: String,
        started: DateTime<Utc>,
        previous: CampaignStatus,
        current: CampaignStatus,
    },
}

pub trait CampaignNotifier: Send + Sync {
    fn notify(&self, event: &CampaignEvent);
}

/// Reports campaign events as structured log lines.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl CampaignNotifier for LogNotifier {
    fn notify(&self, event: &CampaignEvent) {
        match event {
            CampaignEvent::New {
                id,
                name,
                game,
                status,
                start_at,
                end_at,
            } => info!(
                campaign_id = %id,
                campaign = %name,
                game = %game,
                %status,
                start_at = %start_at,
                end_at = %end_at,
                "new drop campaign"
            ),
            CampaignEvent::StatusChanged {
                id,
                name,
                started,
                previous,
                current,
            } => info!(
                campaign_id = %id,
                campaign = %name,
                started = %started,
                %previous,
                %current,
                "drop campaign status changed"
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub campaigns_seen: usize,
    pub campaigns_skipped: usize,
    pub new_campaigns: usize,
    pub status_changes: usize,
    pub active_campaigns: usize,
    pub detail_batches: usize,
    pub benefits_inserted: usize,
    pub benefits_skipped: usize,
    pub prerequisites_inserted: usize,
    pub prerequisites_skipped: usize,
}

impl SyncSummary {
    fn start() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            campaigns_seen: 0,
            campaigns_skipped: 0,
            new_campaigns: 0,
            status_changes: 0,
            active_campaigns: 0,
            detail_batches: 0,
            benefits_inserted: 0,
            benefits_skipped: 0,
            prerequisites_inserted: 0,
            prerequisites_skipped: 0,
        }
    }
}

pub struct Reconciler<A, S> {
    api: A,
    store: S,
    channel_login: Option<String>,
    notifier: Box<dyn CampaignNotifier>,
}

impl<A: DropsApi, S: DropStore> Reconciler<A, S> {
    pub fn new(api: A, store: S, channel_login: Option<String>) -> Self {
        Self {
            api,
            store,
            channel_login,
            notifier: Box::<LogNotifier>::default(),
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn CampaignNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Ensure the schema, then run Phase A and Phase B once.
    pub async fn run_once(&self) -> Result<SyncSummary, SyncError> {
        let mut summary = SyncSummary::start();
        let span = info_span!("sync", run_id = %summary.run_id);
        self.run_phases(&mut summary).instrument(span).await?;
        summary.finished_at = Utc::now();
        info!(
            run_id = %summary.run_id,
            new_campaigns = summary.new_campaigns,
            status_changes = summary.status_changes,
            benefits_inserted = summary.benefits_inserted,
            prerequisites_inserted = summary.prerequisites_inserted,
            "sync complete"
        );
        Ok(summary)
    }

    async fn run_phases(&self, summary: &mut SyncSummary) -> Result<(), SyncError> {
        self.store
            .ensure_schema()
            .await
            .map_err(in_phase(Phase::Schema))?;

        let user = self.api.list_drop_campaigns().await?;
        info!(
            login = %user.login,
            campaigns = user.drop_campaigns.len(),
            "fetched drops dashboard"
        );

        let active = self.sync_campaigns(&user.drop_campaigns, summary).await?;
        self.sync_benefits(&active, summary).await
    }

    /// Phase A. Returns the ids of non-expired campaigns in listing order.
    async fn sync_campaigns(
        &self,
        listings: &[CampaignListing],
        summary: &mut SyncSummary,
    ) -> Result<Vec<String>, SyncError> {
        let fail = in_phase(Phase::Campaigns);
        let mut tx = self.store.begin().await.map_err(&fail)?;
        let mut active = Vec::new();

        for listing in listings {
            let campaign = listing.to_campaign();
            summary.campaigns_seen += 1;

            if !id_fits(&campaign.id) {
                summary.campaigns_skipped += 1;
                warn!(
                    campaign_id = %campaign.id,
                    max = MAX_ID_LEN,
                    "campaign id too long for the store; skipping"
                );
                continue;
            }

            tx.upsert_game(&listing.game.to_game()).await.map_err(&fail)?;

            if !campaign.status.is_expired() {
                active.push(campaign.id.clone());
            }

            if !tx.campaign_exists(&campaign.id).await.map_err(&fail)? {
                summary.new_campaigns += 1;
                self.notifier.notify(&CampaignEvent::New {
                    id: campaign.id.clone(),
                    name: campaign.name.clone(),
                    game: listing.game.display_name.clone(),
                    status: campaign.status.clone(),
                    start_at: campaign.start_at,
                    end_at: campaign.end_at,
                });
            } else {
                let drifted = tx
                    .campaigns_with_different_status(&campaign.id, &campaign.status)
                    .await
                    .map_err(&fail)?;
                for stored in drifted {
                    summary.status_changes += 1;
                    self.notifier.notify(&CampaignEvent::StatusChanged {
                        id: stored.id,
                        name: stored.name,
                        started: stored.started,
                        previous: stored.status,
                        current: campaign.status.clone(),
                    });
                    tx.update_campaign_status(&campaign.id, &campaign.status)
                        .await
                        .map_err(&fail)?;
                }
            }

            tx.upsert_campaign(&campaign).await.map_err(&fail)?;
        }

        tx.commit().await.map_err(&fail)?;
        summary.active_campaigns = active.len();
        info!(
            campaigns = listings.len(),
            active = active.len(),
            "campaign phase committed"
        );
        Ok(active)
    }

    /// Phase B over the active worklist, in batches of at most [`MAX_DETAILS_BATCH`].
    async fn sync_benefits(
        &self,
        active: &[String],
        summary: &mut SyncSummary,
    ) -> Result<(), SyncError> {
        if active.is_empty() {
            debug!("no active campaigns; skipping benefit phase");
            return Ok(());
        }
        let channel_login = self
            .channel_login
            .as_deref()
            .ok_or(ConfigError::Missing("CHANNEL_LOGIN"))?;

        let fail = in_phase(Phase::Benefits);
        let mut tx = self.store.begin().await.map_err(&fail)?;
        // Edges whose endpoints may still arrive in a later details object.
        let mut pending = Vec::new();

        for chunk in active.chunks(MAX_DETAILS_BATCH) {
            let details = self.api.campaign_details(channel_login, chunk).await?;
            summary.detail_batches += 1;
            debug!(
                requested = chunk.len(),
                returned = details.len(),
                "details batch"
            );

            for campaign in &details {
                let derived = derive_details(campaign);
                for drop_id in &derived.drops_without_benefit {
                    warn!(
                        campaign_id = %campaign.campaign_id,
                        drop_id = %drop_id,
                        "drop has no benefit edge; skipping"
                    );
                }
                for drop_id in &derived.overlong_ids {
                    summary.benefits_skipped += 1;
                    warn!(
                        campaign_id = %campaign.campaign_id,
                        drop_id = %drop_id,
                        max = MAX_ID_LEN,
                        "drop id too long for the store; skipping"
                    );
                }

                for benefit in &derived.benefits {
                    if tx.upsert_benefit(benefit).await.map_err(&fail)? {
                        summary.benefits_inserted += 1;
                    }
                }

                for edge in derived.prerequisites {
                    match link_prerequisite(tx.as_mut(), &edge).await.map_err(&fail)? {
                        Some(inserted) => summary.prerequisites_inserted += usize::from(inserted),
                        None => pending.push(edge),
                    }
                }
            }
        }

        for edge in &pending {
            match link_prerequisite(tx.as_mut(), edge).await.map_err(&fail)? {
                Some(inserted) => summary.prerequisites_inserted += usize::from(inserted),
                None => {
                    summary.prerequisites_skipped += 1;
                    warn!(
                        benefit_id = %edge.benefit_id,
                        prerequisite_id = %edge.prerequisite_benefit_id,
                        "prerequisite references an unknown benefit; skipping"
                    );
                }
            }
        }

        tx.commit().await.map_err(&fail)?;
        info!(
            batches = summary.detail_batches,
            benefits = summary.benefits_inserted,
            prerequisites = summary.prerequisites_inserted,
            "benefit phase committed"
        );
        Ok(())
    }
}

/// Write `edge` if both of its benefits are stored. `None` means an endpoint
/// is missing; otherwise the flag tells whether a new row was written.
async fn link_prerequisite(
    tx: &mut dyn StoreTx,
    edge: &BenefitPrerequisite,
) -> StoreResult<Option<bool>> {
    if !tx.benefit_exists(&edge.benefit_id).await?
        || !tx.benefit_exists(&edge.prerequisite_benefit_id).await?
    {
        return Ok(None);
    }
    tx.upsert_prerequisite(edge).await.map(Some)
}

/// Build a Postgres-backed reconciler from the environment and run it once.
pub async fn run_sync_once_from_env() -> anyhow::Result<SyncSummary> {
    let config = SyncConfig::from_env()?;
    debug!(?config, "loaded configuration");
    let store = PgStore::connect(&config.database.target())
        .await
        .context("connecting to postgres")?;
    let api = GqlClient::new(config.client_config()).context("building gql client")?;
    let reconciler = Reconciler::new(api, store, config.channel_login.clone());
    Ok(reconciler.run_once().await?)
}

pub async fn ensure_schema_from_env() -> anyhow::Result<()> {
    let database = DatabaseConfig::from_env()?;
    let store = PgStore::connect(&database.target())
        .await
        .context("connecting to postgres")?;
    store.ensure_schema().await.context("ensuring schema")?;
    Ok(())
}
