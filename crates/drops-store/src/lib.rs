//! Relational persistence for games, campaigns, benefits and prerequisite edges.
//!
//! Every write is an insert-ignore keyed on the entity's identity, so replaying
//! the same data is a no-op. The only mutation of an existing row is
//! [`StoreTx::update_campaign_status`].

pub mod memory;
pub mod pg;
pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drops_core::{
    id_fits, BenefitPrerequisite, CampaignStatus, DropBenefit, DropCampaign, Game, MAX_ID_LEN,
};
use thiserror::Error;

pub use memory::{MemoryState, MemoryStore};
pub use pg::{PgSettings, PgStore, PgTarget};
pub use schema::{ColumnDef, ForeignKey, Schema, TableDef};

pub const CRATE_NAME: &str = "drops-store";

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("transaction already finished")]
    Finished,
    #[error("store lock poisoned")]
    LockPoisoned,
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Rejects ids wider than the `VARCHAR` id columns before they reach a backend.
pub(crate) fn check_id(column: &str, id: &str) -> StoreResult<()> {
    if id_fits(id) {
        Ok(())
    } else {
        Err(StoreError::Constraint(format!(
            "{column} value {id:?} is longer than {MAX_ID_LEN} characters"
        )))
    }
}

/// Campaign row as currently persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCampaign {
    pub id: String,
    pub name: String,
    pub started: DateTime<Utc>,
    pub status: CampaignStatus,
}

/// One unit of work. Dropping it without [`StoreTx::commit`] rolls back.
///
/// `upsert_*` methods return `true` when a new row was written and `false`
/// when the identity already existed.
#[async_trait]
pub trait StoreTx: Send {
    async fn upsert_game(&mut self, game: &Game) -> StoreResult<bool>;

    async fn campaign_exists(&mut self, id: &str) -> StoreResult<bool>;

    /// Rows for `id` whose stored status differs from `status`.
    async fn campaigns_with_different_status(
        &mut self,
        id: &str,
        status: &CampaignStatus,
    ) -> StoreResult<Vec<StoredCampaign>>;

    async fn upsert_campaign(&mut self, campaign: &DropCampaign) -> StoreResult<bool>;

    async fn update_campaign_status(&mut self, id: &str, status: &CampaignStatus)
        -> StoreResult<()>;

    async fn upsert_benefit(&mut self, benefit: &DropBenefit) -> StoreResult<bool>;

    async fn benefit_exists(&mut self, id: &str) -> StoreResult<bool>;

    async fn upsert_prerequisite(&mut self, edge: &BenefitPrerequisite) -> StoreResult<bool>;

    async fn commit(&mut self) -> StoreResult<()>;
}

#[async_trait]
pub trait DropStore: Send + Sync {
    /// Create missing tables and columns. Never drops or rewrites anything.
    async fn ensure_schema(&self) -> StoreResult<()>;

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}
