//! In-process store with the same insert-ignore and foreign-key rules as Postgres.
//!
//! A transaction works on a private copy of the state and swaps it in on
//! commit, so a dropped transaction leaves nothing behind.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use drops_core::{BenefitPrerequisite, CampaignStatus, DropBenefit, DropCampaign, Game};

use crate::{check_id, DropStore, StoreError, StoreResult, StoreTx, StoredCampaign};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryState {
    pub schema_ready: bool,
    pub games: BTreeMap<i32, Game>,
    pub campaigns: BTreeMap<String, DropCampaign>,
    pub benefits: BTreeMap<String, DropBenefit>,
    pub prerequisites: BTreeSet<BenefitPrerequisite>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    failing_benefits: Arc<Mutex<HashSet<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make any write of the benefit with this id fail.
    pub fn fail_on_benefit(&self, id: impl Into<String>) {
        if let Ok(mut set) = self.failing_benefits.lock() {
            set.insert(id.into());
        }
    }

    /// Committed state.
    pub fn snapshot(&self) -> StoreResult<MemoryState> {
        let state = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;
        Ok(state.clone())
    }
}

#[async_trait]
impl DropStore for MemoryStore {
    async fn ensure_schema(&self) -> StoreResult<()> {
        let mut state = self.state.lock().map_err(|_| StoreError::LockPoisoned)?;
        state.schema_ready = true;
        Ok(())
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let working = self.snapshot()?;
        let failing = self
            .failing_benefits
            .lock()
            .map_err(|_| StoreError::LockPoisoned)?
            .clone();
        Ok(Box::new(MemoryTx {
            working,
            target: Arc::clone(&self.state),
            failing_benefits: failing,
            finished: false,
        }))
    }
}

pub struct MemoryTx {
    working: MemoryState,
    target: Arc<Mutex<MemoryState>>,
    failing_benefits: HashSet<String>,
    finished: bool,
}

impl MemoryTx {
    fn state(&mut self) -> StoreResult<&mut MemoryState> {
        if self.finished {
            return Err(StoreError::Finished);
        }
        Ok(&mut self.working)
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn upsert_game(&mut self, game: &Game) -> StoreResult<bool> {
        let state = self.state()?;
        if state.games.contains_key(&game.id) {
            return Ok(false);
        }
        state.games.insert(game.id, game.clone());
        Ok(true)
    }

    async fn campaign_exists(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.state()?.campaigns.contains_key(id))
    }

    async fn campaigns_with_different_status(
        &mut self,
        id: &str,
        status: &CampaignStatus,
    ) -> StoreResult<Vec<StoredCampaign>> {
        Ok(self
            .state()?
            .campaigns
            .get(id)
            .filter(|c| c.status.as_str() != status.as_str())
            .map(|c| StoredCampaign {
                id: c.id.clone(),
                name: c.name.clone(),
                started: c.start_at,
                status: c.status.clone(),
            })
            .into_iter()
            .collect())
    }

    async fn upsert_campaign(&mut self, campaign: &DropCampaign) -> StoreResult<bool> {
        check_id("drops.id", &campaign.id)?;
        let state = self.state()?;
        if state.campaigns.contains_key(&campaign.id) {
            return Ok(false);
        }
        if !state.games.contains_key(&campaign.game_id) {
            return Err(StoreError::Constraint(format!(
                "drops.game_id {} has no games row",
                campaign.game_id
            )));
        }
        state.campaigns.insert(campaign.id.clone(), campaign.clone());
        Ok(true)
    }

    async fn update_campaign_status(
        &mut self,
        id: &str,
        status: &CampaignStatus,
    ) -> StoreResult<()> {
        if let Some(campaign) = self.state()?.campaigns.get_mut(id) {
            campaign.status = status.clone();
        }
        Ok(())
    }

    async fn upsert_benefit(&mut self, benefit: &DropBenefit) -> StoreResult<bool> {
        if self.failing_benefits.contains(&benefit.id) {
            return Err(StoreError::Injected(format!("benefit {}", benefit.id)));
        }
        check_id("dropbenefits.id", &benefit.id)?;
        check_id("dropbenefits.drop_id", &benefit.drop_campaign_id)?;
        let state = self.state()?;
        if state.benefits.contains_key(&benefit.id) {
            return Ok(false);
        }
        if !state.campaigns.contains_key(&benefit.drop_campaign_id) {
            return Err(StoreError::Constraint(format!(
                "dropbenefits.drop_id {} has no drops row",
                benefit.drop_campaign_id
            )));
        }
        state.benefits.insert(benefit.id.clone(), benefit.clone());
        Ok(true)
    }

    async fn benefit_exists(&mut self, id: &str) -> StoreResult<bool> {
        Ok(self.state()?.benefits.contains_key(id))
    }

    async fn upsert_prerequisite(&mut self, edge: &BenefitPrerequisite) -> StoreResult<bool> {
        let state = self.state()?;
        for id in [&edge.benefit_id, &edge.prerequisite_benefit_id] {
            if !state.benefits.contains_key(id) {
                return Err(StoreError::Constraint(format!(
                    "dropbenefitprereqs references missing benefit {id}"
                )));
            }
        }
        Ok(state.prerequisites.insert(edge.clone()))
    }

    async fn commit(&mut self) -> StoreResult<()> {
        if self.finished {
            return Err(StoreError::Finished);
        }
        let mut target = self.target.lock().map_err(|_| StoreError::LockPoisoned)?;
        *target = std::mem::take(&mut self.working);
        self.finished = true;
        Ok(())
    }
}
