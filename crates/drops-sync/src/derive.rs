//! Benefit and prerequisite rows derived from one campaign's details.

use std::collections::HashSet;

use drops_client::{DropCampaignDetails, PreconditionDrop};
use drops_core::{id_fits, BenefitPrerequisite, DropBenefit};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedDetails {
    pub benefits: Vec<DropBenefit>,
    /// Edges in discovery order, without duplicates or self-loops.
    pub prerequisites: Vec<BenefitPrerequisite>,
    /// Entry ids that carried no benefit edge.
    pub drops_without_benefit: Vec<String>,
    /// Entry ids too long for the store.
    pub overlong_ids: Vec<String>,
}

/// Only the first benefit edge of each entry becomes a benefit row.
pub fn derive_details(details: &DropCampaignDetails) -> DerivedDetails {
    let mut out = DerivedDetails::default();
    let mut seen = HashSet::new();

    for drop in &details.time_based_drops {
        if !id_fits(&drop.id) {
            out.overlong_ids.push(drop.id.clone());
            continue;
        }
        match drop.benefit_edges.first() {
            Some(edge) => out.benefits.push(DropBenefit {
                id: drop.id.clone(),
                name: edge.benefit.name.clone(),
                drop_campaign_id: details.campaign_id.clone(),
                required_minutes_watched: drop.required_minutes_watched,
                entitlement_limit: edge.entitlement_limit,
                benefit_art_url: edge.benefit.image_asset_url.clone(),
            }),
            None => out.drops_without_benefit.push(drop.id.clone()),
        }
        collect_edges(
            &drop.id,
            drop.precondition_drops.as_deref(),
            &mut seen,
            &mut out.prerequisites,
        );
    }

    out
}

fn collect_edges(
    owner: &str,
    preconditions: Option<&[PreconditionDrop]>,
    seen: &mut HashSet<BenefitPrerequisite>,
    edges: &mut Vec<BenefitPrerequisite>,
) {
    for pre in preconditions.unwrap_or_default() {
        if pre.id != owner {
            let edge = BenefitPrerequisite::new(owner, &pre.id);
            if seen.insert(edge.clone()) {
                edges.push(edge);
            }
        }
        collect_edges(&pre.id, pre.precondition_drops.as_deref(), seen, edges);
    }
}
