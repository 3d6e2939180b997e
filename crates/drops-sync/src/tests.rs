use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::TimeZone;
use drops_client::{
    Benefit, BenefitEdge, CurrentUser, DropCampaignDetails, GameRef, PreconditionDrop,
    TimeBasedDrop,
};
use drops_core::BenefitPrerequisite;
use drops_store::{MemoryState, MemoryStore};

use super::*;

#[derive(Clone, Default)]
struct FakeApi {
    campaigns: Vec<CampaignListing>,
    details: HashMap<String, DropCampaignDetails>,
    fail_listing: bool,
    fail_details: bool,
    batches: Arc<Mutex<Vec<Vec<String>>>>,
}

impl FakeApi {
    fn with_campaigns(campaigns: Vec<CampaignListing>) -> Self {
        Self {
            campaigns,
            ..Default::default()
        }
    }

    fn with_details(mut self, details: DropCampaignDetails) -> Self {
        self.details.insert(details.campaign_id.clone(), details);
        self
    }

    fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl DropsApi for FakeApi {
    async fn list_drop_campaigns(&self) -> Result<CurrentUser, ClientError> {
        if self.fail_listing {
            return Err(ClientError::Status {
                status: 401,
                body: "unauthorized".into(),
            });
        }
        Ok(CurrentUser {
            login: "viewer".into(),
            drop_campaigns: self.campaigns.clone(),
        })
    }

    async fn campaign_details(
        &self,
        _channel_login: &str,
        campaign_ids: &[String],
    ) -> Result<Vec<DropCampaignDetails>, ClientError> {
        if self.fail_details {
            return Err(ClientError::Graphql("service timeout".into()));
        }
        assert!(campaign_ids.len() <= MAX_DETAILS_BATCH);
        self.batches.lock().unwrap().push(campaign_ids.to_vec());
        Ok(campaign_ids
            .iter()
            .map(|id| {
                self.details.get(id).cloned().unwrap_or(DropCampaignDetails {
                    campaign_id: id.clone(),
                    time_based_drops: Vec::new(),
                })
            })
            .collect())
    }
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    events: Arc<Mutex<Vec<CampaignEvent>>>,
}

impl RecordingNotifier {
    fn take(&self) -> Vec<CampaignEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl CampaignNotifier for RecordingNotifier {
    fn notify(&self, event: &CampaignEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn listing(id: &str, status: &str) -> CampaignListing {
    CampaignListing {
        id: id.to_string(),
        name: format!("Campaign {id}"),
        game: GameRef {
            id: 509658,
            display_name: "Just Chatting".into(),
            box_art_url: Some("https://img/box.jpg".into()),
        },
        status: CampaignStatus::from(status),
        start_at: Utc.with_ymd_and_hms(2026, 3, 1, 17, 0, 0).unwrap(),
        end_at: Utc.with_ymd_and_hms(2026, 3, 8, 17, 0, 0).unwrap(),
    }
}

fn edge(name: &str, limit: i32) -> BenefitEdge {
    BenefitEdge {
        benefit: Benefit {
            id: format!("b-{name}"),
            name: name.to_string(),
            image_asset_url: Some(format!("https://img/{name}.png")),
        },
        entitlement_limit: limit,
    }
}

fn entry(id: &str, preconditions: &[&str], edges: Vec<BenefitEdge>) -> TimeBasedDrop {
    TimeBasedDrop {
        id: id.to_string(),
        name: id.to_string(),
        required_minutes_watched: 60,
        precondition_drops: (!preconditions.is_empty())
            .then(|| preconditions.iter().map(|p| PreconditionDrop::new(*p)).collect()),
        benefit_edges: edges,
    }
}

fn details(campaign_id: &str, drops: Vec<TimeBasedDrop>) -> DropCampaignDetails {
    DropCampaignDetails {
        campaign_id: campaign_id.to_string(),
        time_based_drops: drops,
    }
}

/// One active campaign with a three-step reward chain.
fn chained_campaign() -> FakeApi {
    FakeApi::with_campaigns(vec![listing("c1", "ACTIVE")]).with_details(details(
        "c1",
        vec![
            entry("p1", &[], vec![edge("Badge", 1)]),
            entry("p2", &[], vec![edge("Emote", 1)]),
            entry("d3", &["p1", "p2"], vec![edge("Skin", 1)]),
        ],
    ))
}

fn reconciler(
    api: &FakeApi,
    store: &MemoryStore,
    notifier: &RecordingNotifier,
) -> Reconciler<FakeApi, MemoryStore> {
    Reconciler::new(api.clone(), store.clone(), Some("somechannel".into()))
        .with_notifier(Box::new(notifier.clone()))
}

fn state(store: &MemoryStore) -> MemoryState {
    store.snapshot().unwrap()
}

#[tokio::test]
async fn second_run_over_same_data_changes_nothing() {
    let api = chained_campaign();
    let store = MemoryStore::new();
    let notifier = RecordingNotifier::default();
    let sync = reconciler(&api, &store, &notifier);

    let first = sync.run_once().await.unwrap();
    assert_eq!(first.new_campaigns, 1);
    assert_eq!(first.benefits_inserted, 3);
    assert_eq!(first.prerequisites_inserted, 2);
    let after_first = state(&store);
    notifier.take();

    let second = sync.run_once().await.unwrap();
    assert_eq!(state(&store), after_first);
    assert!(notifier.take().is_empty());
    assert_eq!(second.new_campaigns, 0);
    assert_eq!(second.status_changes, 0);
    assert_eq!(second.benefits_inserted, 0);
    assert_eq!(second.prerequisites_inserted, 0);
}

#[tokio::test]
async fn unseen_campaign_notifies_exactly_once() {
    let api = FakeApi::with_campaigns(vec![listing("c1", "UPCOMING")]);
    let store = MemoryStore::new();
    let notifier = RecordingNotifier::default();

    reconciler(&api, &store, &notifier).run_once().await.unwrap();

    let events = notifier.take();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        CampaignEvent::New { id, game, status: CampaignStatus::Upcoming, .. }
            if id == "c1" && game == "Just Chatting"
    ));
    let snapshot = state(&store);
    assert!(snapshot.schema_ready);
    assert_eq!(snapshot.games[&509658].display_name, "Just Chatting");
    assert_eq!(snapshot.campaigns["c1"].status, CampaignStatus::Upcoming);
}

#[tokio::test]
async fn status_drift_notifies_once_and_updates_the_row() {
    let store = MemoryStore::new();
    let notifier = RecordingNotifier::default();
    let upcoming = FakeApi::with_campaigns(vec![listing("c1", "UPCOMING")]);
    reconciler(&upcoming, &store, &notifier).run_once().await.unwrap();
    notifier.take();

    let active = FakeApi::with_campaigns(vec![listing("c1", "ACTIVE")]);
    let summary = reconciler(&active, &store, &notifier).run_once().await.unwrap();

    assert_eq!(summary.status_changes, 1);
    assert_eq!(
        notifier.take(),
        vec![CampaignEvent::StatusChanged {
            id: "c1".into(),
            name: "Campaign c1".into(),
            started: Utc.with_ymd_and_hms(2026, 3, 1, 17, 0, 0).unwrap(),
            previous: CampaignStatus::Upcoming,
            current: CampaignStatus::Active,
        }]
    );
    assert_eq!(state(&store).campaigns["c1"].status, CampaignStatus::Active);
}

#[tokio::test]
async fn unchanged_campaign_is_silent() {
    let store = MemoryStore::new();
    let notifier = RecordingNotifier::default();
    let api = FakeApi::with_campaigns(vec![listing("c1", "EXPIRED")]);
    reconciler(&api, &store, &notifier).run_once().await.unwrap();
    notifier.take();

    reconciler(&api, &store, &notifier).run_once().await.unwrap();
    assert!(notifier.take().is_empty());
}

#[tokio::test]
async fn seventy_active_campaigns_make_two_full_batches_in_order() {
    let campaigns = (0..70).map(|i| listing(&format!("c{i:02}"), "ACTIVE")).collect();
    let api = FakeApi::with_campaigns(campaigns);
    let store = MemoryStore::new();

    let summary = reconciler(&api, &store, &RecordingNotifier::default())
        .run_once()
        .await
        .unwrap();

    assert_eq!(api.batch_sizes(), vec![35, 35]);
    assert_eq!(summary.detail_batches, 2);
    let batches = api.batches.lock().unwrap();
    assert_eq!(batches[0][0], "c00");
    assert_eq!(batches[0][34], "c34");
    assert_eq!(batches[1][0], "c35");
}

#[tokio::test]
async fn thirty_six_active_campaigns_split_thirty_five_and_one() {
    let campaigns = (0..36).map(|i| listing(&format!("c{i}"), "UPCOMING")).collect();
    let api = FakeApi::with_campaigns(campaigns);

    reconciler(&api, &MemoryStore::new(), &RecordingNotifier::default())
        .run_once()
        .await
        .unwrap();

    assert_eq!(api.batch_sizes(), vec![35, 1]);
}

#[tokio::test]
async fn two_preconditions_produce_two_edges() {
    let api = chained_campaign();
    let store = MemoryStore::new();

    reconciler(&api, &store, &RecordingNotifier::default())
        .run_once()
        .await
        .unwrap();

    let edges: Vec<_> = state(&store).prerequisites.into_iter().collect();
    assert_eq!(
        edges,
        vec![
            BenefitPrerequisite::new("d3", "p1"),
            BenefitPrerequisite::new("d3", "p2"),
        ]
    );
}

#[tokio::test]
async fn only_the_first_benefit_edge_is_stored() {
    let api = FakeApi::with_campaigns(vec![listing("c1", "ACTIVE")]).with_details(details(
        "c1",
        vec![entry("d1", &[], vec![edge("Hat", 1), edge("Cape", 4)])],
    ));
    let store = MemoryStore::new();

    reconciler(&api, &store, &RecordingNotifier::default())
        .run_once()
        .await
        .unwrap();

    let snapshot = state(&store);
    assert_eq!(snapshot.benefits.len(), 1);
    let benefit = &snapshot.benefits["d1"];
    assert_eq!(benefit.name, "Hat");
    assert_eq!(benefit.entitlement_limit, 1);
    assert_eq!(benefit.drop_campaign_id, "c1");
    assert_eq!(benefit.benefit_art_url.as_deref(), Some("https://img/Hat.png"));
}

#[tokio::test]
async fn expired_campaigns_are_stored_but_never_looked_up() {
    let api = FakeApi::with_campaigns(vec![listing("old", "EXPIRED"), listing("live", "ACTIVE")]);
    let store = MemoryStore::new();

    let summary = reconciler(&api, &store, &RecordingNotifier::default())
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.active_campaigns, 1);
    assert_eq!(*api.batches.lock().unwrap(), vec![vec!["live".to_string()]]);
    assert!(state(&store).campaigns.contains_key("old"));
}

#[tokio::test]
async fn benefit_failure_keeps_campaign_phase() {
    let api = chained_campaign();
    let store = MemoryStore::new();
    store.fail_on_benefit("p2");

    let err = reconciler(&api, &store, &RecordingNotifier::default())
        .run_once()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Store {
            phase: Phase::Benefits,
            source: StoreError::Injected(_)
        }
    ));
    let snapshot = state(&store);
    assert!(snapshot.campaigns.contains_key("c1"));
    assert!(snapshot.benefits.is_empty());
    assert!(snapshot.prerequisites.is_empty());
}

#[tokio::test]
async fn listing_failure_is_fatal_and_writes_nothing() {
    let api = FakeApi {
        fail_listing: true,
        ..chained_campaign()
    };
    let store = MemoryStore::new();

    let err = reconciler(&api, &store, &RecordingNotifier::default())
        .run_once()
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Client(ClientError::Status { status: 401, .. })));
    assert!(state(&store).campaigns.is_empty());
}

#[tokio::test]
async fn details_failure_rolls_back_only_the_benefit_phase() {
    let api = FakeApi {
        fail_details: true,
        ..chained_campaign()
    };
    let store = MemoryStore::new();

    let err = reconciler(&api, &store, &RecordingNotifier::default())
        .run_once()
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Client(ClientError::Graphql(_))));
    let snapshot = state(&store);
    assert!(snapshot.campaigns.contains_key("c1"));
    assert!(snapshot.benefits.is_empty());
}

#[tokio::test]
async fn missing_channel_login_fails_after_campaigns_commit() {
    let api = chained_campaign();
    let store = MemoryStore::new();

    let err = Reconciler::new(api, store.clone(), None)
        .with_notifier(Box::<RecordingNotifier>::default())
        .run_once()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::Config(ConfigError::Missing("CHANNEL_LOGIN"))
    ));
    assert!(state(&store).campaigns.contains_key("c1"));
}

#[tokio::test]
async fn missing_channel_login_is_fine_without_active_campaigns() {
    let api = FakeApi::with_campaigns(vec![listing("old", "EXPIRED")]);
    let store = MemoryStore::new();

    let summary = Reconciler::new(api.clone(), store.clone(), None)
        .with_notifier(Box::<RecordingNotifier>::default())
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.detail_batches, 0);
    assert!(api.batch_sizes().is_empty());
}

#[tokio::test]
async fn edge_to_unknown_benefit_is_skipped() {
    let api = FakeApi::with_campaigns(vec![listing("c1", "ACTIVE")]).with_details(details(
        "c1",
        vec![
            entry("lonely", &[], vec![]),
            entry("d1", &["ghost", "lonely"], vec![edge("Hat", 1)]),
        ],
    ));
    let store = MemoryStore::new();

    let summary = reconciler(&api, &store, &RecordingNotifier::default())
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.prerequisites_skipped, 2);
    assert_eq!(summary.prerequisites_inserted, 0);
    let snapshot = state(&store);
    assert_eq!(snapshot.benefits.len(), 1);
    assert!(snapshot.prerequisites.is_empty());
}

#[tokio::test]
async fn prerequisite_from_a_later_batch_is_linked_on_first_run() {
    // c1 needs a reward owned by c2, which only arrives in the second batch.
    let mut campaigns = vec![listing("c1", "ACTIVE")];
    campaigns.extend((0..34).map(|i| listing(&format!("filler-{i}"), "ACTIVE")));
    campaigns.push(listing("c2", "ACTIVE"));
    let api = FakeApi::with_campaigns(campaigns)
        .with_details(details("c1", vec![entry("d1", &["e1"], vec![edge("Hat", 1)])]))
        .with_details(details("c2", vec![entry("e1", &[], vec![edge("Cape", 1)])]));
    let store = MemoryStore::new();
    let sync = reconciler(&api, &store, &RecordingNotifier::default());

    let first = sync.run_once().await.unwrap();
    assert_eq!(api.batch_sizes(), vec![35, 1]);
    assert_eq!(first.prerequisites_inserted, 1);
    assert_eq!(first.prerequisites_skipped, 0);
    let after_first = state(&store);
    assert!(after_first
        .prerequisites
        .contains(&BenefitPrerequisite::new("d1", "e1")));

    let second = sync.run_once().await.unwrap();
    assert_eq!(state(&store), after_first);
    assert_eq!(second.prerequisites_inserted, 0);
    assert_eq!(second.prerequisites_skipped, 0);
}

#[tokio::test]
async fn overlong_campaign_id_is_skipped_without_failing_the_run() {
    let long = "x".repeat(MAX_ID_LEN + 1);
    let api = FakeApi::with_campaigns(vec![listing(&long, "ACTIVE"), listing("c1", "ACTIVE")]);
    let store = MemoryStore::new();
    let notifier = RecordingNotifier::default();

    let summary = reconciler(&api, &store, &notifier).run_once().await.unwrap();

    assert_eq!(summary.campaigns_seen, 2);
    assert_eq!(summary.campaigns_skipped, 1);
    assert_eq!(summary.new_campaigns, 1);
    assert_eq!(api.batches.lock().unwrap().clone(), vec![vec!["c1".to_string()]]);
    let events = notifier.take();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], CampaignEvent::New { id, .. } if id == "c1"));
    let snapshot = state(&store);
    assert!(!snapshot.campaigns.contains_key(&long));
    assert!(snapshot.campaigns.contains_key("c1"));
}

#[tokio::test]
async fn overlong_drop_id_is_skipped_with_its_edges() {
    let long = "d".repeat(MAX_ID_LEN + 1);
    let api = FakeApi::with_campaigns(vec![listing("c1", "ACTIVE")]).with_details(details(
        "c1",
        vec![
            entry("d1", &[], vec![edge("Hat", 1)]),
            entry(&long, &["d1"], vec![edge("Cape", 1)]),
        ],
    ));
    let store = MemoryStore::new();

    let summary = reconciler(&api, &store, &RecordingNotifier::default())
        .run_once()
        .await
        .unwrap();

    assert_eq!(summary.benefits_inserted, 1);
    assert_eq!(summary.benefits_skipped, 1);
    assert_eq!(summary.prerequisites_skipped, 0);
    let snapshot = state(&store);
    assert_eq!(snapshot.benefits.keys().collect::<Vec<_>>(), vec!["d1"]);
    assert!(snapshot.prerequisites.is_empty());
}

#[tokio::test]
async fn summary_serializes_for_json_output() {
    let api = chained_campaign();
    let summary = reconciler(&api, &MemoryStore::new(), &RecordingNotifier::default())
        .run_once()
        .await
        .unwrap();

    let value = serde_json::to_value(&summary).unwrap();
    assert_eq!(value["campaigns_seen"], 1);
    assert_eq!(value["detail_batches"], 1);
    assert!(value["run_id"].is_string());
    assert!(summary.finished_at >= summary.started_at);
}
