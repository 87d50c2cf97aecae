use std::{collections::BTreeSet, time::Duration};

use avatar_engine::{
    animation::PlaybackMode,
    asset::{
        animation::{
            AnimationChannel, AnimationClip, AnimationKeyFrame, AnimationKeyFrames,
            AnimationSampler,
        },
        catalog::{GenderCatalog, PartCatalog},
        config::{AvatarConfiguration, Color, Gender, Slot},
        index::{PartId, PartTag},
        mesh::MeshAsset,
        scene::ImportedScene,
        skeleton::Skeleton,
    },
    config::EngineConfig,
    controller::{AvatarController, AvatarEvent, AvatarView},
    source::memory::MemoryAssets,
};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{sleep, Instant},
};

const FAST: Duration = Duration::from_millis(10);

fn part(name: &str) -> ImportedScene {
    ImportedScene {
        meshes: vec![MeshAsset::new(name, 1, true)],
        skeleton: Some(Skeleton::chain(None, ["Hips", "Spine"])),
        animation_groups: Vec::new(),
    }
}

fn clip(name: &str) -> AnimationClip {
    let frames = AnimationKeyFrames::Linear(vec![
        AnimationKeyFrame::new(0.0, [0.0, 0.0, 0.0]),
        AnimationKeyFrame::new(1.0, [0.0, 1.0, 0.0]),
    ]);
    AnimationClip::new(
        name,
        vec![AnimationChannel::new(
            "Spine",
            AnimationSampler::Translation(frames),
        )],
    )
}

fn animation_pack() -> ImportedScene {
    ImportedScene {
        meshes: Vec::new(),
        skeleton: Some(Skeleton::chain(None, ["Hips", "Spine"])),
        animation_groups: vec![clip("walk"), clip("idle")],
    }
}

fn ids(ids: &[&str]) -> Vec<PartId> {
    ids.iter().copied().map(PartId::from).collect()
}

fn catalog() -> PartCatalog {
    let male = GenderCatalog {
        animation_pack: Some(PartId::from("anim_male")),
        slots: [
            (Slot::Body, ids(&["B1"])),
            (Slot::Hair, ids(&["H0", "H1", "H2", "H9"])),
            (Slot::Top, ids(&["T1"])),
        ]
        .into_iter()
        .collect(),
    };
    let female = GenderCatalog {
        animation_pack: Some(PartId::from("anim_female")),
        slots: [(Slot::Body, ids(&["B2"])), (Slot::Hair, ids(&["H1"]))]
            .into_iter()
            .collect(),
    };
    PartCatalog::new()
        .with_gender(Gender::Male, male)
        .with_gender(Gender::Female, female)
}

struct Harness {
    assets: MemoryAssets,
    controller: AvatarController,
    events: broadcast::Receiver<AvatarEvent>,
    driver: JoinHandle<()>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    fn with_config(config: EngineConfig) -> Self {
        let assets = MemoryAssets::new();
        for id in ["B1", "B2", "H0", "H1", "H2", "T1"] {
            assets.insert(id, part(id), FAST);
        }
        assets.insert("anim_male", animation_pack(), FAST);
        assets.insert("anim_female", animation_pack(), FAST);
        assets.insert_broken("H9", FAST);

        let (controller, driver) =
            AvatarController::new(config, catalog(), assets.clone(), assets.clone());
        let events = controller.subscribe();
        Self {
            assets,
            controller,
            events,
            driver: tokio::spawn(driver.run()),
        }
    }

    async fn apply(&self, configuration: AvatarConfiguration) {
        let generation = self.controller.reconfigure(configuration).unwrap();
        self.controller.wait_settled(generation).await.unwrap();
    }

    fn view(&self) -> AvatarView {
        self.controller.view().borrow().clone()
    }

    fn drain(&mut self) -> Vec<AvatarEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    fn imports(&self, id: &str) -> usize {
        self.assets.import_count(&PartId::from(id))
    }

    async fn shutdown(self) {
        self.controller.shutdown().unwrap();
        self.driver.await.unwrap();
    }
}

fn male(body: &str) -> AvatarConfiguration {
    AvatarConfiguration::new(Gender::Male, body)
}

fn with_hair(configuration: AvatarConfiguration, hair: &str) -> AvatarConfiguration {
    configuration.with_part(Slot::Hair, Some(PartId::from(hair)))
}

fn index_of(events: &[AvatarEvent], wanted: impl Fn(&AvatarEvent) -> bool) -> usize {
    events.iter().position(wanted).unwrap()
}

fn tag(gender: Gender, id: &str) -> PartTag {
    PartTag::new(gender, id)
}

#[tokio::test(start_paused = true)]
async fn body_only_configuration() {
    let mut harness = Harness::new();
    harness
        .apply(male("B1").with_part(Slot::Hair, None))
        .await;

    assert!(harness.controller.is_animation_ready());
    let view = harness.view();
    assert_eq!(view.visible(Slot::Body), Some(&tag(Gender::Male, "B1")));
    assert_eq!(view.visible(Slot::Hair), None);
    assert_eq!(view.slots.len(), 1);
    assert_eq!(
        harness.assets.imports(),
        vec![PartId::from("B1"), PartId::from("anim_male")]
    );

    let events = harness.drain();
    assert!(matches!(events.last(), Some(AvatarEvent::Ready { generation: 1 })));
    assert!(events
        .iter()
        .any(|event| matches!(event, AvatarEvent::ClipsAttached { clips, .. } if clips.len() == 2)));
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn gender_switch_swaps_in_one_step() {
    let mut harness = Harness::new();
    harness.apply(with_hair(male("B1"), "H0")).await;
    harness.drain();

    let mut view = harness.controller.view();
    let snapshots = tokio::spawn(async move {
        let mut genders: Vec<BTreeSet<Gender>> = Vec::new();
        while view.changed().await.is_ok() {
            genders.push(view.borrow_and_update().visible_genders());
        }
        genders
    });

    harness
        .assets
        .set_latency(&PartId::from("B2"), Duration::from_millis(200));
    harness
        .assets
        .set_latency(&PartId::from("H1"), Duration::from_millis(50));
    let generation = harness
        .controller
        .reconfigure(with_hair(
            AvatarConfiguration::new(Gender::Female, "B2"),
            "H1",
        ))
        .unwrap();

    sleep(Duration::from_millis(60)).await;
    let during = harness.view();
    assert_eq!(during.switching_to, Some(Gender::Female));
    assert_eq!(during.visible(Slot::Body), Some(&tag(Gender::Male, "B1")));
    assert_eq!(during.visible(Slot::Hair), Some(&tag(Gender::Male, "H0")));
    assert!(!harness.controller.is_animation_ready());

    harness.controller.wait_settled(generation).await.unwrap();
    let after = harness.view();
    assert_eq!(after.switching_to, None);
    assert_eq!(after.visible(Slot::Body), Some(&tag(Gender::Female, "B2")));
    assert_eq!(after.visible(Slot::Hair), Some(&tag(Gender::Female, "H1")));
    assert_eq!(after.visible_genders(), BTreeSet::from([Gender::Female]));
    assert!(harness.controller.is_animation_ready());

    let events = harness.drain();
    let started = index_of(&events, |event| {
        matches!(event, AvatarEvent::GenderSwitchStarted { .. })
    });
    let committed = index_of(&events, |event| {
        matches!(event, AvatarEvent::GenderCommitted { gender: Gender::Female, slots } if slots.len() == 2)
    });
    let first_enabled = index_of(&events, |event| matches!(event, AvatarEvent::SlotEnabled { .. }));
    let first_disposed =
        index_of(&events, |event| matches!(event, AvatarEvent::SlotDisposed { .. }));
    assert!(started < first_enabled);
    assert!(first_enabled < first_disposed);
    assert!(first_disposed < committed);
    let disposed: Vec<&PartTag> = events
        .iter()
        .filter_map(|event| match event {
            AvatarEvent::SlotDisposed { tag, .. } => Some(tag),
            _ => None,
        })
        .collect();
    assert_eq!(disposed, vec![&tag(Gender::Male, "B1"), &tag(Gender::Male, "H0")]);

    harness.shutdown().await;
    let snapshots = snapshots.await.unwrap();
    assert!(!snapshots.is_empty());
    assert!(snapshots.iter().all(|genders| genders.len() <= 1));
}

#[tokio::test(start_paused = true)]
async fn ready_right_after_gender_switch_waits_for_new_avatar() {
    let harness = Harness::new();
    harness.apply(male("B1")).await;
    assert!(harness.controller.is_animation_ready());

    harness
        .controller
        .reconfigure(with_hair(
            AvatarConfiguration::new(Gender::Female, "B2"),
            "H1",
        ))
        .unwrap();
    assert!(!harness.controller.is_animation_ready());
    harness.controller.ready().await.unwrap();

    let view = harness.view();
    assert_eq!(view.visible(Slot::Body), Some(&tag(Gender::Female, "B2")));
    assert_eq!(view.visible(Slot::Hair), Some(&tag(Gender::Female, "H1")));
    assert!(harness.controller.is_animation_ready());

    // Clips of the new avatar accept playback straight away.
    harness.controller.play_clip("walk").unwrap();
    sleep(Duration::from_millis(200)).await;
    let poses = harness.controller.sample_poses(Instant::now()).await.unwrap();
    assert_eq!(poses.len(), 2);
    assert!(poses.iter().all(|pose| pose.clip == "walk"));
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_body_during_gender_switch_commits_the_rest() {
    let mut harness = Harness::new();
    harness.assets.insert_broken("B9", FAST);
    harness.apply(with_hair(male("B1"), "H0")).await;
    harness.drain();

    let female = with_hair(AvatarConfiguration::new(Gender::Female, "B9"), "H1");
    harness.controller.reconfigure(female.clone()).unwrap();
    harness.controller.ready().await.unwrap();

    let view = harness.view();
    assert_eq!(view.visible(Slot::Body), None);
    assert_eq!(view.visible(Slot::Hair), Some(&tag(Gender::Female, "H1")));
    assert_eq!(view.visible_genders(), BTreeSet::from([Gender::Female]));

    let events = harness.drain();
    assert!(events.iter().any(|event| matches!(
        event,
        AvatarEvent::LoadFailed { slot: Slot::Body, tag: failed, .. } if *failed == tag(Gender::Female, "B9")
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        AvatarEvent::GenderCommitted { gender: Gender::Female, slots } if *slots == vec![Slot::Hair]
    )));
    let disposed: Vec<&PartTag> = events
        .iter()
        .filter_map(|event| match event {
            AvatarEvent::SlotDisposed { tag, .. } => Some(tag),
            _ => None,
        })
        .collect();
    assert_eq!(disposed, vec![&tag(Gender::Male, "B1"), &tag(Gender::Male, "H0")]);
    assert!(matches!(events.last(), Some(AvatarEvent::Ready { .. })));

    // An avatar without a body retries it on the next request.
    harness.apply(female).await;
    assert_eq!(harness.imports("B9"), 2);
    assert_eq!(harness.imports("H1"), 1);
    assert_eq!(harness.view().visible(Slot::Body), None);
    assert!(harness.controller.is_animation_ready());
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_body_keeps_previous_body() {
    let mut harness = Harness::new();
    harness.assets.insert_broken("B9", FAST);
    harness.apply(male("B1")).await;
    harness.drain();

    harness.apply(male("B9")).await;
    assert_eq!(harness.view().visible(Slot::Body), Some(&tag(Gender::Male, "B1")));
    assert!(harness.controller.is_animation_ready());
    let events = harness.drain();
    assert!(events.iter().any(|event| matches!(
        event,
        AvatarEvent::LoadFailed { slot: Slot::Body, tag: failed, .. } if *failed == tag(Gender::Male, "B9")
    )));
    assert!(!events
        .iter()
        .any(|event| matches!(event, AvatarEvent::SlotDisposed { .. })));

    // The body is still there, so the failure is not retried.
    harness.apply(male("B9")).await;
    assert_eq!(harness.imports("B9"), 1);
    assert_eq!(harness.imports("B1"), 1);
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_hair_leaves_slot_empty() {
    let mut harness = Harness::new();
    harness
        .apply(with_hair(male("B1"), "H9").with_part(Slot::Top, Some(PartId::from("T1"))))
        .await;

    assert!(harness.controller.is_animation_ready());
    let view = harness.view();
    assert_eq!(view.visible(Slot::Hair), None);
    assert_eq!(view.visible(Slot::Body), Some(&tag(Gender::Male, "B1")));
    assert_eq!(view.visible(Slot::Top), Some(&tag(Gender::Male, "T1")));
    assert!(harness.drain().iter().any(|event| matches!(
        event,
        AvatarEvent::LoadFailed { slot: Slot::Hair, tag: failed, .. } if failed.part_id.as_str() == "H9"
    )));

    // The same configuration does not retry the broken part.
    harness
        .apply(with_hair(male("B1"), "H9").with_part(Slot::Top, Some(PartId::from("T1"))))
        .await;
    assert_eq!(harness.imports("H9"), 1);
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_hair_disposes_previous_hair() {
    let mut harness = Harness::new();
    harness.apply(with_hair(male("B1"), "H0")).await;
    harness.drain();
    harness.apply(with_hair(male("B1"), "H9")).await;

    assert_eq!(harness.view().visible(Slot::Hair), None);
    assert!(harness.drain().iter().any(|event| matches!(
        event,
        AvatarEvent::SlotDisposed { slot: Slot::Hair, tag: disposed } if disposed.part_id.as_str() == "H0"
    )));
    harness.shutdown().await;
}

async fn superseded_hair(h1_latency: Duration, h2_latency: Duration) {
    let mut harness = Harness::new();
    harness.apply(male("B1")).await;
    harness.drain();
    harness.assets.set_latency(&PartId::from("H1"), h1_latency);
    harness.assets.set_latency(&PartId::from("H2"), h2_latency);

    harness
        .controller
        .reconfigure(with_hair(male("B1"), "H1"))
        .unwrap();
    let generation = harness
        .controller
        .reconfigure(with_hair(male("B1"), "H2"))
        .unwrap();
    harness.controller.wait_settled(generation).await.unwrap();
    sleep(h1_latency.max(h2_latency) * 2).await;

    let view = harness.view();
    assert_eq!(view.visible(Slot::Hair), Some(&tag(Gender::Male, "H2")));
    let events = harness.drain();
    assert!(events.iter().any(|event| matches!(
        event,
        AvatarEvent::LoadDiscarded { slot: Slot::Hair, tag: discarded } if discarded.part_id.as_str() == "H1"
    )));
    assert!(!events.iter().any(|event| matches!(
        event,
        AvatarEvent::SlotEnabled { tag: enabled, .. } if enabled.part_id.as_str() == "H1"
    )));
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn superseded_hair_arriving_late_is_discarded() {
    superseded_hair(Duration::from_millis(100), Duration::from_millis(20)).await;
}

#[tokio::test(start_paused = true)]
async fn superseded_hair_arriving_early_is_discarded() {
    superseded_hair(Duration::from_millis(20), Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn identical_configuration_does_not_reload() {
    let mut harness = Harness::new();
    let configuration = with_hair(male("B1"), "H0").with_color(Slot::Hair, Color::rgb(0.2, 0.1, 0.0));
    harness.apply(configuration.clone()).await;
    let imports = harness.assets.imports().len();
    harness.drain();

    harness.apply(configuration).await;
    assert_eq!(harness.assets.imports().len(), imports);
    let events = harness.drain();
    assert!(events
        .iter()
        .all(|event| matches!(event, AvatarEvent::Ready { .. })));
    assert_eq!(
        harness.view().slots[&Slot::Hair].tint,
        Color::rgb(0.2, 0.1, 0.0)
    );
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn color_change_reapplies_without_reload() {
    let harness = Harness::new();
    harness.apply(with_hair(male("B1"), "H0")).await;
    assert_eq!(harness.view().slots[&Slot::Hair].tint, Color::WHITE);
    assert!(harness.view().slots[&Slot::Hair].casts_shadow);

    harness
        .apply(with_hair(male("B1"), "H0").with_color(Slot::Hair, Color::rgb(1.0, 0.0, 0.0)))
        .await;
    assert_eq!(
        harness.view().slots[&Slot::Hair].tint,
        Color::rgb(1.0, 0.0, 0.0)
    );
    assert_eq!(harness.imports("H0"), 1);
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn followers_join_after_settle_delay() {
    let harness = Harness::new();
    harness.apply(with_hair(male("B1"), "H0")).await;

    let poses = harness.controller.sample_poses(Instant::now()).await.unwrap();
    assert_eq!(poses.len(), 1);
    assert_eq!(poses[0].clip, "idle");

    sleep(Duration::from_millis(150)).await;
    let poses = harness.controller.sample_poses(Instant::now()).await.unwrap();
    assert_eq!(poses.len(), 2);
    assert_eq!(poses[0].time, poses[1].time);

    harness.controller.play_clip("walk").unwrap();
    sleep(Duration::from_millis(150)).await;
    let poses = harness.controller.sample_poses(Instant::now()).await.unwrap();
    assert_eq!(poses.len(), 2);
    assert!(poses.iter().all(|pose| pose.clip == "walk"));

    harness.controller.pause_clip().unwrap();
    let paused = harness.controller.sample_poses(Instant::now()).await.unwrap();
    sleep(Duration::from_millis(300)).await;
    let later = harness.controller.sample_poses(Instant::now()).await.unwrap();
    assert_eq!(paused, later);

    harness
        .controller
        .play_clip_with("walk", PlaybackMode::Loop)
        .unwrap();
    harness.controller.stop_clip().unwrap();
    sleep(Duration::from_millis(150)).await;
    let poses = harness.controller.sample_poses(Instant::now()).await.unwrap();
    assert!(poses.is_empty());
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn swapped_part_joins_playing_clip() {
    let harness = Harness::new();
    harness.apply(with_hair(male("B1"), "H0")).await;
    sleep(Duration::from_millis(150)).await;
    let before = harness.controller.sample_poses(Instant::now()).await.unwrap();

    harness.apply(with_hair(male("B1"), "H1")).await;
    let after = harness.controller.sample_poses(Instant::now()).await.unwrap();
    assert_eq!(after.len(), 2);
    assert_eq!(after[0].skeleton, before[0].skeleton);
    assert_ne!(after[1].skeleton, before[1].skeleton);
    assert_eq!(after[0].time, after[1].time);
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn switching_back_abandons_staging() {
    let mut harness = Harness::new();
    let original = with_hair(male("B1"), "H0");
    harness.apply(original.clone()).await;
    harness.drain();

    harness
        .assets
        .set_latency(&PartId::from("B2"), Duration::from_millis(200));
    harness
        .controller
        .reconfigure(AvatarConfiguration::new(Gender::Female, "B2"))
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    harness.apply(original).await;
    assert_eq!(harness.view().visible_genders(), BTreeSet::from([Gender::Male]));
    assert!(harness.controller.is_animation_ready());

    sleep(Duration::from_millis(300)).await;
    let view = harness.view();
    assert_eq!(view.visible(Slot::Body), Some(&tag(Gender::Male, "B1")));
    assert_eq!(view.visible(Slot::Hair), Some(&tag(Gender::Male, "H0")));
    let events = harness.drain();
    assert!(events
        .iter()
        .any(|event| matches!(event, AvatarEvent::GenderSwitchAbandoned { gender: Gender::Female })));
    assert!(events.iter().any(|event| matches!(
        event,
        AvatarEvent::LoadDiscarded { slot: Slot::Body, tag: discarded } if discarded.gender == Gender::Female
    )));
    assert!(!events.iter().any(|event| matches!(event, AvatarEvent::SlotDisposed { .. })));
    assert_eq!(harness.imports("B1"), 1);
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn hidden_gender_switch() {
    let harness = Harness::with_config(EngineConfig {
        hide_during_gender_switch: true,
        ..EngineConfig::default()
    });
    harness.apply(male("B1")).await;
    harness
        .assets
        .set_latency(&PartId::from("B2"), Duration::from_millis(100));
    let generation = harness
        .controller
        .reconfigure(AvatarConfiguration::new(Gender::Female, "B2"))
        .unwrap();
    sleep(Duration::from_millis(50)).await;
    assert!(harness.view().visible_genders().is_empty());
    harness.controller.wait_settled(generation).await.unwrap();
    assert_eq!(
        harness.view().visible_genders(),
        BTreeSet::from([Gender::Female])
    );
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn missing_animation_pack_still_signals_ready() {
    let harness = Harness::new();
    harness.assets.insert_broken("anim_male", FAST);
    harness.apply(male("B1")).await;
    assert!(harness.controller.is_animation_ready());
    let poses = harness.controller.sample_poses(Instant::now()).await.unwrap();
    assert!(poses.is_empty());
    harness.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_disposes_everything() {
    let mut harness = Harness::new();
    harness.apply(with_hair(male("B1"), "H0")).await;
    harness.drain();
    let controller = harness.controller.clone();
    let mut events = controller.subscribe();
    harness.shutdown().await;

    let mut disposed = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, AvatarEvent::SlotDisposed { .. }) {
            disposed += 1;
        }
    }
    assert_eq!(disposed, 2);
    assert!(!controller.is_animation_ready());
    assert!(controller.view().borrow().is_empty());
    assert!(controller.reconfigure(male("B1")).is_err());
}
