use std::{collections::BTreeMap, sync::Arc};

use avatar_asset::{
    catalog::PartCatalog,
    config::{AvatarConfiguration, Gender, Slot},
    index::PartTag,
    scene::ImportedScene,
};
use futures::{
    future::{join_all, BoxFuture},
    stream::FuturesUnordered,
    FutureExt, StreamExt,
};
use log::{debug, info, trace, warn};
use tokio::{
    select,
    sync::{broadcast, mpsc, watch},
};

use crate::{
    animation::{sync::SynchronizedHandle, PlaybackMode, Pose},
    config::EngineConfig,
    error::LoadError,
    part::{AvatarRoot, PartAsset},
    retarget::Retargeter,
    slot::{SlotEvent, SlotObserver, SlotTable, Transition},
    source::{load_part, AssetLocator, SceneImporter},
    staging::GenderReloadStaging,
};

use super::{
    view::{AvatarEvent, AvatarView},
    Command,
};

pub(crate) struct Outputs {
    pub ready: watch::Sender<bool>,
    pub settled: watch::Sender<u64>,
    pub view: watch::Sender<AvatarView>,
    pub events: broadcast::Sender<AvatarEvent>,
}

enum Completion {
    Part {
        slot: Slot,
        tag: PartTag,
        result: Result<ImportedScene, LoadError>,
    },
    Staged {
        switch: u64,
        gender: Gender,
        results: Vec<(Slot, PartTag, Result<ImportedScene, LoadError>)>,
    },
    Clips {
        gender: Gender,
        result: Result<ImportedScene, LoadError>,
    },
}

enum Step {
    Command(Command),
    Completion(Completion),
    Closed,
}

#[derive(Debug, Clone, Copy)]
struct GenderSwitch {
    id: u64,
    gender: Gender,
}

#[derive(Debug, Default)]
enum ClipSet {
    #[default]
    NotLoaded,
    Loading(Gender),
    Attached {
        gender: Gender,
        handles: BTreeMap<String, SynchronizedHandle>,
    },
    /// The gender has no usable animation pack.
    Unavailable(Gender),
}

impl ClipSet {
    fn handles(&self) -> impl Iterator<Item = &SynchronizedHandle> {
        let handles = match self {
            ClipSet::Attached { handles, .. } => Some(handles.values()),
            _ => None,
        };
        handles.into_iter().flatten()
    }
}

fn send_event(events: &broadcast::Sender<AvatarEvent>, event: AvatarEvent) {
    // No subscriber is fine.
    let _ = events.send(event);
}

/// Wires slot changes to the clips, tints and the event stream.
struct Wiring<'a> {
    clips: &'a ClipSet,
    configuration: Option<&'a AvatarConfiguration>,
    config: &'a EngineConfig,
    events: &'a broadcast::Sender<AvatarEvent>,
}

impl SlotObserver for Wiring<'_> {
    fn attaching(&mut self, slot: Slot, asset: &mut PartAsset) {
        let tint = self
            .configuration
            .and_then(|configuration| configuration.color(slot));
        asset.apply_tint(tint.unwrap_or_default());
        asset.set_shadows(self.config.cast_shadows, self.config.receive_shadows);
        if let Some(skeleton) = asset.skeleton() {
            for handle in self.clips.handles() {
                handle.add_follower(skeleton);
            }
        }
        send_event(
            self.events,
            AvatarEvent::SlotEnabled {
                slot,
                tag: asset.tag().clone(),
            },
        );
    }

    fn disposing(&mut self, slot: Slot, asset: &PartAsset) {
        if let Some(skeleton) = asset.skeleton() {
            for handle in self.clips.handles() {
                handle.remove_skeleton(skeleton.id());
            }
        }
        send_event(
            self.events,
            AvatarEvent::SlotDisposed {
                slot,
                tag: asset.tag().clone(),
            },
        );
    }
}

/// The task that owns the avatar. Run it with [`AvatarDriver::run`].
pub struct AvatarDriver<L, I> {
    config: EngineConfig,
    catalog: PartCatalog,
    locator: Arc<L>,
    importer: Arc<I>,
    retargeter: Retargeter,
    root: AvatarRoot,
    commands: mpsc::UnboundedReceiver<Command>,
    outputs: Outputs,
    table: SlotTable,
    desired: Option<AvatarConfiguration>,
    generation: u64,
    settled_generation: u64,
    switch: Option<GenderSwitch>,
    switch_counter: u64,
    clips: ClipSet,
    loads: FuturesUnordered<BoxFuture<'static, Completion>>,
}

impl<L, I> AvatarDriver<L, I>
where
    L: AssetLocator,
    I: SceneImporter,
{
    pub(crate) fn new(
        config: EngineConfig,
        catalog: PartCatalog,
        locator: Arc<L>,
        importer: Arc<I>,
        commands: mpsc::UnboundedReceiver<Command>,
        outputs: Outputs,
    ) -> Self {
        Self {
            retargeter: Retargeter::new(config.bone_maps.clone()),
            config,
            catalog,
            locator,
            importer,
            root: AvatarRoot::new(),
            commands,
            outputs,
            table: SlotTable::new(),
            desired: None,
            generation: 0,
            settled_generation: 0,
            switch: None,
            switch_counter: 0,
            clips: ClipSet::NotLoaded,
            loads: FuturesUnordered::new(),
        }
    }

    pub async fn run(mut self) {
        info!("Avatar driver started");
        loop {
            let step = select! {
                command = self.commands.recv() => match command {
                    Some(command) => Step::Command(command),
                    None => Step::Closed,
                },
                Some(completion) = self.loads.next(), if !self.loads.is_empty() => {
                    Step::Completion(completion)
                }
            };
            match step {
                Step::Command(Command::Shutdown) | Step::Closed => break,
                Step::Command(command) => self.process_command(command),
                Step::Completion(completion) => self.process_completion(completion),
            }
            self.publish_view();
        }
        self.close();
        info!("Avatar driver stopped");
    }

    fn process_command(&mut self, command: Command) {
        match command {
            Command::Reconfigure {
                configuration,
                generation,
            } => self.reconfigure(configuration, generation),
            Command::Play { clip, mode } => self.play(&clip, mode),
            Command::Stop => self.clips.handles().for_each(SynchronizedHandle::stop),
            Command::Pause => self.clips.handles().for_each(SynchronizedHandle::pause),
            Command::SamplePoses { now, reply } => {
                let poses: Vec<Pose> = self
                    .clips
                    .handles()
                    .flat_map(|handle| handle.sample(now))
                    .collect();
                if reply.send(poses).is_err() {
                    trace!("Pose request dropped");
                }
            }
            Command::Shutdown => (),
        }
    }

    fn process_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Part { slot, tag, result } => self.finish_part(slot, tag, result),
            Completion::Staged {
                switch,
                gender,
                results,
            } => self.finish_switch(switch, gender, results),
            Completion::Clips { gender, result } => self.attach_clips(gender, result),
        }
        self.check_settled();
    }

    fn validate(&self, configuration: &AvatarConfiguration) {
        if self.catalog.gender(configuration.gender).is_none() {
            warn!("No catalog entry for {}", configuration.gender);
            return;
        }
        for (slot, tag) in configuration.requested() {
            if !self
                .catalog
                .contains(configuration.gender, slot, &tag.part_id)
            {
                warn!("{} is not listed for {} in the catalog", tag, slot);
            }
        }
    }

    fn reconfigure(&mut self, configuration: AvatarConfiguration, generation: u64) {
        debug!("Reconfigure #{} as {}", generation, configuration.gender);
        self.validate(&configuration);
        for (slot, tag) in self.table.expire_failures() {
            debug!("Retry {} in empty {}", tag, slot);
        }
        let gender = configuration.gender;
        self.desired = Some(configuration);
        self.generation = generation;

        if let Some(switch) = self.switch {
            if switch.gender == gender {
                debug!("Switch to {} in progress, reconcile after commit", gender);
                return;
            }
            self.abandon_switch();
        }
        match self.table.loaded_gender() {
            Some(loaded) if loaded != gender => self.start_switch(loaded),
            _ => self.reconcile(),
        }
        self.check_settled();
    }

    /// Bring every slot in line with the desired configuration.
    fn reconcile(&mut self) {
        let Some(configuration) = self.desired.as_ref() else {
            return;
        };
        let mut wiring = Wiring {
            clips: &self.clips,
            configuration: Some(configuration),
            config: &self.config,
            events: &self.outputs.events,
        };
        let mut requested = Vec::new();
        for slot in Slot::ALL {
            let event = match configuration.requested_tag(slot) {
                Some(tag) => SlotEvent::Request(tag),
                // The body stays until a replacement arrives.
                None if !slot.is_optional() => continue,
                None => SlotEvent::Clear,
            };
            let request = match &event {
                SlotEvent::Request(tag) => Some(tag.clone()),
                _ => None,
            };
            match self.table.transition(slot, event, &mut wiring) {
                Transition::LoadRequested => requested.extend(request.map(|tag| (slot, tag))),
                Transition::PreviouslyFailed => {
                    trace!("Skip {} in {}, its last load failed", slot, configuration.gender)
                }
                Transition::Cleared(tag) => debug!("Cleared {} from {}", tag, slot),
                _ => (),
            }
        }
        self.table
            .apply_colors(|slot| configuration.color(slot));
        for (slot, tag) in requested {
            self.spawn_part(slot, tag);
        }
    }

    fn spawn_part(&mut self, slot: Slot, tag: PartTag) {
        debug!("Load {} into {}", tag, slot);
        let locator = self.locator.clone();
        let importer = self.importer.clone();
        self.loads.push(
            async move {
                let result = load_part(&*locator, &*importer, &tag.part_id).await;
                Completion::Part { slot, tag, result }
            }
            .boxed(),
        );
    }

    fn finish_part(
        &mut self,
        slot: Slot,
        tag: PartTag,
        result: Result<ImportedScene, LoadError>,
    ) {
        let mut wiring = Wiring {
            clips: &self.clips,
            configuration: self.desired.as_ref(),
            config: &self.config,
            events: &self.outputs.events,
        };
        let transition = match result {
            Ok(scene) => {
                let asset = PartAsset::new(tag, scene, &self.root);
                self.table
                    .transition(slot, SlotEvent::Arrive(asset), &mut wiring)
            }
            Err(error) => {
                let transition =
                    self.table
                        .transition(slot, SlotEvent::Fail(tag.clone()), &mut wiring);
                if let Transition::Failed { .. } = transition {
                    warn!("Failed to load {} into {}: {}", tag, slot, error);
                    send_event(
                        &self.outputs.events,
                        AvatarEvent::LoadFailed { slot, tag, error },
                    );
                }
                transition
            }
        };
        match transition {
            Transition::Enabled { replaced } => {
                debug!("Swapped {} in, replacing {:?}", slot, replaced)
            }
            Transition::Discarded(tag) => {
                send_event(&self.outputs.events, AvatarEvent::LoadDiscarded { slot, tag })
            }
            _ => (),
        }
    }

    fn start_switch(&mut self, from: Gender) {
        let Some(configuration) = self.desired.clone() else {
            return;
        };
        let gender = configuration.gender;
        self.switch_counter += 1;
        let id = self.switch_counter;
        info!("Switch avatar from {} to {}", from, gender);
        self.switch = Some(GenderSwitch { id, gender });
        send_event(
            &self.outputs.events,
            AvatarEvent::GenderSwitchStarted {
                from: Some(from),
                to: gender,
            },
        );

        self.teardown_clips();
        let mut wiring = Wiring {
            clips: &self.clips,
            configuration: Some(&configuration),
            config: &self.config,
            events: &self.outputs.events,
        };
        let hide = self.config.hide_during_gender_switch;
        for slot in Slot::ALL {
            self.table
                .transition(slot, SlotEvent::Retire { hide }, &mut wiring);
        }

        let loads: Vec<_> = configuration
            .requested()
            .map(|(slot, tag)| {
                let locator = self.locator.clone();
                let importer = self.importer.clone();
                async move {
                    let result = load_part(&*locator, &*importer, &tag.part_id).await;
                    (slot, tag, result)
                }
            })
            .collect();
        self.loads.push(
            async move {
                Completion::Staged {
                    switch: id,
                    gender,
                    results: join_all(loads).await,
                }
            }
            .boxed(),
        );
    }

    fn abandon_switch(&mut self) {
        let Some(switch) = self.switch.take() else {
            return;
        };
        info!("Abandon switch to {}", switch.gender);
        send_event(
            &self.outputs.events,
            AvatarEvent::GenderSwitchAbandoned {
                gender: switch.gender,
            },
        );
        let mut wiring = Wiring {
            clips: &self.clips,
            configuration: self.desired.as_ref(),
            config: &self.config,
            events: &self.outputs.events,
        };
        for slot in Slot::ALL {
            self.table.transition(slot, SlotEvent::Restore, &mut wiring);
        }
    }

    fn finish_switch(
        &mut self,
        id: u64,
        gender: Gender,
        results: Vec<(Slot, PartTag, Result<ImportedScene, LoadError>)>,
    ) {
        if self.switch.map(|switch| switch.id) != Some(id) {
            debug!("Drop results of abandoned switch to {}", gender);
            for (slot, tag, result) in results {
                if let Ok(scene) = result {
                    PartAsset::new(tag.clone(), scene, &self.root).dispose();
                }
                send_event(&self.outputs.events, AvatarEvent::LoadDiscarded { slot, tag });
            }
            return;
        }
        self.switch = None;

        let mut staging = GenderReloadStaging::new(gender);
        for (slot, tag, result) in results {
            match result {
                Ok(scene) => staging.insert(slot, PartAsset::new(tag, scene, &self.root)),
                Err(error) => {
                    warn!("Failed to stage {} into {}: {}", tag, slot, error);
                    staging.fail(slot, tag.clone());
                    send_event(
                        &self.outputs.events,
                        AvatarEvent::LoadFailed { slot, tag, error },
                    );
                }
            }
        }
        let mut wiring = Wiring {
            clips: &self.clips,
            configuration: self.desired.as_ref(),
            config: &self.config,
            events: &self.outputs.events,
        };
        let slots = self.table.commit(staging, &mut wiring);
        info!("Committed {} avatar with {} parts", gender, slots.len());
        send_event(
            &self.outputs.events,
            AvatarEvent::GenderCommitted { gender, slots },
        );
        // The configuration may have changed while staging.
        self.reconcile();
    }

    fn load_clips(&mut self, gender: Gender) {
        self.teardown_clips();
        let Some(pack) = self.catalog.animation_pack(gender).cloned() else {
            warn!("No animation pack for {}", gender);
            self.clips = ClipSet::Unavailable(gender);
            return;
        };
        debug!("Load animation pack {} for {}", pack, gender);
        self.clips = ClipSet::Loading(gender);
        let locator = self.locator.clone();
        let importer = self.importer.clone();
        self.loads.push(
            async move {
                let result = load_part(&*locator, &*importer, &pack).await;
                Completion::Clips { gender, result }
            }
            .boxed(),
        );
    }

    fn attach_clips(&mut self, gender: Gender, result: Result<ImportedScene, LoadError>) {
        if !matches!(self.clips, ClipSet::Loading(loading) if loading == gender) {
            debug!("Drop stale animation pack of {}", gender);
            return;
        }
        let mut scene = match result {
            Ok(scene) => scene,
            Err(error) => {
                warn!("Failed to load animation pack of {}: {}", gender, error);
                send_event(
                    &self.outputs.events,
                    AvatarEvent::AnimationPackFailed { gender, error },
                );
                self.clips = ClipSet::Unavailable(gender);
                return;
            }
        };

        let skeletons = self.table.skeletons();
        let mut handles = BTreeMap::new();
        for name in self.config.canonical_clips() {
            let Some(clip) = scene.take_clip(name) else {
                warn!("Animation pack of {} has no clip {}", gender, name);
                continue;
            };
            let handle = SynchronizedHandle::attach(
                Arc::new(clip),
                &skeletons,
                self.retargeter.clone(),
                self.config.settle_delay,
            );
            debug!("Attached {} to {} skeletons", name, handle.len());
            handles.insert(name.to_string(), handle);
        }
        send_event(
            &self.outputs.events,
            AvatarEvent::ClipsAttached {
                gender,
                clips: handles.keys().cloned().collect(),
            },
        );
        self.clips = ClipSet::Attached { gender, handles };
    }

    fn teardown_clips(&mut self) {
        self.clips.handles().for_each(SynchronizedHandle::stop);
        self.clips = ClipSet::NotLoaded;
        self.outputs.ready.send_replace(false);
    }

    /// Once nothing is in flight, make sure the clips match the gender and
    /// signal readiness for the current generation.
    fn check_settled(&mut self) {
        if self.switch.is_some() || self.table.has_pending() {
            return;
        }
        let Some(gender) = self.desired.as_ref().map(|configuration| configuration.gender) else {
            return;
        };
        match self.clips {
            ClipSet::Loading(loading) if loading == gender => (),
            ClipSet::Attached {
                gender: attached, ..
            }
            | ClipSet::Unavailable(attached)
                if attached == gender =>
            {
                self.finish_ready()
            }
            _ => {
                self.load_clips(gender);
                if matches!(self.clips, ClipSet::Unavailable(_)) {
                    self.finish_ready();
                }
            }
        }
    }

    fn finish_ready(&mut self) {
        if self.settled_generation == self.generation {
            return;
        }
        self.settled_generation = self.generation;
        self.table
            .apply_shadows(self.config.cast_shadows, self.config.receive_shadows);

        let now = tokio::time::Instant::now();
        let playing = self.clips.handles().any(SynchronizedHandle::is_playing);
        if !playing {
            if let ClipSet::Attached { handles, .. } = &self.clips {
                if let Some(idle) = handles.get(&self.config.idle_clip) {
                    trace!("Start {} at {:?}", idle.name(), now);
                    idle.play(PlaybackMode::Repeat);
                }
            }
        }

        self.outputs.ready.send_replace(true);
        self.outputs.settled.send_replace(self.generation);
        info!("Avatar ready (#{})", self.generation);
        send_event(
            &self.outputs.events,
            AvatarEvent::Ready {
                generation: self.generation,
            },
        );
    }

    fn play(&mut self, clip: &str, mode: PlaybackMode) {
        let ClipSet::Attached { handles, .. } = &self.clips else {
            warn!("Cannot play {}, animation is not ready", clip);
            return;
        };
        let Some(handle) = handles.get(clip) else {
            warn!("Unknown clip {}", clip);
            return;
        };
        for (name, other) in handles {
            if name != clip {
                other.stop();
            }
        }
        handle.play(mode);
    }

    fn publish_view(&self) {
        let view = AvatarView::new(&self.table, self.switch.map(|switch| switch.gender));
        self.outputs.view.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }

    fn close(&mut self) {
        self.teardown_clips();
        self.switch = None;
        let mut wiring = Wiring {
            clips: &self.clips,
            configuration: None,
            config: &self.config,
            events: &self.outputs.events,
        };
        self.table.clear(&mut wiring);
        self.publish_view();
    }
}
