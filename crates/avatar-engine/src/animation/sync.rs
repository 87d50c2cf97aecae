//! Leader/follower playback across skeleton instances.
use std::{
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};

use avatar_asset::{animation::AnimationClip, index::SkeletonId, skeleton::Skeleton};
use log::{debug, trace};
use tokio::{
    runtime::Handle,
    time::{sleep, Instant},
};

use crate::{error::SkeletonDisposed, retarget::Retargeter};

use super::{AnimationInstance, AnimationState, PlaybackMode, Pose};

#[derive(Debug, Default)]
struct SyncInner {
    leader: Option<AnimationInstance>,
    followers: Vec<AnimationInstance>,
    /// Bumped by every playback command. A delayed follower start only runs
    /// if no newer command arrived in between.
    generation: u64,
}

impl SyncInner {
    fn contains(&self, id: SkeletonId) -> bool {
        self.instances().any(|instance| instance.skeleton_id() == id)
    }

    fn instances(&self) -> impl Iterator<Item = &AnimationInstance> {
        self.leader.iter().chain(self.followers.iter())
    }

    /// Replace a disposed leader with the first live follower. The new leader
    /// inherits `state` if it has not started yet.
    fn promote(&mut self, state: AnimationState) {
        if self.leader.as_ref().is_some_and(AnimationInstance::is_alive) {
            return;
        }
        if let Some(leader) = self.leader.take() {
            debug!("Leader of {} on skeleton {} is gone", leader.clip().name, leader.skeleton_id());
        }
        self.followers.retain(AnimationInstance::is_alive);
        if self.followers.is_empty() {
            return;
        }
        let mut leader = self.followers.remove(0);
        if leader.state() == AnimationState::Stopped {
            // Alive was checked above.
            let _ = leader.set_state(state);
        }
        debug!("Promote skeleton {} to leader of {}", leader.skeleton_id(), leader.clip().name);
        self.leader = Some(leader);
    }

    fn leader_state(&self) -> AnimationState {
        self.leader
            .as_ref()
            .map(AnimationInstance::state)
            .unwrap_or_default()
    }

    fn for_each_follower(
        &mut self,
        mut f: impl FnMut(&mut AnimationInstance) -> Result<(), SkeletonDisposed>,
    ) {
        self.followers.retain_mut(|follower| match f(follower) {
            Ok(()) => true,
            Err(error) => {
                debug!("Drop follower: {}", error);
                false
            }
        });
    }

    fn propagate_play(&mut self, generation: u64) {
        if self.generation != generation {
            trace!("Play request #{} superseded by #{}", generation, self.generation);
            return;
        }
        let now = Instant::now();
        let Some(leader) = self.leader.as_ref().filter(|leader| leader.is_playing(now)) else {
            trace!("Leader stopped before followers could start");
            return;
        };
        let state = leader.state();
        self.for_each_follower(|follower| follower.set_state(state));
    }
}

/// A clip cloned onto several skeletons and driven as one performance.
///
/// The first skeleton the clip binds to leads. Playback commands act on the
/// leader first; stop and pause reach the followers immediately, play reaches
/// them after the settle delay so that freshly attached parts have a frame to
/// settle.
///
/// The delayed start runs on the tokio runtime the handle was attached in.
/// Without one, followers start together with the leader.
#[derive(Debug, Clone)]
pub struct SynchronizedHandle {
    clip: Arc<AnimationClip>,
    retargeter: Retargeter,
    settle_delay: Duration,
    runtime: Option<Handle>,
    inner: Arc<Mutex<SyncInner>>,
}

impl SynchronizedHandle {
    pub fn attach(
        clip: Arc<AnimationClip>,
        skeletons: &[Arc<Skeleton>],
        retargeter: Retargeter,
        settle_delay: Duration,
    ) -> Self {
        let handle = Self {
            clip,
            retargeter,
            settle_delay,
            runtime: Handle::try_current().ok(),
            inner: Arc::new(Mutex::new(SyncInner::default())),
        };
        for skeleton in skeletons {
            handle.add_follower(skeleton);
        }
        handle
    }

    fn lock(&self) -> MutexGuard<'_, SyncInner> {
        lock(&self.inner)
    }

    pub fn name(&self) -> &str {
        &self.clip.name
    }

    pub fn clip(&self) -> &Arc<AnimationClip> {
        &self.clip
    }

    pub fn leader(&self) -> Option<SkeletonId> {
        self.lock().leader.as_ref().map(AnimationInstance::skeleton_id)
    }

    pub fn len(&self) -> usize {
        self.lock().instances().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: SkeletonId) -> bool {
        self.lock().contains(id)
    }

    /// State of every instance, leader first.
    pub fn states(&self) -> Vec<(SkeletonId, AnimationState)> {
        self.lock()
            .instances()
            .map(|instance| (instance.skeleton_id(), instance.state()))
            .collect()
    }

    pub fn is_playing(&self) -> bool {
        let now = Instant::now();
        self.lock()
            .leader
            .as_ref()
            .is_some_and(|leader| leader.is_playing(now))
    }

    /// Whether each instance is playing right now, leader first.
    pub fn playing(&self) -> Vec<(SkeletonId, bool)> {
        let now = Instant::now();
        self.lock()
            .instances()
            .map(|instance| (instance.skeleton_id(), instance.is_playing(now)))
            .collect()
    }

    pub fn play(&self, mode: PlaybackMode) {
        let now = Instant::now();
        let generation = {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.promote(AnimationState::Stopped);
            let Some(leader) = inner.leader.as_mut() else {
                debug!("No skeleton left to play {}", self.clip.name);
                return;
            };
            if let Err(error) = leader.play(mode, now) {
                debug!("Failed to start leader: {}", error);
                return;
            }
            inner.generation
        };

        if self.settle_delay.is_zero() {
            self.lock().propagate_play(generation);
            return;
        }
        let Some(runtime) = self
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
        else {
            debug!("No runtime to delay followers of {}", self.clip.name);
            self.lock().propagate_play(generation);
            return;
        };
        let inner = Arc::downgrade(&self.inner);
        let delay = self.settle_delay;
        runtime.spawn(async move {
            sleep(delay).await;
            if let Some(inner) = Weak::upgrade(&inner) {
                lock(&inner).propagate_play(generation);
            }
        });
    }

    pub fn stop(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.promote(AnimationState::Stopped);
        if let Some(leader) = inner.leader.as_mut() {
            if let Err(error) = leader.stop() {
                debug!("Failed to stop leader: {}", error);
            }
        }
        inner.for_each_follower(AnimationInstance::stop);
    }

    pub fn pause(&self) {
        let now = Instant::now();
        let mut inner = self.lock();
        inner.generation += 1;
        inner.promote(AnimationState::Stopped);
        if let Some(leader) = inner.leader.as_mut() {
            if let Err(error) = leader.pause(now) {
                debug!("Failed to pause leader: {}", error);
            }
        }
        inner.for_each_follower(|follower| follower.pause(now));
    }

    /// Clone the clip onto another skeleton. A newcomer joins a running
    /// performance in phase. Returns false if no channel binds to it or the
    /// skeleton is already registered.
    pub fn add_follower(&self, skeleton: &Arc<Skeleton>) -> bool {
        let mut inner = self.lock();
        if inner.contains(skeleton.id()) {
            return false;
        }
        let Some(mut instance) =
            AnimationInstance::retarget(&self.clip, skeleton, &self.retargeter)
        else {
            debug!("Clip {} binds to no bone of skeleton {}", self.clip.name, skeleton.id());
            return false;
        };
        inner.promote(AnimationState::Stopped);
        if inner.leader.is_none() {
            trace!("Skeleton {} leads {}", skeleton.id(), self.clip.name);
            inner.leader = Some(instance);
            return true;
        }
        let now = Instant::now();
        let joins = inner
            .leader
            .as_ref()
            .is_some_and(|leader| leader.is_playing(now) || leader.is_paused());
        if joins {
            // The skeleton is borrowed, so it is alive.
            let _ = instance.set_state(inner.leader_state());
        }
        trace!("Skeleton {} follows {}", skeleton.id(), self.clip.name);
        inner.followers.push(instance);
        true
    }

    /// Unregister a skeleton about to be disposed.
    pub fn remove_skeleton(&self, id: SkeletonId) -> bool {
        let mut inner = self.lock();
        if let Some(position) = inner
            .followers
            .iter()
            .position(|follower| follower.skeleton_id() == id)
        {
            inner.followers.remove(position);
            return true;
        }
        if inner.leader.as_ref().map(AnimationInstance::skeleton_id) != Some(id) {
            return false;
        }
        let state = inner.leader_state();
        inner.leader = None;
        inner.promote(state);
        true
    }

    pub fn sample(&self, now: Instant) -> Vec<Pose> {
        self.lock()
            .instances()
            .filter_map(|instance| instance.sample(now))
            .collect()
    }
}

fn lock(inner: &Mutex<SyncInner>) -> MutexGuard<'_, SyncInner> {
    inner
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
