use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use avatar_asset::{
    animation::AnimationClip,
    index::{new_node_id, SkeletonId},
    node::DecomposedTransform,
    skeleton::Skeleton,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{error::SkeletonDisposed, retarget::Retargeter};

pub mod sync;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// Play to the end and stop.
    Once,
    /// Restart from the beginning at the end.
    #[default]
    Repeat,
    /// Play forward then backward.
    Loop,
}

impl PlaybackMode {
    /// Position inside a clip of `length` after playing for `elapsed`, or
    /// `None` once a `Once` playback is over.
    pub fn clip_time(self, elapsed: Duration, length: Duration) -> Option<Duration> {
        let length_nanos = length.as_nanos() as u64;
        let elapsed_nanos = elapsed.as_nanos() as u64;
        match self {
            PlaybackMode::Once => (elapsed <= length).then_some(elapsed),
            _ if length_nanos == 0 => Some(Duration::ZERO),
            PlaybackMode::Repeat => Some(Duration::from_nanos(elapsed_nanos % length_nanos)),
            PlaybackMode::Loop => {
                let progress = elapsed_nanos % (2 * length_nanos);
                let time = if progress > length_nanos {
                    2 * length_nanos - progress
                } else {
                    progress
                };
                Some(Duration::from_nanos(time))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum AnimationState {
    #[default]
    Stopped,
    Playing {
        mode: PlaybackMode,
        start: Instant,
    },
    Paused {
        mode: PlaybackMode,
        elapsed: Duration,
    },
}

impl AnimationState {
    fn elapsed(&self, now: Instant) -> Option<(PlaybackMode, Duration)> {
        match *self {
            AnimationState::Stopped => None,
            AnimationState::Playing { mode, start } => {
                Some((mode, now.saturating_duration_since(start)))
            }
            AnimationState::Paused { mode, elapsed } => Some((mode, elapsed)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ChannelBinding {
    bone: usize,
    channel: usize,
}

/// Local bone transforms of one skeleton at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub skeleton: SkeletonId,
    pub clip: String,
    pub time: Duration,
    pub transforms: Vec<DecomposedTransform>,
}

/// One clip bound to the bones of one skeleton instance.
///
/// The instance only holds a weak reference to its skeleton; once the owning
/// part is disposed every playback call fails with [`SkeletonDisposed`].
#[derive(Debug)]
pub struct AnimationInstance {
    id: usize,
    clip: Arc<AnimationClip>,
    skeleton: Weak<Skeleton>,
    skeleton_id: SkeletonId,
    bindings: Vec<ChannelBinding>,
    state: AnimationState,
}

impl AnimationInstance {
    /// Bind every channel of `clip` that resolves to a bone of `skeleton`.
    /// Returns `None` when no channel binds at all.
    pub fn retarget(
        clip: &Arc<AnimationClip>,
        skeleton: &Arc<Skeleton>,
        retargeter: &Retargeter,
    ) -> Option<Self> {
        let bindings: Vec<ChannelBinding> = clip
            .channels
            .iter()
            .enumerate()
            .filter_map(|(channel, item)| {
                retargeter
                    .resolve(&item.target_bone, skeleton)
                    .target()
                    .map(|bone| ChannelBinding { bone, channel })
            })
            .collect();
        if bindings.is_empty() {
            return None;
        }
        Some(Self {
            id: new_node_id(),
            clip: clip.clone(),
            skeleton: Arc::downgrade(skeleton),
            skeleton_id: skeleton.id(),
            bindings,
            state: AnimationState::Stopped,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn clip(&self) -> &AnimationClip {
        &self.clip
    }

    pub fn skeleton_id(&self) -> SkeletonId {
        self.skeleton_id
    }

    pub fn bound_channels(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_alive(&self) -> bool {
        self.skeleton.strong_count() > 0
    }

    pub fn state(&self) -> AnimationState {
        self.state
    }

    fn check_alive(&self) -> Result<(), SkeletonDisposed> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(SkeletonDisposed(self.skeleton_id))
        }
    }

    pub fn set_state(&mut self, state: AnimationState) -> Result<(), SkeletonDisposed> {
        self.check_alive()?;
        self.state = state;
        Ok(())
    }

    /// Start from the beginning, or resume where a pause left off.
    pub fn play(&mut self, mode: PlaybackMode, now: Instant) -> Result<(), SkeletonDisposed> {
        let start = match self.state {
            AnimationState::Paused { elapsed, .. } => now.checked_sub(elapsed).unwrap_or(now),
            AnimationState::Stopped | AnimationState::Playing { .. } => now,
        };
        self.set_state(AnimationState::Playing { mode, start })
    }

    pub fn pause(&mut self, now: Instant) -> Result<(), SkeletonDisposed> {
        let state = match self.state.elapsed(now) {
            Some((mode, elapsed)) if self.is_playing(now) || self.is_paused() => {
                AnimationState::Paused { mode, elapsed }
            }
            _ => AnimationState::Stopped,
        };
        self.set_state(state)
    }

    pub fn stop(&mut self) -> Result<(), SkeletonDisposed> {
        self.set_state(AnimationState::Stopped)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.state, AnimationState::Paused { .. })
    }

    pub fn is_playing(&self, now: Instant) -> bool {
        match self.state {
            AnimationState::Playing { mode, start } => mode
                .clip_time(now.saturating_duration_since(start), self.clip.length)
                .is_some(),
            AnimationState::Stopped | AnimationState::Paused { .. } => false,
        }
    }

    /// Evaluate the bound channels on top of the skeleton's rest pose.
    /// Stopped instances and instances whose skeleton is gone yield nothing.
    pub fn sample(&self, now: Instant) -> Option<Pose> {
        let skeleton = self.skeleton.upgrade()?;
        let (mode, elapsed) = self.state.elapsed(now)?;
        let time = mode.clip_time(elapsed, self.clip.length)?;
        let seconds = time.as_secs_f32();
        let mut transforms = skeleton.rest_pose();
        for binding in &self.bindings {
            let (Some(transform), Some(channel)) = (
                transforms.get_mut(binding.bone),
                self.clip.channels.get(binding.channel),
            ) else {
                continue;
            };
            channel.sampler.apply(seconds, transform);
        }
        Some(Pose {
            skeleton: self.skeleton_id,
            clip: self.clip.name.clone(),
            time,
            transforms,
        })
    }
}
