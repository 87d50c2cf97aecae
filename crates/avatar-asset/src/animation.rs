use std::{
    fmt::Debug,
    ops::{Add, Mul},
    time::Duration,
};

use glam::{Quat, Vec3};

use crate::node::DecomposedTransform;

#[derive(Debug, Clone)]
pub struct AnimationKeyFrame<T: Debug + Clone> {
    pub time: f32,
    pub value: T,
}

impl<T: Debug + Clone> AnimationKeyFrame<T> {
    pub fn new(time: f32, value: T) -> Self {
        Self { time, value }
    }
}

#[derive(Debug, Clone)]
pub enum AnimationKeyFrames<T: Debug + Clone> {
    Linear(Vec<AnimationKeyFrame<T>>),
    Step(Vec<AnimationKeyFrame<T>>),
    // in, val, out
    CubicSpline(Vec<AnimationKeyFrame<(T, T, T)>>),
}

impl<T: Debug + Clone> AnimationKeyFrames<T> {
    /// Time of the last keyframe, in seconds.
    pub fn end_time(&self) -> f32 {
        match self {
            AnimationKeyFrames::Linear(vec) | AnimationKeyFrames::Step(vec) => {
                vec.last().map(|frame| frame.time).unwrap_or(0.0)
            }
            AnimationKeyFrames::CubicSpline(vec) => {
                vec.last().map(|frame| frame.time).unwrap_or(0.0)
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AnimationKeyFrames::Linear(vec) | AnimationKeyFrames::Step(vec) => vec.len(),
            AnimationKeyFrames::CubicSpline(vec) => vec.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub enum AnimationSampler {
    Rotation(AnimationKeyFrames<[f32; 4]>),
    Translation(AnimationKeyFrames<[f32; 3]>),
    Scale(AnimationKeyFrames<[f32; 3]>),
}

/// One animated property of one bone, addressed by bone name so that it can
/// be retargeted onto any skeleton.
#[derive(Debug, Clone)]
pub struct AnimationChannel {
    pub target_bone: String,
    pub sampler: AnimationSampler,
}

impl AnimationChannel {
    pub fn new(target_bone: impl Into<String>, sampler: AnimationSampler) -> Self {
        Self {
            target_bone: target_bone.into(),
            sampler,
        }
    }
}

/// Named source clip. Clips are templates: playback state lives in the
/// per-skeleton instances created from them.
#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub name: String,
    pub channels: Vec<AnimationChannel>,
    pub length: Duration,
}

impl AnimationClip {
    pub fn new(name: impl Into<String>, channels: Vec<AnimationChannel>) -> Self {
        let length = channels
            .iter()
            .map(|channel| channel.sampler.end_time())
            .fold(0.0f32, f32::max);
        Self {
            name: name.into(),
            channels,
            length: Duration::from_secs_f32(length.max(0.0)),
        }
    }
}

pub trait Interpolate {
    fn linear(a: Self, b: Self, t: f32) -> Self;
    fn cubic_spline(vk: Self, bk: Self, vk_1: Self, ak_1: Self, t: f32, td: f32) -> Self;
}

impl<T> Interpolate for T
where
    T: Mul<f32, Output = T> + Add<T, Output = T>,
{
    fn linear(a: Self, b: Self, t: f32) -> Self {
        a * (1.0 - t) + b * t
    }

    fn cubic_spline(vk: Self, bk: Self, vk_1: Self, ak_1: Self, t: f32, td: f32) -> Self {
        let t3 = t.powi(3);
        let t2 = t.powi(2);
        let first = vk * (2.0 * t3 - 3.0 * t2 + 1.0);
        let second = bk * (td * (t3 - 2.0 * t2 + t));
        let third = vk_1 * (-2.0 * t3 + 3.0 * t2);
        let forth = ak_1 * (td * (t3 - t2));
        first + second + third + forth
    }
}

enum KeyFrameSpan<'a, T> {
    Exact(&'a T),
    Between {
        progress: f32,
        delta: f32,
        current: &'a T,
        next: &'a T,
    },
}

// Times before the first keyframe hold the first value, times after the last
// keyframe hold the last value.
fn find_keyframe<T: Debug + Clone>(
    time: f32,
    keyframes: &[AnimationKeyFrame<T>],
) -> Option<KeyFrameSpan<'_, T>> {
    let first = keyframes.first()?;
    if time <= first.time {
        return Some(KeyFrameSpan::Exact(&first.value));
    }
    let Some(index) = keyframes.iter().position(|frame| frame.time > time) else {
        return keyframes
            .last()
            .map(|frame| KeyFrameSpan::Exact(&frame.value));
    };
    let current = &keyframes[index - 1];
    let next = &keyframes[index];
    let delta = next.time - current.time;
    let progress = if delta > 0.0 {
        (time - current.time) / delta
    } else {
        0.0
    };
    Some(KeyFrameSpan::Between {
        progress: progress.clamp(0.0, 1.0),
        delta,
        current: &current.value,
        next: &next.value,
    })
}

fn interpolate_frames<T: Debug + Clone, I: Interpolate>(
    time: f32,
    keyframes: &AnimationKeyFrames<T>,
    mapper: impl Fn(&T) -> I,
) -> Option<I> {
    match keyframes {
        AnimationKeyFrames::Linear(vec) => find_keyframe(time, vec).map(|span| match span {
            KeyFrameSpan::Exact(value) => mapper(value),
            KeyFrameSpan::Between {
                progress,
                current,
                next,
                ..
            } => I::linear(mapper(current), mapper(next), progress),
        }),
        AnimationKeyFrames::Step(vec) => find_keyframe(time, vec).map(|span| match span {
            KeyFrameSpan::Exact(value) | KeyFrameSpan::Between { current: value, .. } => {
                mapper(value)
            }
        }),
        AnimationKeyFrames::CubicSpline(vec) => find_keyframe(time, vec).map(|span| match span {
            KeyFrameSpan::Exact((_, value, _)) => mapper(value),
            KeyFrameSpan::Between {
                progress,
                delta,
                current,
                next,
            } => I::cubic_spline(
                mapper(&current.1),
                mapper(&current.2),
                mapper(&next.1),
                mapper(&next.0),
                progress,
                delta,
            ),
        }),
    }
}

impl AnimationSampler {
    pub fn end_time(&self) -> f32 {
        match self {
            AnimationSampler::Rotation(keyframes) => keyframes.end_time(),
            AnimationSampler::Translation(keyframes) => keyframes.end_time(),
            AnimationSampler::Scale(keyframes) => keyframes.end_time(),
        }
    }

    /// Write the sampled value at `time` (seconds) into `transform`. Returns
    /// false if the sampler has no keyframes.
    pub fn apply(&self, time: f32, transform: &mut DecomposedTransform) -> bool {
        match self {
            AnimationSampler::Rotation(keyframes) => {
                interpolate_frames(time, keyframes, |arr| Quat::from_array(*arr))
                    .map(|rotation| transform.rotation = rotation.normalize())
                    .is_some()
            }
            AnimationSampler::Translation(keyframes) => {
                interpolate_frames(time, keyframes, |arr| Vec3::from_array(*arr))
                    .map(|translation| transform.translation = translation)
                    .is_some()
            }
            AnimationSampler::Scale(keyframes) => {
                interpolate_frames(time, keyframes, |arr| Vec3::from_array(*arr))
                    .map(|scale| transform.scale = scale)
                    .is_some()
            }
        }
    }
}
