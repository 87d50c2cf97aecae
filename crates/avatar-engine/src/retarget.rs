//! Mapping of clip channels onto the bones of arbitrary skeletons.
use std::sync::Arc;

use avatar_asset::{
    bone_map::{BoneMapEntry, BoneMapRegistry, SkeletonBoneMap},
    skeleton::Skeleton,
};
use log::trace;

/// Where a source bone ends up on a target skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Index of the target bone.
    Target(usize),
    /// The bone map drops this bone.
    Skip,
    /// Neither the mapped name nor the source name exists on the target.
    NotFound,
}

impl Resolution {
    pub fn target(self) -> Option<usize> {
        match self {
            Resolution::Target(index) => Some(index),
            Resolution::Skip | Resolution::NotFound => None,
        }
    }
}

/// Resolve one source bone against `target`.
///
/// An explicit `null` entry always skips. A mapped name is tried first, then
/// the source name itself.
pub fn resolve(map: &SkeletonBoneMap, source: &str, target: &Skeleton) -> Resolution {
    match map.get(source) {
        BoneMapEntry::Dropped => return Resolution::Skip,
        BoneMapEntry::Mapped(mapped) => {
            if let Some(index) = target.find_bone(mapped) {
                return Resolution::Target(index);
            }
            trace!(
                "Mapped bone {} -> {} missing on skeleton {}",
                source,
                mapped,
                target.id()
            );
        }
        BoneMapEntry::Unmapped => (),
    }
    match target.find_bone(source) {
        Some(index) => Resolution::Target(index),
        None => Resolution::NotFound,
    }
}

/// Picks the bone map for each skeleton by its rig identifier.
#[derive(Debug, Clone, Default)]
pub struct Retargeter {
    registry: Arc<BoneMapRegistry>,
}

impl Retargeter {
    pub fn new(registry: BoneMapRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &BoneMapRegistry {
        &self.registry
    }

    pub fn resolve(&self, source: &str, target: &Skeleton) -> Resolution {
        let resolution = resolve(self.registry.for_rig(target.rig()), source, target);
        if resolution != Resolution::NotFound {
            return resolution;
        }
        trace!("Bone {} not found on skeleton {}", source, target.id());
        resolution
    }
}
