use glam::Mat4;

use crate::{index::SkeletonId, node::DecomposedTransform};

#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent: Option<usize>,
    pub rest: DecomposedTransform,
    pub inverse_bind_matrix: Mat4,
}

impl Bone {
    pub fn new(name: impl Into<String>, parent: Option<usize>) -> Self {
        Self {
            name: name.into(),
            parent,
            rest: DecomposedTransform::default(),
            inverse_bind_matrix: Mat4::IDENTITY,
        }
    }
}

/// One skeleton instance as carried by an imported part.
///
/// Skeletons are not `Clone`: every instance has its own [`SkeletonId`] so
/// animation instances can be bound to it and unbound again when the owning
/// part is disposed. Use [`Skeleton::instantiate`] to get a fresh copy.
#[derive(Debug)]
pub struct Skeleton {
    id: SkeletonId,
    rig: Option<String>,
    bones: Vec<Bone>,
}

impl Skeleton {
    pub fn new(rig: Option<String>, bones: Vec<Bone>) -> Self {
        Self {
            id: SkeletonId::next(),
            rig,
            bones,
        }
    }

    /// Build a skeleton from a flat list of bone names, each parented to the
    /// previous one.
    pub fn chain<'a>(rig: Option<String>, names: impl IntoIterator<Item = &'a str>) -> Self {
        let bones = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| Bone::new(name, index.checked_sub(1)))
            .collect();
        Self::new(rig, bones)
    }

    pub fn instantiate(&self) -> Self {
        Self::new(self.rig.clone(), self.bones.clone())
    }

    pub fn id(&self) -> SkeletonId {
        self.id
    }

    /// Identifier of the rig this skeleton was authored against, if known.
    pub fn rig(&self) -> Option<&str> {
        self.rig.as_deref()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|bone| bone.name == name)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn rest_pose(&self) -> Vec<DecomposedTransform> {
        self.bones.iter().map(|bone| bone.rest).collect()
    }
}
