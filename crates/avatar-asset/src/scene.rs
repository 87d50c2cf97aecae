use super::{animation::AnimationClip, mesh::MeshAsset, skeleton::Skeleton};

/// Everything an importer produces for one URL.
#[derive(Debug, Default)]
pub struct ImportedScene {
    pub meshes: Vec<MeshAsset>,
    pub skeleton: Option<Skeleton>,
    pub animation_groups: Vec<AnimationClip>,
}

impl ImportedScene {
    pub fn clip(&self, name: &str) -> Option<&AnimationClip> {
        self.animation_groups.iter().find(|clip| clip.name == name)
    }

    pub fn take_clip(&mut self, name: &str) -> Option<AnimationClip> {
        let index = self
            .animation_groups
            .iter()
            .position(|clip| clip.name == name)?;
        Some(self.animation_groups.swap_remove(index))
    }

    /// Copy of this scene with a fresh skeleton instance.
    pub fn instantiate(&self) -> Self {
        Self {
            meshes: self.meshes.clone(),
            skeleton: self.skeleton.as_ref().map(Skeleton::instantiate),
            animation_groups: self.animation_groups.clone(),
        }
    }
}
