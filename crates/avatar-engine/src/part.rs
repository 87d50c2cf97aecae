use std::sync::Arc;

use avatar_asset::{
    config::Color,
    index::{new_node_id, PartTag},
    mesh::MeshAsset,
    node::DecomposedTransform,
    scene::ImportedScene,
    skeleton::Skeleton,
};
use log::debug;

/// Scene node every part mesh is parented to.
#[derive(Debug, Clone, PartialEq)]
pub struct AvatarRoot {
    id: usize,
    pub transform: DecomposedTransform,
}

impl AvatarRoot {
    pub fn new() -> Self {
        Self {
            id: new_node_id(),
            transform: DecomposedTransform::default(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }
}

impl Default for AvatarRoot {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshNode {
    id: usize,
    parent: usize,
    pub asset: MeshAsset,
    pub enabled: bool,
    pub casts_shadow: bool,
    pub receives_shadow: bool,
    pub tint: Color,
}

impl MeshNode {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn parent(&self) -> usize {
        self.parent
    }
}

/// An imported part as owned by the controller.
#[derive(Debug)]
pub struct PartAsset {
    tag: PartTag,
    meshes: Vec<MeshNode>,
    skeleton: Option<Arc<Skeleton>>,
    enabled: bool,
}

impl PartAsset {
    /// Parent the scene meshes to `root`. The part starts disabled.
    pub fn new(tag: PartTag, scene: ImportedScene, root: &AvatarRoot) -> Self {
        let meshes = scene
            .meshes
            .into_iter()
            .map(|asset| MeshNode {
                id: new_node_id(),
                parent: root.id(),
                asset,
                enabled: false,
                casts_shadow: false,
                receives_shadow: false,
                tint: Color::WHITE,
            })
            .collect();
        Self {
            tag,
            meshes,
            skeleton: scene.skeleton.map(Arc::new),
            enabled: false,
        }
    }

    pub fn tag(&self) -> &PartTag {
        &self.tag
    }

    pub fn meshes(&self) -> &[MeshNode] {
        &self.meshes
    }

    pub fn skeleton(&self) -> Option<&Arc<Skeleton>> {
        self.skeleton.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.meshes.iter_mut().for_each(|mesh| mesh.enabled = enabled);
    }

    pub fn apply_tint(&mut self, tint: Color) {
        self.meshes.iter_mut().for_each(|mesh| mesh.tint = tint);
    }

    pub fn set_shadows(&mut self, cast: bool, receive: bool) {
        self.meshes.iter_mut().for_each(|mesh| {
            mesh.casts_shadow = cast;
            mesh.receives_shadow = receive;
        });
    }

    /// Release the meshes and the skeleton. Animation instances bound to the
    /// skeleton fail from here on.
    pub fn dispose(self) {
        debug!(
            "Dispose {} ({} meshes, skeleton {:?})",
            self.tag,
            self.meshes.len(),
            self.skeleton.as_ref().map(|skeleton| skeleton.id())
        );
    }
}

#[cfg(test)]
mod test {
    use avatar_asset::{
        config::{Color, Gender},
        index::PartTag,
        mesh::MeshAsset,
        scene::ImportedScene,
        skeleton::Skeleton,
    };

    use super::{AvatarRoot, PartAsset};

    #[test]
    fn test_new_part_is_disabled() {
        let root = AvatarRoot::new();
        let scene = ImportedScene {
            meshes: vec![MeshAsset::new("hair", 2, true)],
            skeleton: Some(Skeleton::chain(None, ["Head"])),
            animation_groups: Vec::new(),
        };
        let mut part = PartAsset::new(PartTag::new(Gender::Female, "H1"), scene, &root);
        assert!(!part.is_enabled());
        assert_eq!(part.meshes()[0].parent(), root.id());

        part.set_enabled(true);
        part.apply_tint(Color::rgb(1.0, 0.0, 0.0));
        part.set_shadows(true, false);
        let mesh = &part.meshes()[0];
        assert!(mesh.enabled && mesh.casts_shadow && !mesh.receives_shadow);
        assert_eq!(mesh.tint, Color([1.0, 0.0, 0.0, 1.0]));

        let skeleton = std::sync::Arc::downgrade(part.skeleton().unwrap());
        part.dispose();
        assert!(skeleton.upgrade().is_none());
    }
}
