use std::{
    collections::HashMap,
    error::Error,
    fmt::{self, Debug, Display, Formatter},
    path::Path,
};

use glam::{Mat4, Quat, Vec3};
use gltf::{
    animation::{util::ReadOutputs, Channel, Interpolation},
    Animation, Document, Gltf, Node, Skin,
};
use log::{trace, warn};

use crate::{
    animation::{
        AnimationChannel, AnimationClip, AnimationKeyFrame, AnimationKeyFrames, AnimationSampler,
    },
    mesh::MeshAsset,
    node::DecomposedTransform,
    scene::ImportedScene,
    skeleton::{Bone, Skeleton},
};

#[derive(Debug)]
pub enum GltfLoaderError {
    Gltf(gltf::Error),
}

impl Display for GltfLoaderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            GltfLoaderError::Gltf(error) => Display::fmt(error, f),
        }
    }
}

impl Error for GltfLoaderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GltfLoaderError::Gltf(error) => Some(error),
        }
    }
}

impl From<gltf::Error> for GltfLoaderError {
    fn from(value: gltf::Error) -> Self {
        Self::Gltf(value)
    }
}

struct GltfSceneLoader<'a> {
    document: &'a Document,
    buffers: &'a [gltf::buffer::Data],
    parents: HashMap<usize, usize>,
}

impl<'a> GltfSceneLoader<'a> {
    fn new(document: &'a Document, buffers: &'a [gltf::buffer::Data]) -> Self {
        let mut parents = HashMap::new();
        for node in document.nodes() {
            for child in node.children() {
                parents.insert(child.index(), node.index());
            }
        }
        Self {
            document,
            buffers,
            parents,
        }
    }

    fn buffer_data(&self, buffer: gltf::Buffer<'_>) -> Option<&'a [u8]> {
        self.buffers
            .get(buffer.index())
            .map(|data| data.0.as_slice())
    }

    fn load_skeleton(&self, skin: Skin) -> Skeleton {
        let joints: Vec<Node> = skin.joints().collect();
        let joint_indices: HashMap<usize, usize> = joints
            .iter()
            .enumerate()
            .map(|(index, joint)| (joint.index(), index))
            .collect();
        let inverse_bind_matrices: Vec<Mat4> = skin
            .reader(|buffer| self.buffer_data(buffer))
            .read_inverse_bind_matrices()
            .map(|matrices| {
                matrices
                    .map(|matrix| Mat4::from_cols_array_2d(&matrix))
                    .collect()
            })
            .unwrap_or_default();

        let bones = joints
            .iter()
            .enumerate()
            .map(|(index, joint)| {
                let parent = self
                    .parents
                    .get(&joint.index())
                    .and_then(|parent| joint_indices.get(parent))
                    .copied();
                let (translation, rotation, scale) = joint.transform().decomposed();
                Bone {
                    name: joint
                        .name()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("joint{}", index)),
                    parent,
                    rest: DecomposedTransform {
                        translation: Vec3::from_array(translation),
                        rotation: Quat::from_array(rotation),
                        scale: Vec3::from_array(scale),
                    },
                    inverse_bind_matrix: inverse_bind_matrices
                        .get(index)
                        .copied()
                        .unwrap_or(Mat4::IDENTITY),
                }
            })
            .collect();
        Skeleton::new(skin.name().map(str::to_string), bones)
    }

    fn collect_meshes(node: Node, meshes: &mut Vec<MeshAsset>) {
        if let Some(mesh) = node.mesh() {
            meshes.push(MeshAsset {
                name: node.name().or(mesh.name()).map(str::to_string),
                primitive_count: mesh.primitives().len(),
                skinned: node.skin().is_some(),
            });
        }
        for child in node.children() {
            Self::collect_meshes(child, meshes);
        }
    }

    fn load_keyframes<T: Debug + Clone>(
        times: &[f32],
        values: Vec<T>,
        interpolation: Interpolation,
    ) -> Option<AnimationKeyFrames<T>> {
        match interpolation {
            Interpolation::Linear | Interpolation::Step => {
                if values.len() != times.len() {
                    return None;
                }
                let frames = times
                    .iter()
                    .zip(values)
                    .map(|(time, value)| AnimationKeyFrame::new(*time, value))
                    .collect();
                Some(if matches!(interpolation, Interpolation::Step) {
                    AnimationKeyFrames::Step(frames)
                } else {
                    AnimationKeyFrames::Linear(frames)
                })
            }
            Interpolation::CubicSpline => {
                if values.len() != times.len() * 3 {
                    return None;
                }
                let frames = times
                    .iter()
                    .zip(values.chunks_exact(3))
                    .map(|(time, chunk)| {
                        AnimationKeyFrame::new(
                            *time,
                            (chunk[0].clone(), chunk[1].clone(), chunk[2].clone()),
                        )
                    })
                    .collect();
                Some(AnimationKeyFrames::CubicSpline(frames))
            }
        }
    }

    fn load_channel(&self, channel: Channel) -> Option<AnimationChannel> {
        let target = channel.target().node();
        let Some(bone) = target.name() else {
            trace!("Skip channel targeting unnamed node #{}", target.index());
            return None;
        };
        let interpolation = channel.sampler().interpolation();
        let reader = channel.reader(|buffer| self.buffer_data(buffer));
        let times: Vec<f32> = reader.read_inputs()?.collect();
        let sampler = match reader.read_outputs()? {
            ReadOutputs::Translations(values) => AnimationSampler::Translation(
                Self::load_keyframes(&times, values.collect(), interpolation)?,
            ),
            ReadOutputs::Rotations(values) => AnimationSampler::Rotation(Self::load_keyframes(
                &times,
                values.into_f32().collect(),
                interpolation,
            )?),
            ReadOutputs::Scales(values) => AnimationSampler::Scale(Self::load_keyframes(
                &times,
                values.collect(),
                interpolation,
            )?),
            ReadOutputs::MorphTargetWeights(_) => {
                trace!("Skip morph target channel of {}", bone);
                return None;
            }
        };
        Some(AnimationChannel::new(bone, sampler))
    }

    fn load_animation(&self, index: usize, animation: Animation) -> AnimationClip {
        let name = animation
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("animation{}", index));
        let channels = animation
            .channels()
            .filter_map(|channel| {
                let loaded = self.load_channel(channel);
                if loaded.is_none() {
                    warn!("Dropped a malformed channel of animation {}", name);
                }
                loaded
            })
            .collect();
        AnimationClip::new(name, channels)
    }

    fn load(&self) -> ImportedScene {
        let mut meshes = Vec::new();
        if let Some(scene) = self
            .document
            .default_scene()
            .or_else(|| self.document.scenes().next())
        {
            for node in scene.nodes() {
                Self::collect_meshes(node, &mut meshes);
            }
        }

        // The skin used by a mesh wins over unreferenced skins.
        let skin = self
            .document
            .nodes()
            .find_map(|node| node.skin())
            .or_else(|| self.document.skins().next());
        let skeleton = skin.map(|skin| self.load_skeleton(skin));

        let animation_groups = self
            .document
            .animations()
            .enumerate()
            .map(|(index, animation)| self.load_animation(index, animation))
            .collect();

        ImportedScene {
            meshes,
            skeleton,
            animation_groups,
        }
    }
}

/// Load a GLTF or GLB document from a slice. Relative buffer URIs are
/// resolved against `base`; without a base only embedded data URIs and the GLB
/// binary chunk are supported.
pub fn load_gltf(buffer: &[u8], base: Option<&Path>) -> Result<ImportedScene, GltfLoaderError> {
    let Gltf { document, blob } = Gltf::from_slice(buffer)?;
    let buffers = gltf::import_buffers(&document, base, blob)?;
    Ok(GltfSceneLoader::new(&document, &buffers).load())
}

pub fn load_gltf_from_slice(buffer: &[u8]) -> Result<ImportedScene, GltfLoaderError> {
    load_gltf(buffer, None)
}

#[cfg(test)]
mod test {
    use glam::Vec3;

    use crate::node::DecomposedTransform;

    use super::load_gltf_from_slice;

    const RIG: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "name": "Hips", "children": [1], "translation": [0.0, 1.0, 0.0] },
            { "name": "Spine" }
        ],
        "skins": [{ "name": "humanoid", "joints": [0, 1] }],
        "buffers": [{
            "byteLength": 32,
            "uri": "data:application/octet-stream;base64,AAAAAAAAgD8AAAAAAAAAAAAAAAAAAAAAAACAPwAAAAA="
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 8 },
            { "buffer": 0, "byteOffset": 8, "byteLength": 24 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 2, "type": "SCALAR", "min": [0.0], "max": [1.0] },
            { "bufferView": 1, "componentType": 5126, "count": 2, "type": "VEC3" }
        ],
        "animations": [{
            "name": "walk",
            "samplers": [{ "input": 0, "output": 1, "interpolation": "LINEAR" }],
            "channels": [{ "sampler": 0, "target": { "node": 1, "path": "translation" } }]
        }]
    }"#;

    #[test]
    fn test_load_skeleton_and_clip() {
        let scene = load_gltf_from_slice(RIG.as_bytes()).unwrap();
        assert!(scene.meshes.is_empty());

        let skeleton = scene.skeleton.as_ref().unwrap();
        assert_eq!(skeleton.rig(), Some("humanoid"));
        assert_eq!(skeleton.len(), 2);
        assert_eq!(skeleton.bone(0).unwrap().parent, None);
        assert_eq!(skeleton.bone(1).unwrap().parent, Some(0));
        assert_eq!(
            skeleton.bone(0).unwrap().rest.translation,
            Vec3::new(0.0, 1.0, 0.0)
        );

        let clip = scene.clip("walk").unwrap();
        assert_eq!(clip.channels.len(), 1);
        assert_eq!(clip.channels[0].target_bone, "Spine");
        assert_eq!(clip.length.as_secs_f32(), 1.0);

        let mut transform = DecomposedTransform::default();
        assert!(clip.channels[0].sampler.apply(0.5, &mut transform));
        assert!(transform
            .translation
            .abs_diff_eq(Vec3::new(0.0, 0.5, 0.0), 1e-5));
    }
}
