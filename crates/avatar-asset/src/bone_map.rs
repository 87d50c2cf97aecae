use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Read-only dictionary from source bone names to target bone names.
///
/// A `None` target drops the source bone. Source bones without an entry are
/// matched by name against the target skeleton.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkeletonBoneMap(HashMap<String, Option<String>>);

/// Lookup result for one source bone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoneMapEntry<'a> {
    Mapped(&'a str),
    Dropped,
    Unmapped,
}

impl SkeletonBoneMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: impl Into<String>, target: Option<String>) {
        self.0.insert(source.into(), target);
    }

    pub fn with(mut self, source: impl Into<String>, target: Option<&str>) -> Self {
        self.insert(source, target.map(str::to_string));
        self
    }

    pub fn get(&self, source: &str) -> BoneMapEntry<'_> {
        match self.0.get(source) {
            Some(Some(target)) => BoneMapEntry::Mapped(target),
            Some(None) => BoneMapEntry::Dropped,
            None => BoneMapEntry::Unmapped,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical humanoid names mapped onto Mixamo's prefixed names.
    pub fn mixamo() -> Self {
        const BONES: [&str; 22] = [
            "Hips",
            "Spine",
            "Spine1",
            "Spine2",
            "Neck",
            "Head",
            "LeftShoulder",
            "LeftArm",
            "LeftForeArm",
            "LeftHand",
            "RightShoulder",
            "RightArm",
            "RightForeArm",
            "RightHand",
            "LeftUpLeg",
            "LeftLeg",
            "LeftFoot",
            "LeftToeBase",
            "RightUpLeg",
            "RightLeg",
            "RightFoot",
            "RightToeBase",
        ];
        let mut map: Self = BONES
            .iter()
            .map(|bone| (bone.to_string(), Some(format!("mixamorig:{}", bone))))
            .collect();
        map.insert("Tail", None);
        map
    }
}

impl FromIterator<(String, Option<String>)> for SkeletonBoneMap {
    fn from_iter<T: IntoIterator<Item = (String, Option<String>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Bone maps keyed by rig identifier, with a fallback for skeletons whose rig
/// is unknown or unset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoneMapRegistry {
    #[serde(default)]
    pub default: SkeletonBoneMap,
    #[serde(default)]
    pub rigs: HashMap<String, SkeletonBoneMap>,
}

impl BoneMapRegistry {
    pub fn new(default: SkeletonBoneMap) -> Self {
        Self {
            default,
            rigs: HashMap::new(),
        }
    }

    pub fn with_rig(mut self, rig: impl Into<String>, map: SkeletonBoneMap) -> Self {
        self.rigs.insert(rig.into(), map);
        self
    }

    pub fn for_rig(&self, rig: Option<&str>) -> &SkeletonBoneMap {
        rig.and_then(|rig| self.rigs.get(rig))
            .unwrap_or(&self.default)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_null_entry_drops_bone() {
        let map: SkeletonBoneMap =
            serde_json::from_str(r#"{ "Tail": null, "Hips": "pelvis" }"#).unwrap();
        assert_eq!(map.get("Tail"), BoneMapEntry::Dropped);
        assert_eq!(map.get("Hips"), BoneMapEntry::Mapped("pelvis"));
        assert_eq!(map.get("Head"), BoneMapEntry::Unmapped);
    }

    #[test]
    fn test_registry_falls_back_to_default() {
        let registry = BoneMapRegistry::new(SkeletonBoneMap::new().with("Tail", None))
            .with_rig("mixamo", SkeletonBoneMap::mixamo());
        assert_eq!(
            registry.for_rig(Some("mixamo")).get("Hips"),
            BoneMapEntry::Mapped("mixamorig:Hips")
        );
        assert_eq!(
            registry.for_rig(Some("unknown")).get("Tail"),
            BoneMapEntry::Dropped
        );
        assert_eq!(registry.for_rig(None).get("Hips"), BoneMapEntry::Unmapped);
    }

    #[test]
    fn test_parse_registry() {
        let registry: BoneMapRegistry = serde_json::from_str(
            r#"{ "rigs": { "creature": { "Tail": null } } }"#,
        )
        .unwrap();
        assert!(registry.default.is_empty());
        assert_eq!(
            registry.for_rig(Some("creature")).get("Tail"),
            BoneMapEntry::Dropped
        );
    }
}
