use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    config::{AvatarConfiguration, Gender, Slot},
    index::PartId,
};

/// Parts available to one gender, plus the animation pack whose clips are
/// shared by every part of that gender.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenderCatalog {
    pub animation_pack: Option<PartId>,
    #[serde(default)]
    pub slots: BTreeMap<Slot, Vec<PartId>>,
}

impl GenderCatalog {
    pub fn parts(&self, slot: Slot) -> &[PartId] {
        self.slots.get(&slot).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartCatalog {
    genders: BTreeMap<Gender, GenderCatalog>,
}

impl PartCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, gender: Gender, catalog: GenderCatalog) {
        self.genders.insert(gender, catalog);
    }

    pub fn with_gender(mut self, gender: Gender, catalog: GenderCatalog) -> Self {
        self.insert(gender, catalog);
        self
    }

    pub fn gender(&self, gender: Gender) -> Option<&GenderCatalog> {
        self.genders.get(&gender)
    }

    pub fn contains(&self, gender: Gender, slot: Slot, part_id: &PartId) -> bool {
        self.gender(gender)
            .is_some_and(|catalog| catalog.parts(slot).contains(part_id))
    }

    pub fn animation_pack(&self, gender: Gender) -> Option<&PartId> {
        self.gender(gender)
            .and_then(|catalog| catalog.animation_pack.as_ref())
    }

    /// First listed body of `gender`, every optional slot empty.
    pub fn default_configuration(&self, gender: Gender) -> Option<AvatarConfiguration> {
        let body = self.gender(gender)?.parts(Slot::Body).first()?;
        Some(AvatarConfiguration::new(gender, body.clone()))
    }
}
