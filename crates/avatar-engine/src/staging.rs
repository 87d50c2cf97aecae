use std::collections::BTreeMap;

use avatar_asset::{
    config::{Gender, Slot},
    index::PartTag,
};
use log::debug;

use crate::part::PartAsset;

/// Side buffer filled while a gender switch loads the new avatar.
///
/// Nothing in here is visible. The buffer is either committed to the slot
/// table as a whole or disposed as a whole.
#[derive(Debug)]
pub struct GenderReloadStaging {
    gender: Gender,
    assets: BTreeMap<Slot, PartAsset>,
    failed: BTreeMap<Slot, PartTag>,
}

impl GenderReloadStaging {
    pub fn new(gender: Gender) -> Self {
        Self {
            gender,
            assets: BTreeMap::new(),
            failed: BTreeMap::new(),
        }
    }

    pub fn gender(&self) -> Gender {
        self.gender
    }

    pub fn insert(&mut self, slot: Slot, asset: PartAsset) {
        if let Some(previous) = self.assets.insert(slot, asset) {
            previous.dispose();
        }
    }

    /// Record a slot whose load failed. The slot stays absent after commit.
    pub fn fail(&mut self, slot: Slot, tag: PartTag) {
        self.failed.insert(slot, tag);
    }

    pub fn asset(&self, slot: Slot) -> Option<&PartAsset> {
        self.assets.get(&slot)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.assets.keys().copied()
    }

    pub(crate) fn into_parts(self) -> (BTreeMap<Slot, PartAsset>, BTreeMap<Slot, PartTag>) {
        (self.assets, self.failed)
    }

    /// Throw away an abandoned switch.
    pub fn dispose(self) {
        debug!(
            "Discard {} staged {} parts",
            self.assets.len(),
            self.gender
        );
        self.assets.into_values().for_each(PartAsset::dispose);
    }
}
