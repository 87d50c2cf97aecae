use std::collections::{BTreeMap, BTreeSet};

use avatar_asset::{
    config::{Color, Gender, Slot},
    index::PartTag,
};

use crate::{error::LoadError, part::PartAsset, slot::SlotTable};

/// Lifecycle notifications published by the driver.
#[derive(Debug, Clone)]
pub enum AvatarEvent {
    SlotEnabled {
        slot: Slot,
        tag: PartTag,
    },
    SlotDisposed {
        slot: Slot,
        tag: PartTag,
    },
    LoadFailed {
        slot: Slot,
        tag: PartTag,
        error: LoadError,
    },
    /// A result arrived for a request that had been superseded.
    LoadDiscarded {
        slot: Slot,
        tag: PartTag,
    },
    GenderSwitchStarted {
        from: Option<Gender>,
        to: Gender,
    },
    GenderSwitchAbandoned {
        gender: Gender,
    },
    GenderCommitted {
        gender: Gender,
        slots: Vec<Slot>,
    },
    ClipsAttached {
        gender: Gender,
        clips: Vec<String>,
    },
    AnimationPackFailed {
        gender: Gender,
        error: LoadError,
    },
    Ready {
        generation: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotView {
    pub tag: PartTag,
    pub visible: bool,
    pub mesh_count: usize,
    pub casts_shadow: bool,
    pub receives_shadow: bool,
    pub tint: Color,
}

impl SlotView {
    fn new(asset: &PartAsset) -> Self {
        let meshes = asset.meshes();
        Self {
            tag: asset.tag().clone(),
            visible: asset.is_enabled(),
            mesh_count: meshes.len(),
            casts_shadow: meshes.iter().any(|mesh| mesh.casts_shadow),
            receives_shadow: meshes.iter().any(|mesh| mesh.receives_shadow),
            tint: meshes.first().map(|mesh| mesh.tint).unwrap_or_default(),
        }
    }
}

/// Snapshot of the composed avatar, published after every driver step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvatarView {
    pub slots: BTreeMap<Slot, SlotView>,
    /// Target gender of a switch that is still staging.
    pub switching_to: Option<Gender>,
}

impl AvatarView {
    pub(crate) fn new(table: &SlotTable, switching_to: Option<Gender>) -> Self {
        Self {
            slots: table
                .shown()
                .map(|(slot, asset)| (slot, SlotView::new(asset)))
                .collect(),
            switching_to,
        }
    }

    /// Tag shown in `slot`, if any is visible.
    pub fn visible(&self, slot: Slot) -> Option<&PartTag> {
        self.slots
            .get(&slot)
            .filter(|view| view.visible)
            .map(|view| &view.tag)
    }

    pub fn visible_genders(&self) -> BTreeSet<Gender> {
        self.slots
            .values()
            .filter(|view| view.visible)
            .map(|view| view.tag.gender)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
