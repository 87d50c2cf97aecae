//! Per-slot load state.
//!
//! Every change to what a slot shows goes through [`SlotTable::transition`]
//! or [`SlotTable::commit`]. Both enable the incoming asset before the
//! outgoing one is disposed, within the same call.
use std::{collections::BTreeMap, sync::Arc};

use avatar_asset::{
    config::{Color, Gender, Slot},
    index::PartTag,
    skeleton::Skeleton,
};
use log::{debug, trace};

use crate::{part::PartAsset, staging::GenderReloadStaging};

#[derive(Debug, Default)]
enum Occupant {
    #[default]
    Vacant,
    Active(PartAsset),
    /// Superseded by a gender switch in progress, disposed on commit.
    Retired(PartAsset),
}

#[derive(Debug, Default)]
struct SlotEntry {
    occupant: Occupant,
    pending: Option<PartTag>,
    failed: Option<PartTag>,
}

impl SlotEntry {
    fn active(&self) -> Option<&PartAsset> {
        match &self.occupant {
            Occupant::Active(asset) => Some(asset),
            Occupant::Vacant | Occupant::Retired(_) => None,
        }
    }

    fn shown(&self) -> Option<&PartAsset> {
        match &self.occupant {
            Occupant::Active(asset) | Occupant::Retired(asset) => Some(asset),
            Occupant::Vacant => None,
        }
    }

    fn take(&mut self) -> Option<PartAsset> {
        match std::mem::take(&mut self.occupant) {
            Occupant::Active(asset) | Occupant::Retired(asset) => Some(asset),
            Occupant::Vacant => None,
        }
    }
}

/// What a slot is doing, as seen from outside.
#[derive(Debug)]
pub enum LoadState<'a> {
    Empty,
    Loading {
        requested: &'a PartTag,
        previous: Option<&'a PartAsset>,
    },
    Loaded(&'a PartAsset),
    Disposing(&'a PartAsset),
}

#[derive(Debug)]
pub enum SlotEvent {
    /// The configuration wants `tag` in the slot.
    Request(PartTag),
    /// A load finished.
    Arrive(PartAsset),
    /// A load failed.
    Fail(PartTag),
    /// The configuration wants the slot empty.
    Clear,
    /// A gender switch started; keep the occupant until commit.
    Retire { hide: bool },
    /// A gender switch was abandoned; the retired occupant is back.
    Restore,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    AlreadyLoaded,
    AlreadyLoading,
    PreviouslyFailed,
    /// The caller must start a load for the requested tag.
    LoadRequested,
    Enabled { replaced: Option<PartTag> },
    /// A late result that no longer matches the request.
    Discarded(PartTag),
    Failed { cleared: Option<PartTag> },
    Cleared(PartTag),
    Retired,
    Restored,
}

/// Hooks called while assets enter and leave the table.
pub trait SlotObserver {
    /// `asset` is about to become visible in `slot`.
    fn attaching(&mut self, slot: Slot, asset: &mut PartAsset);
    /// `asset` is about to be disposed.
    fn disposing(&mut self, slot: Slot, asset: &PartAsset);
}

impl SlotObserver for () {
    fn attaching(&mut self, _slot: Slot, _asset: &mut PartAsset) {}
    fn disposing(&mut self, _slot: Slot, _asset: &PartAsset) {}
}

#[derive(Debug, Default)]
pub struct SlotTable {
    entries: BTreeMap<Slot, SlotEntry>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, slot: Slot) -> &mut SlotEntry {
        self.entries.entry(slot).or_default()
    }

    fn dispose(observer: &mut impl SlotObserver, slot: Slot, asset: PartAsset) {
        observer.disposing(slot, &asset);
        asset.dispose();
    }

    pub fn state(&self, slot: Slot) -> LoadState<'_> {
        let Some(entry) = self.entries.get(&slot) else {
            return LoadState::Empty;
        };
        match (&entry.pending, &entry.occupant) {
            (Some(requested), _) => LoadState::Loading {
                requested,
                previous: entry.shown(),
            },
            (None, Occupant::Vacant) => LoadState::Empty,
            (None, Occupant::Active(asset)) => LoadState::Loaded(asset),
            (None, Occupant::Retired(asset)) => LoadState::Disposing(asset),
        }
    }

    pub fn transition(
        &mut self,
        slot: Slot,
        event: SlotEvent,
        observer: &mut impl SlotObserver,
    ) -> Transition {
        let entry = self.entry(slot);
        match event {
            SlotEvent::Request(tag) => {
                if entry.active().is_some_and(|asset| *asset.tag() == tag) {
                    if let Some(pending) = entry.pending.take() {
                        trace!("Cancel pending {} in {}", pending, slot);
                    }
                    entry.failed = None;
                    Transition::AlreadyLoaded
                } else if entry.pending.as_ref() == Some(&tag) {
                    Transition::AlreadyLoading
                } else if entry.failed.as_ref() == Some(&tag) {
                    Transition::PreviouslyFailed
                } else {
                    entry.failed = None;
                    entry.pending = Some(tag);
                    Transition::LoadRequested
                }
            }
            SlotEvent::Arrive(mut asset) => {
                if entry.pending.as_ref() != Some(asset.tag()) {
                    let tag = asset.tag().clone();
                    debug!("Discard stale {} in {}", tag, slot);
                    asset.dispose();
                    return Transition::Discarded(tag);
                }
                entry.pending = None;
                observer.attaching(slot, &mut asset);
                asset.set_enabled(true);
                let previous = std::mem::replace(&mut entry.occupant, Occupant::Active(asset));
                let replaced = match previous {
                    Occupant::Active(old) | Occupant::Retired(old) => {
                        let tag = old.tag().clone();
                        Self::dispose(observer, slot, old);
                        Some(tag)
                    }
                    Occupant::Vacant => None,
                };
                Transition::Enabled { replaced }
            }
            SlotEvent::Fail(tag) => {
                if entry.pending.as_ref() != Some(&tag) {
                    return Transition::Discarded(tag);
                }
                entry.pending = None;
                entry.failed = Some(tag);
                // A failed body keeps the previous one, any other slot ends
                // up empty.
                if !slot.is_optional() {
                    return Transition::Failed { cleared: None };
                }
                let cleared = entry.take().map(|old| {
                    let tag = old.tag().clone();
                    Self::dispose(observer, slot, old);
                    tag
                });
                Transition::Failed { cleared }
            }
            SlotEvent::Clear => {
                entry.pending = None;
                entry.failed = None;
                match entry.take() {
                    Some(old) => {
                        let tag = old.tag().clone();
                        Self::dispose(observer, slot, old);
                        Transition::Cleared(tag)
                    }
                    None => Transition::Unchanged,
                }
            }
            SlotEvent::Retire { hide } => {
                entry.pending = None;
                entry.failed = None;
                match std::mem::take(&mut entry.occupant) {
                    Occupant::Active(mut asset) | Occupant::Retired(mut asset) => {
                        if hide {
                            asset.set_enabled(false);
                        }
                        entry.occupant = Occupant::Retired(asset);
                        Transition::Retired
                    }
                    Occupant::Vacant => Transition::Unchanged,
                }
            }
            SlotEvent::Restore => match std::mem::take(&mut entry.occupant) {
                Occupant::Retired(mut asset) => {
                    asset.set_enabled(true);
                    entry.occupant = Occupant::Active(asset);
                    Transition::Restored
                }
                occupant => {
                    entry.occupant = occupant;
                    Transition::Unchanged
                }
            },
        }
    }

    /// Swap a fully loaded staging buffer in. Every staged asset is enabled
    /// first, then every previous occupant is disposed. Returns the slots
    /// that now hold an asset.
    pub fn commit(
        &mut self,
        staging: GenderReloadStaging,
        observer: &mut impl SlotObserver,
    ) -> Vec<Slot> {
        let gender = staging.gender();
        let (mut assets, failed) = staging.into_parts();
        for (slot, asset) in assets.iter_mut() {
            observer.attaching(*slot, asset);
            asset.set_enabled(true);
        }

        let mut previous = Vec::new();
        for (slot, entry) in self.entries.iter_mut() {
            entry.pending = None;
            entry.failed = None;
            if let Some(old) = entry.take() {
                previous.push((*slot, old));
            }
        }
        let committed: Vec<Slot> = assets.keys().copied().collect();
        for (slot, asset) in assets {
            self.entry(slot).occupant = Occupant::Active(asset);
        }
        for (slot, tag) in failed {
            self.entry(slot).failed = Some(tag);
        }
        for (slot, old) in previous {
            Self::dispose(observer, slot, old);
        }
        debug!("Committed {} slots of {}", committed.len(), gender);
        committed
    }

    pub fn loaded(&self, slot: Slot) -> Option<&PartAsset> {
        self.entries.get(&slot).and_then(SlotEntry::active)
    }

    pub fn loaded_tag(&self, slot: Slot) -> Option<&PartTag> {
        self.loaded(slot).map(PartAsset::tag)
    }

    pub fn failed(&self, slot: Slot) -> Option<&PartTag> {
        self.entries.get(&slot).and_then(|entry| entry.failed.as_ref())
    }

    /// Gender of the loaded body, or of any loaded part if the body is
    /// missing.
    pub fn loaded_gender(&self) -> Option<Gender> {
        self.loaded_tag(Slot::Body)
            .or_else(|| {
                Slot::ALL
                    .into_iter()
                    .find_map(|slot| self.loaded_tag(slot))
            })
            .map(|tag| tag.gender)
    }

    pub fn has_pending(&self) -> bool {
        self.entries.values().any(|entry| entry.pending.is_some())
    }

    pub fn has_retired(&self) -> bool {
        self.entries
            .values()
            .any(|entry| matches!(entry.occupant, Occupant::Retired(_)))
    }

    /// Every asset currently allocated, retired ones included.
    pub fn shown(&self) -> impl Iterator<Item = (Slot, &PartAsset)> {
        self.entries
            .iter()
            .filter_map(|(slot, entry)| entry.shown().map(|asset| (*slot, asset)))
    }

    pub fn skeletons(&self) -> Vec<Arc<Skeleton>> {
        Slot::ALL
            .into_iter()
            .filter_map(|slot| self.loaded(slot))
            .filter_map(|asset| asset.skeleton().cloned())
            .collect()
    }

    pub fn apply_colors(&mut self, color: impl Fn(Slot) -> Option<Color>) {
        for (slot, entry) in self.entries.iter_mut() {
            if let Occupant::Active(asset) = &mut entry.occupant {
                asset.apply_tint(color(*slot).unwrap_or_default());
            }
        }
    }

    pub fn apply_shadows(&mut self, cast: bool, receive: bool) {
        for entry in self.entries.values_mut() {
            if let Occupant::Active(asset) = &mut entry.occupant {
                asset.set_shadows(cast, receive);
            }
        }
    }

    /// Forget failures of required slots that are left without an asset, so
    /// the next request retries them. Returns the forgotten tags.
    pub fn expire_failures(&mut self) -> Vec<(Slot, PartTag)> {
        self.entries
            .iter_mut()
            .filter(|(slot, entry)| !slot.is_optional() && entry.shown().is_none())
            .filter_map(|(slot, entry)| entry.failed.take().map(|tag| (*slot, tag)))
            .collect()
    }

    /// Dispose everything, retired assets included.
    pub fn clear(&mut self, observer: &mut impl SlotObserver) {
        for (slot, entry) in self.entries.iter_mut() {
            entry.pending = None;
            if let Some(asset) = entry.take() {
                Self::dispose(observer, *slot, asset);
            }
        }
    }
}
