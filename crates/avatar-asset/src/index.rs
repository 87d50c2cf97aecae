use std::{
    fmt::{self, Display, Formatter},
    sync::atomic::{AtomicUsize, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::config::Gender;

static ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Allocate a process-wide unique id for scene nodes and skeleton instances.
pub fn new_node_id() -> usize {
    ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Identifier of a part asset, as listed in the part catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartId(String);

impl PartId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PartId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<&str> for PartId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PartId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for PartId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Metadata attached to every imported part, used to tell whether a slot
/// already shows the requested asset.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartTag {
    pub gender: Gender,
    pub part_id: PartId,
}

impl PartTag {
    pub fn new(gender: Gender, part_id: impl Into<PartId>) -> Self {
        Self {
            gender,
            part_id: part_id.into(),
        }
    }
}

impl Display for PartTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.gender, self.part_id)
    }
}

/// Identity of one skeleton instance. Two imports of the same asset yield
/// different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SkeletonId(usize);

impl SkeletonId {
    pub(crate) fn next() -> Self {
        Self(new_node_id())
    }
}

impl Display for SkeletonId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
