use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

use serde::{Deserialize, Serialize};

use crate::index::{PartId, PartTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Display for Gender {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
        }
    }
}

/// Attachment point on the avatar. `Body` is always present, every other
/// slot may be empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Body,
    Hair,
    Top,
    Bottom,
    Shoes,
    Fullset,
    Accessory,
}

impl Slot {
    /// All slots, body first.
    pub const ALL: [Slot; 7] = [
        Slot::Body,
        Slot::Hair,
        Slot::Top,
        Slot::Bottom,
        Slot::Shoes,
        Slot::Fullset,
        Slot::Accessory,
    ];

    pub fn is_optional(self) -> bool {
        !matches!(self, Slot::Body)
    }
}

impl Display for Slot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Body => write!(f, "body"),
            Slot::Hair => write!(f, "hair"),
            Slot::Top => write!(f, "top"),
            Slot::Bottom => write!(f, "bottom"),
            Slot::Shoes => write!(f, "shoes"),
            Slot::Fullset => write!(f, "fullset"),
            Slot::Accessory => write!(f, "accessory"),
        }
    }
}

/// Linear RGBA tint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub [f32; 4]);

impl Color {
    pub const WHITE: Color = Color([1.0, 1.0, 1.0, 1.0]);

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self([r, g, b, 1.0])
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Immutable snapshot of what the avatar should look like.
///
/// A slot missing from `parts` is treated the same as a slot mapped to
/// `null`: nothing is requested for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvatarConfiguration {
    pub gender: Gender,
    #[serde(default)]
    pub parts: BTreeMap<Slot, Option<PartId>>,
    #[serde(default)]
    pub colors: BTreeMap<Slot, Color>,
}

impl AvatarConfiguration {
    pub fn new(gender: Gender, body: impl Into<PartId>) -> Self {
        let mut parts = BTreeMap::new();
        parts.insert(Slot::Body, Some(body.into()));
        Self {
            gender,
            parts,
            colors: BTreeMap::new(),
        }
    }

    pub fn with_part(mut self, slot: Slot, part: Option<PartId>) -> Self {
        self.parts.insert(slot, part);
        self
    }

    pub fn with_color(mut self, slot: Slot, color: Color) -> Self {
        self.colors.insert(slot, color);
        self
    }

    pub fn part(&self, slot: Slot) -> Option<&PartId> {
        self.parts.get(&slot).and_then(Option::as_ref)
    }

    pub fn color(&self, slot: Slot) -> Option<Color> {
        self.colors.get(&slot).copied()
    }

    pub fn requested_tag(&self, slot: Slot) -> Option<PartTag> {
        self.part(slot)
            .map(|part_id| PartTag::new(self.gender, part_id.clone()))
    }

    /// Every non-null slot request, body first.
    pub fn requested(&self) -> impl Iterator<Item = (Slot, PartTag)> + '_ {
        Slot::ALL
            .into_iter()
            .filter_map(|slot| self.requested_tag(slot).map(|tag| (slot, tag)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_configuration() {
        let json = r#"{
            "gender": "female",
            "parts": { "body": "B2", "hair": "H1", "shoes": null },
            "colors": { "hair": [0.5, 0.2, 0.1, 1.0] }
        }"#;
        let configuration: AvatarConfiguration = serde_json::from_str(json).unwrap();
        assert_eq!(configuration.gender, Gender::Female);
        assert_eq!(configuration.part(Slot::Body), Some(&PartId::from("B2")));
        assert_eq!(configuration.part(Slot::Shoes), None);
        assert_eq!(configuration.part(Slot::Top), None);
        assert_eq!(
            configuration.color(Slot::Hair),
            Some(Color([0.5, 0.2, 0.1, 1.0]))
        );
    }

    #[test]
    fn test_requested_body_first() {
        let configuration = AvatarConfiguration::new(Gender::Male, "B1")
            .with_part(Slot::Accessory, Some("A1".into()))
            .with_part(Slot::Hair, Some("H1".into()))
            .with_part(Slot::Top, None);
        let slots: Vec<_> = configuration.requested().map(|(slot, _)| slot).collect();
        assert_eq!(slots, vec![Slot::Body, Slot::Hair, Slot::Accessory]);
        let (_, tag) = configuration.requested().next().unwrap();
        assert_eq!(tag, PartTag::new(Gender::Male, "B1"));
    }
}
