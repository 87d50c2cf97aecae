use std::{io::Read, time::Duration};

use avatar_asset::bone_map::BoneMapRegistry;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay between starting the leader and starting its followers.
    pub settle_delay: Duration,
    pub walk_clip: String,
    pub idle_clip: String,
    /// Capacity of the lifecycle event broadcast channel.
    pub event_capacity: usize,
    pub cast_shadows: bool,
    pub receive_shadows: bool,
    /// Hide the old avatar while a gender switch is staging. When false the
    /// old avatar stays visible until the new one is committed.
    pub hide_during_gender_switch: bool,
    pub bone_maps: BoneMapRegistry,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(100),
            walk_clip: String::from("walk"),
            idle_clip: String::from("idle"),
            event_capacity: 256,
            cast_shadows: true,
            receive_shadows: true,
            hide_during_gender_switch: false,
            bone_maps: BoneMapRegistry::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, serde_json::Error> {
        serde_json::from_reader(reader)
    }

    /// Clips cloned onto every skeleton once the avatar has loaded.
    pub fn canonical_clips(&self) -> [&str; 2] {
        [&self.walk_clip, &self.idle_clip]
    }
}
