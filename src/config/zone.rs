// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::zones::{SpatialBounds, Zone};

/// A YAML representation of a zone's hit-test rectangle, in percent of the
/// instrument surface.
#[derive(Deserialize, Clone, Copy, Debug)]
pub struct BoundsConfig {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl BoundsConfig {
    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }
}

/// A YAML representation of one zone.
#[derive(Deserialize, Clone, Debug)]
pub struct ZoneConfig {
    /// Unique zone identifier.
    id: String,

    /// Human label shown by the presentation layer.
    name: Option<String>,

    /// The sound file this zone plays, relative to the assets directory.
    sound: String,

    /// Input keys bound to this zone. Keys must be unique across zones.
    #[serde(default)]
    keys: Vec<String>,

    /// Hit-test rectangle.
    bounds: BoundsConfig,

    /// Volume multiplier applied to every trigger of this zone.
    volume: Option<f32>,

    /// Element id of the zone's key-hint affordance.
    hint: Option<String>,
}

impl ZoneConfig {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn sound(&self) -> &str {
        &self.sound
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn bounds(&self) -> &BoundsConfig {
        &self.bounds
    }

    pub fn volume(&self) -> f32 {
        self.volume.unwrap_or(1.0)
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    /// Resolves the sound path against the assets directory.
    pub fn sound_path(&self, assets_dir: &Path) -> PathBuf {
        let sound = Path::new(&self.sound);
        if sound.is_absolute() {
            sound.to_path_buf()
        } else {
            assets_dir.join(sound)
        }
    }

    /// Builds the runtime zone entity.
    pub fn to_zone(&self, assets_dir: &Path) -> Zone {
        Zone::new(
            &self.id,
            self.name(),
            self.sound_path(assets_dir),
            self.keys.clone(),
            SpatialBounds {
                origin_x: self.bounds.x,
                origin_y: self.bounds.y,
                width: self.bounds.width,
                height: self.bounds.height,
            },
            self.volume(),
            self.hint.clone(),
        )
    }
}

#[cfg(test)]
impl ZoneConfig {
    /// Creates a new zone config (test only).
    pub fn new(id: &str, sound: &str, keys: Vec<String>, bounds: BoundsConfig) -> Self {
        Self {
            id: id.to_string(),
            name: None,
            sound: sound.to_string(),
            keys,
            bounds,
            volume: None,
            hint: None,
        }
    }
}

#[cfg(test)]
impl BoundsConfig {
    /// Creates new bounds (test only).
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_zone() {
        let config: ZoneConfig = serde_yml::from_str(
            r#"
id: kick
name: Kick Drum
sound: kick.wav
keys: [q, a]
bounds: { x: 0, y: 50, width: 50, height: 50 }
volume: 0.9
hint: hint-kick
"#,
        )
        .unwrap();

        assert_eq!(config.id(), "kick");
        assert_eq!(config.name(), "Kick Drum");
        assert_eq!(config.keys(), &["q".to_string(), "a".to_string()]);
        assert_eq!(config.volume(), 0.9);
        assert_eq!(config.hint(), Some("hint-kick"));

        let zone = config.to_zone(Path::new("/assets"));
        assert_eq!(zone.sound(), Path::new("/assets/kick.wav"));
        assert_eq!(zone.bounds().origin_y, 50.0);
    }

    #[test]
    fn test_defaults() {
        let config: ZoneConfig = serde_yml::from_str(
            "id: kick\nsound: kick.wav\nbounds: { x: 0, y: 0, width: 100, height: 100 }\n",
        )
        .unwrap();

        assert_eq!(config.name(), "kick");
        assert!(config.keys().is_empty());
        assert_eq!(config.volume(), 1.0);
        assert_eq!(config.hint(), None);
    }

    #[test]
    fn test_absolute_sound_path_kept() {
        let config: ZoneConfig = serde_yml::from_str(
            "id: kick\nsound: /sounds/kick.wav\nbounds: { x: 0, y: 0, width: 100, height: 100 }\n",
        )
        .unwrap();
        assert_eq!(
            config.sound_path(Path::new("/assets")),
            PathBuf::from("/sounds/kick.wav")
        );
    }
}
