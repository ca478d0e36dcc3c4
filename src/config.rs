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
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::zones::Zone;

pub mod audio;
pub mod zone;

pub use audio::Audio;
pub use zone::ZoneConfig;

/// Typed error for config load/parse failures so callers can distinguish
/// e.g. file-not-found from parse errors without string matching.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("could not parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_yml::Error,
    },

    #[error("invalid instrument configuration:\n- {}", .0.join("\n- "))]
    Invalid(Vec<String>),
}

/// A YAML representation of the whole instrument: the static, ordered list
/// of zone descriptors plus the audio section. Loaded once at startup and
/// treated as read-only.
#[derive(Deserialize, Debug)]
pub struct Instrument {
    /// Audio output configuration.
    #[serde(default)]
    audio: Audio,

    /// Whether pointer volume falls off with distance from the zone center.
    #[serde(default)]
    spatial_volume: bool,

    /// Directory holding the sound files, relative to the config file.
    assets: Option<String>,

    /// Zone descriptors, in presentation order.
    zones: Vec<ZoneConfig>,

    /// Directory of the config file itself, for resolving relative paths.
    #[serde(skip)]
    base: PathBuf,
}

impl Instrument {
    /// Parses an instrument configuration from a YAML file.
    pub fn parse(path: &Path) -> Result<Instrument, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut instrument: Instrument =
            serde_yml::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                source: e,
            })?;
        instrument.base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(instrument)
    }

    /// The audio configuration.
    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    /// Whether position-based volume falloff is enabled.
    pub fn spatial_volume(&self) -> bool {
        self.spatial_volume
    }

    /// The zone descriptors.
    pub fn zones(&self) -> &[ZoneConfig] {
        &self.zones
    }

    /// The directory sound files are resolved against.
    pub fn assets_dir(&self) -> PathBuf {
        match &self.assets {
            Some(assets) => {
                let assets = Path::new(assets);
                if assets.is_absolute() {
                    assets.to_path_buf()
                } else {
                    self.base.join(assets)
                }
            }
            None => self.base.clone(),
        }
    }

    /// Builds the runtime zones in configuration order.
    pub fn build_zones(&self) -> Vec<Zone> {
        let assets_dir = self.assets_dir();
        self.zones
            .iter()
            .map(|zone| zone.to_zone(&assets_dir))
            .collect()
    }

    /// The resolved sound paths to preload, deduplicated in zone order.
    pub fn sound_paths(&self) -> Vec<PathBuf> {
        let assets_dir = self.assets_dir();
        let mut paths = Vec::new();
        for zone in &self.zones {
            let path = zone.sound_path(&assets_dir);
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        paths
    }

    /// Verifies the configuration, returning every problem found rather
    /// than stopping at the first.
    pub fn verify(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.zones.is_empty() {
            problems.push("no zones configured".to_string());
        }

        let mut ids: HashMap<&str, ()> = HashMap::new();
        let mut keys: HashMap<String, &str> = HashMap::new();
        let assets_dir = self.assets_dir();

        for zone in &self.zones {
            if ids.insert(zone.id(), ()).is_some() {
                problems.push(format!("duplicate zone id {}", zone.id()));
            }

            for key in zone.keys() {
                if key.is_empty() {
                    problems.push(format!("zone {} has an empty key binding", zone.id()));
                    continue;
                }
                if let Some(holder) = keys.insert(key.to_lowercase(), zone.id()) {
                    problems.push(format!(
                        "key {} is bound to both {} and {}",
                        key,
                        holder,
                        zone.id()
                    ));
                }
            }

            let bounds = zone.bounds();
            if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
                problems.push(format!("zone {} has a degenerate bounds rectangle", zone.id()));
            }
            if bounds.x() < 0.0
                || bounds.y() < 0.0
                || bounds.x() + bounds.width() > 100.0
                || bounds.y() + bounds.height() > 100.0
            {
                problems.push(format!(
                    "zone {} bounds exceed the instrument surface (0-100%)",
                    zone.id()
                ));
            }

            if zone.volume() <= 0.0 {
                problems.push(format!("zone {} volume must be positive", zone.id()));
            }

            let sound = zone.sound_path(&assets_dir);
            if !sound.is_file() {
                problems.push(format!(
                    "zone {} sound file not found: {}",
                    zone.id(),
                    sound.display()
                ));
            }
        }

        problems
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const CONFIG: &str = r#"
audio:
  device: mock
  buffer_size: 128
spatial_volume: true
assets: sounds
zones:
  - id: kick
    name: Kick
    sound: kick.wav
    keys: [q]
    bounds: { x: 0, y: 0, width: 50, height: 100 }
  - id: snare
    sound: snare.wav
    keys: [w]
    bounds: { x: 50, y: 0, width: 50, height: 100 }
    volume: 0.8
"#;

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("instrument.yaml");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn touch_sounds(dir: &tempfile::TempDir, names: &[&str]) {
        let sounds = dir.path().join("sounds");
        fs::create_dir_all(&sounds).unwrap();
        for name in names {
            fs::File::create(sounds.join(name)).unwrap();
        }
    }

    #[test]
    fn test_parse_instrument() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, CONFIG);

        let instrument = Instrument::parse(&path).unwrap();
        assert_eq!(instrument.audio().device(), "mock");
        assert!(instrument.spatial_volume());
        assert_eq!(instrument.zones().len(), 2);
        assert_eq!(instrument.assets_dir(), dir.path().join("sounds"));

        let paths = instrument.sound_paths();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0], dir.path().join("sounds/kick.wav"));

        let zones = instrument.build_zones();
        assert_eq!(zones[1].base_volume(), 0.8);
    }

    #[test]
    fn test_verify_accepts_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, CONFIG);
        touch_sounds(&dir, &["kick.wav", "snare.wav"]);

        let instrument = Instrument::parse(&path).unwrap();
        assert!(instrument.verify().is_empty());
    }

    #[test]
    fn test_verify_reports_all_problems() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
zones:
  - id: kick
    sound: kick.wav
    keys: [q]
    bounds: { x: 0, y: 0, width: 0, height: 100 }
    volume: -1
  - id: kick
    sound: missing.wav
    keys: [Q]
    bounds: { x: 80, y: 0, width: 50, height: 100 }
"#,
        );
        touch_sounds(&dir, &["kick.wav"]);

        let instrument = Instrument::parse(&path).unwrap();
        let problems = instrument.verify();
        assert!(problems.iter().any(|p| p.contains("duplicate zone id")));
        // Key uniqueness is case-insensitive.
        assert!(problems.iter().any(|p| p.contains("bound to both")));
        assert!(problems.iter().any(|p| p.contains("degenerate bounds")));
        assert!(problems.iter().any(|p| p.contains("exceed the instrument")));
        assert!(problems.iter().any(|p| p.contains("volume must be positive")));
        assert!(problems.iter().any(|p| p.contains("sound file not found")));
    }

    #[test]
    fn test_shared_sounds_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
zones:
  - id: left
    sound: hit.wav
    keys: [a]
    bounds: { x: 0, y: 0, width: 50, height: 100 }
  - id: right
    sound: hit.wav
    keys: [b]
    bounds: { x: 50, y: 0, width: 50, height: 100 }
"#,
        );

        let instrument = Instrument::parse(&path).unwrap();
        assert_eq!(instrument.sound_paths().len(), 1);
    }

    #[test]
    fn test_parse_missing_file() {
        let err = Instrument::parse(Path::new("/does/not/exist.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_parse_bad_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "zones: [not a zone");
        assert!(matches!(
            Instrument::parse(&path).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }
}
