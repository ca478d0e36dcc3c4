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
use serde::Deserialize;

const DEFAULT_DEVICE: &str = "default";

/// Default stream buffer size in frames. At 44.1kHz this is ~5.8ms of
/// latency per buffer, comfortably inside the trigger budget.
const DEFAULT_BUFFER_SIZE: u32 = 256;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Default, Debug)]
pub struct Audio {
    /// The audio output device, or "default" for the platform default.
    device: Option<String>,

    /// Requested stream buffer size in frames. Lower values mean lower
    /// trigger latency but more sensitivity to callback jitter.
    buffer_size: Option<u32>,

    /// Gain applied to the mixed output (default: 1.0).
    master_gain: Option<f32>,
}

impl Audio {
    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        self.device.as_deref().unwrap_or(DEFAULT_DEVICE)
    }

    /// Returns the requested stream buffer size in frames.
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }

    /// Returns the master gain, clamped to be non-negative.
    pub fn master_gain(&self) -> f32 {
        self.master_gain.unwrap_or(1.0).max(0.0)
    }
}

#[cfg(test)]
impl Audio {
    /// Creates an audio configuration for the given device (test only).
    pub fn with_device(device: &str) -> Audio {
        Audio {
            device: Some(device.to_string()),
            buffer_size: None,
            master_gain: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let audio = Audio::default();
        assert_eq!(audio.device(), "default");
        assert_eq!(audio.buffer_size(), 256);
        assert_eq!(audio.master_gain(), 1.0);
    }

    #[test]
    fn test_parse_overrides() {
        let audio: Audio =
            serde_yml::from_str("device: mock\nbuffer_size: 128\nmaster_gain: 0.5\n").unwrap();
        assert_eq!(audio.device(), "mock");
        assert_eq!(audio.buffer_size(), 128);
        assert_eq!(audio.master_gain(), 0.5);
    }

    #[test]
    fn test_negative_gain_clamped() {
        let audio: Audio = serde_yml::from_str("master_gain: -2.0\n").unwrap();
        assert_eq!(audio.master_gain(), 0.0);
    }
}
