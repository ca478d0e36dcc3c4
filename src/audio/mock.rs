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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use tracing::info;

use super::voice::BufferVoice;
use super::OutputError;
use crate::config;

/// A mock device. Doesn't actually produce sound.
///
/// Selected by any configured device name starting with `mock`. Name variants
/// tweak behavior for tests:
/// - `mock-running`: the stream reports active immediately, like platforms
///   whose contexts start running.
/// - `mock-unsupported`: `open` fails, like a platform with no audio pipeline.
pub struct Device {
    name: String,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
        }
    }
}

impl crate::audio::Device for Device {
    fn open(&self, _: &config::Audio) -> Result<Arc<dyn crate::audio::Output>, Box<dyn Error>> {
        if self.name == "mock-unsupported" {
            return Err("no usable audio pipeline on this platform".into());
        }
        info!(device = self.name, "Opening mock output.");
        Ok(Arc::new(Output::new(&self.name)))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

/// A mock output stream that records resume calls and enqueued voices, and
/// whose active state can be toggled to simulate silent suspension.
#[derive(Clone)]
pub struct Output {
    name: String,
    active: Arc<AtomicBool>,
    resume_fails: Arc<AtomicBool>,
    resume_calls: Arc<AtomicUsize>,
    voices: Arc<Mutex<Vec<BufferVoice>>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl Output {
    fn new(name: &str) -> Output {
        Output {
            name: name.to_string(),
            active: Arc::new(AtomicBool::new(name == "mock-running")),
            resume_fails: Arc::new(AtomicBool::new(false)),
            resume_calls: Arc::new(AtomicUsize::new(0)),
            voices: Arc::new(Mutex::new(Vec::new())),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of times resume has been requested.
    pub fn resume_calls(&self) -> usize {
        self.resume_calls.load(Ordering::Relaxed)
    }

    /// Makes subsequent resume requests fail, like a platform refusing to
    /// start audio outside a user gesture.
    pub fn set_resume_fails(&self, fails: bool) {
        self.resume_fails.store(fails, Ordering::Relaxed);
    }

    /// Toggles the active state directly, e.g. to simulate the stream being
    /// silently suspended after backgrounding.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Relaxed);
    }

    /// Takes all voices enqueued so far.
    pub fn take_voices(&self) -> Vec<BufferVoice> {
        std::mem::take(&mut *self.voices.lock())
    }

    /// The ordered log of operations ("resume", "primer", "voice").
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    /// Appends an entry to the operation log. Tests share this log with
    /// other collaborators (e.g. a visual-activation hook) to assert
    /// cross-component ordering.
    pub fn log_entry(&self, entry: &str) {
        self.log.lock().push(entry.to_string());
    }
}

impl crate::audio::Output for Output {
    fn resume(&self) -> Result<(), OutputError> {
        self.resume_calls.fetch_add(1, Ordering::Relaxed);
        self.log_entry("resume");
        if self.resume_fails.load(Ordering::Relaxed) {
            return Err(OutputError::Stream("resume refused".to_string()));
        }
        self.active.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    fn enqueue(&self, voice: BufferVoice) -> Result<(), OutputError> {
        self.log_entry(if voice.is_primer() { "primer" } else { "voice" });
        self.voices.lock().push(voice);
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        44100
    }

    fn channel_count(&self) -> u16 {
        2
    }

    fn active_voices(&self) -> usize {
        self.voices.lock().len()
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<Output>, Box<dyn Error>> {
        Ok(Arc::new(self.clone()))
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock output)", self.name)
    }
}
