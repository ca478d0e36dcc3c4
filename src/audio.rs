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
use std::{any::Any, error::Error, fmt, sync::Arc};

use crate::config;

pub mod cpal;
pub mod mixer;
pub mod mock;
pub mod thread_priority;
pub mod voice;

/// Channel for handing voices from the trigger path to the audio callback
/// without lock contention.
pub type SourceSender = crossbeam_channel::Sender<voice::BufferVoice>;

/// Errors from an opened output stream.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// The underlying stream refused or failed an operation.
    #[error("output stream error: {0}")]
    Stream(String),

    /// The output thread has shut down; the stream is gone.
    #[error("output stream closed")]
    Closed,
}

/// An audio output device that can open a playback stream.
pub trait Device: Any + fmt::Display + Send + Sync {
    /// Opens the output stream. The stream starts suspended on most
    /// platforms; it produces sound only after [`Output::resume`] completes.
    /// An error here means the platform offers no usable audio pipeline.
    fn open(&self, config: &config::Audio) -> Result<Arc<dyn Output>, Box<dyn Error>>;
}

/// A live (but possibly suspended) output stream.
pub trait Output: Send + Sync {
    /// Requests that the suspended stream begin rendering. Blocks until the
    /// output callback reports that it is actually running, then returns.
    /// Safe to call when already running.
    fn resume(&self) -> Result<(), OutputError>;

    /// True while the output callback is actively rendering.
    fn is_active(&self) -> bool;

    /// Enqueues a voice for playback on the next output buffer.
    fn enqueue(&self, voice: voice::BufferVoice) -> Result<(), OutputError>;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;

    /// Number of output channels.
    fn channel_count(&self) -> u16;

    /// Number of voices currently in flight.
    fn active_voices(&self) -> usize;

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<mock::Output>, Box<dyn Error>>;
}

/// Lists devices known to cpal.
pub fn list_devices() -> Result<Vec<Box<dyn Device>>, Box<dyn Error>> {
    cpal::Device::list()
}

/// Gets the device named in the audio configuration.
pub fn get_device(config: &config::Audio) -> Result<Arc<dyn Device>, Box<dyn Error>> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(device)));
    };

    Ok(Arc::new(cpal::Device::get(config)?))
}
