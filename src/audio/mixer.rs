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
// Core voice mixing logic that can be used by both the CPAL output and tests.

use parking_lot::RwLock;

use super::voice::BufferVoice;
use super::SourceSender;

/// An accumulating mixer of independent one-shot voices.
///
/// Voices are handed over from the trigger path via a channel so the audio
/// callback never contends with trigger-time locks. Every callback drains the
/// channel, mixes all live voices, and drops the ones that finished. There is
/// no voice limit and no stealing: concurrent voices never cut each other off.
pub struct AudioMixer {
    /// Voices currently playing.
    voices: RwLock<Vec<BufferVoice>>,
    /// Receiving side of the trigger-to-callback handoff.
    pending: crossbeam_channel::Receiver<BufferVoice>,
    /// Number of output channels.
    channels: u16,
    /// Output sample rate.
    sample_rate: u32,
    /// Gain applied to the mixed output.
    master_gain: f32,
}

impl AudioMixer {
    /// Creates a new mixer and the sender used to enqueue voices into it.
    pub fn new(channels: u16, sample_rate: u32, master_gain: f32) -> (Self, SourceSender) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (
            Self {
                voices: RwLock::new(Vec::new()),
                pending: rx,
                channels: channels.max(1),
                sample_rate,
                master_gain: master_gain.max(0.0),
            },
            tx,
        )
    }

    /// Mixes all live voices into the given interleaved buffer, zeroing it
    /// first. Newly enqueued voices are picked up at the top of the call, so
    /// a voice enqueued from a trigger starts on the very next buffer.
    pub fn mix_into(&self, output: &mut [f32]) {
        output.fill(0.0);

        let mut voices = self.voices.write();
        while let Ok(voice) = self.pending.try_recv() {
            voices.push(voice);
        }

        voices.retain_mut(|voice| voice.mix_into(output, self.channels));

        if self.master_gain != 1.0 {
            for sample in output.iter_mut() {
                *sample *= self.master_gain;
            }
        }
    }

    /// The number of voices currently playing, including enqueued voices the
    /// next mix pass will pick up.
    pub fn active_voices(&self) -> usize {
        self.voices.read().len() + self.pending.len()
    }

    /// Number of output channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Output sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
