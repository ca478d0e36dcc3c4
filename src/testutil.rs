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

//! Test fixtures for exercising the bank and engine with real audio files.

use std::f32::consts::PI;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

/// Writes a sine-wave WAV file, for decode and preload tests.
pub fn write_sine_wav(
    path: &Path,
    frequency: f32,
    duration_secs: f32,
    channels: u16,
    sample_rate: u32,
) {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).expect("could not create test wav");

    let frames = (sample_rate as f32 * duration_secs) as usize;
    for frame in 0..frames {
        let t = frame as f32 / sample_rate as f32;
        let sample = (0.5 * (2.0 * PI * frequency * t).sin() * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(sample).expect("could not write sample");
        }
    }
    writer.finalize().expect("could not finalize test wav");
}
