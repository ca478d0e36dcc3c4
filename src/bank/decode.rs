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

//! Decoding of sound assets into ready-to-play in-memory buffers.
//!
//! Assets are decoded entirely up front and resampled to the output rate, so
//! a trigger never touches the decoder. Uses symphonia, which covers WAV,
//! MP3, FLAC, OGG, and friends.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

/// Errors from loading a single sound asset. Scoped to that asset; the bank
/// never lets one failure affect its siblings.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("could not open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("unsupported or corrupt audio: {0}")]
    Format(String),

    #[error("no decodable audio track")]
    NoAudioTrack,

    #[error("sample rate missing from stream")]
    UnknownRate,
}

/// A fully decoded sound, interleaved f32 at the output sample rate.
///
/// The data is immutable once built and shared read-only between every voice
/// playing it.
#[derive(Clone, Debug)]
pub struct DecodedBuffer {
    /// Interleaved sample data.
    data: Arc<Vec<f32>>,
    /// Number of channels.
    channels: u16,
    /// Sample rate of the data (the output rate after resampling).
    sample_rate: u32,
}

impl DecodedBuffer {
    #[cfg(test)]
    pub fn from_samples(data: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            data: Arc::new(data),
            channels,
            sample_rate,
        }
    }

    /// The shared sample data.
    pub fn data(&self) -> Arc<Vec<f32>> {
        self.data.clone()
    }

    /// Number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channels
    }

    /// Sample rate of the data.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback duration.
    pub fn duration(&self) -> Duration {
        let frames = self.data.len() as f64 / self.channels.max(1) as f64;
        Duration::from_secs_f64(frames / self.sample_rate.max(1) as f64)
    }

    /// Memory footprint in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }
}

/// Decodes the file at the given path into an in-memory buffer at the target
/// sample rate.
pub fn decode_file(path: &Path, target_rate: u32) -> Result<DecodedBuffer, DecodeError> {
    let file = File::open(path).map_err(|e| DecodeError::Open {
        path: path.display().to_string(),
        source: e,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Format(e.to_string()))?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoAudioTrack)?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let source_rate = params.sample_rate.ok_or(DecodeError::UnknownRate)?;
    let mut decoder = get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Format(e.to_string()))?;

    let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            // End of stream.
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Format(e.to_string())),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                if channels == 0 {
                    channels = spec.channels.count() as u16;
                }
                let buf = sample_buf.get_or_insert_with(|| {
                    SampleBuffer::<f32>::new(decoded.capacity() as u64, spec)
                });
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // A corrupt packet is recoverable; skip it and keep decoding.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(path = %path.display(), error = e, "Skipping undecodable packet");
            }
            Err(e) => return Err(DecodeError::Format(e.to_string())),
        }
    }

    if channels == 0 || samples.is_empty() {
        return Err(DecodeError::NoAudioTrack);
    }

    let (data, sample_rate) = if source_rate != target_rate {
        debug!(
            path = %path.display(),
            source_rate,
            target_rate,
            "Resampling asset"
        );
        (
            resample_linear(&samples, channels, source_rate, target_rate),
            target_rate,
        )
    } else {
        (samples, source_rate)
    };

    Ok(DecodedBuffer {
        data: Arc::new(data),
        channels,
        sample_rate,
    })
}

/// Resamples interleaved audio using linear interpolation. Sufficient for
/// one-shot hits; the quality difference to a windowed-sinc resampler is
/// inaudible for this material.
fn resample_linear(samples: &[f32], channel_count: u16, source_rate: u32, target_rate: u32) -> Vec<f32> {
    let ratio = target_rate as f64 / source_rate as f64;
    let channels = channel_count as usize;
    let source_frames = samples.len() / channels;
    let target_frames = (source_frames as f64 * ratio).ceil() as usize;

    let mut output = Vec::with_capacity(target_frames * channels);
    for target_frame in 0..target_frames {
        let source_pos = target_frame as f64 / ratio;
        let source_frame = source_pos.floor() as usize;
        let frac = source_pos.fract() as f32;

        for channel in 0..channels {
            let idx0 = source_frame * channels + channel;
            let idx1 = (source_frame + 1) * channels + channel;

            let s0 = samples.get(idx0).copied().unwrap_or(0.0);
            let s1 = samples.get(idx1).copied().unwrap_or(s0);

            output.push(s0 + (s1 - s0) * frac);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn test_decode_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hit.wav");
        testutil::write_sine_wav(&path, 440.0, 0.1, 1, 44100);

        let buffer = decode_file(&path, 44100).unwrap();
        assert_eq!(buffer.channel_count(), 1);
        assert_eq!(buffer.sample_rate(), 44100);
        // 0.1s at 44100Hz.
        assert!((buffer.duration().as_secs_f64() - 0.1).abs() < 0.01);
        assert!(buffer.data().iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn test_decode_resamples_to_output_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hit.wav");
        testutil::write_sine_wav(&path, 440.0, 0.1, 1, 22050);

        let buffer = decode_file(&path, 44100).unwrap();
        assert_eq!(buffer.sample_rate(), 44100);
        assert!((buffer.duration().as_secs_f64() - 0.1).abs() < 0.01);
    }

    #[test]
    fn test_decode_missing_file() {
        let err = decode_file(Path::new("/does/not/exist.wav"), 44100).unwrap_err();
        assert!(matches!(err, DecodeError::Open { .. }));
    }

    #[test]
    fn test_decode_garbage_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-audio.wav");
        std::fs::write(&path, b"this is not a wav file at all").unwrap();

        assert!(decode_file(&path, 44100).is_err());
    }

    #[test]
    fn test_resample_linear_length() {
        let source: Vec<f32> = (0..4410).map(|i| (i as f32 / 4410.0).sin()).collect();
        let resampled = resample_linear(&source, 1, 44100, 48000);

        let expected = (4410.0_f64 * 48000.0 / 44100.0).ceil() as usize;
        assert_eq!(resampled.len(), expected);
    }

    #[test]
    fn test_resample_linear_preserves_channels() {
        // Stereo: L=1.0, R=-1.0 throughout.
        let source = vec![1.0f32, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0];
        let resampled = resample_linear(&source, 2, 44100, 48000);

        assert!(resampled.len() >= 8);
        assert!((resampled[0] - 1.0).abs() < 0.1);
        assert!((resampled[1] + 1.0).abs() < 0.1);
    }
}
