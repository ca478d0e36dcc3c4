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

//! The playback engine: owns the output context lifecycle and produces
//! low-latency, overlapping playback.
//!
//! The interesting part is activation. Platforms may refuse to render audio
//! until a resume request is issued and completed inside a real user input
//! callback, so `unlock` primes the pipeline with an inaudible voice, issues
//! the resume, and only reports Running once the output callback is actually
//! rendering. Concurrent unlock calls collapse onto a single in-flight
//! resume.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::audio::voice::BufferVoice;
use crate::audio::{Output, OutputError};
use crate::bank::SoundBank;

/// Frames of silence used to prime the pipeline inside a gesture.
const PRIMER_FRAMES: usize = 64;

/// Lifecycle of the process-wide playback context. There is exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Construction has not observed the output yet.
    Uninitialized,
    /// The output exists but is not rendering; an unlock is required.
    Suspended,
    /// A resume is in flight.
    Unlocking,
    /// The output callback is rendering.
    Running,
    /// The output is gone; the engine cannot be used.
    Failed,
}

/// Errors from the unlock protocol. Non-fatal unless the context is gone:
/// the caller may retry on the next gesture.
#[derive(Debug, thiserror::Error)]
pub enum UnlockError {
    #[error("resume refused: {0}")]
    ResumeRefused(String),

    #[error("playback context is gone")]
    ContextClosed,
}

/// Errors from a single trigger. Scoped to that trigger; the instrument
/// stays available for the next input.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("sound not loaded: {}", .0.display())]
    SoundNotLoaded(PathBuf),

    #[error("could not enqueue voice: {0}")]
    Enqueue(String),

    #[error("playback context is gone")]
    ContextClosed,
}

/// Owns the output context and turns trigger requests into voices.
pub struct PlaybackEngine {
    /// The opened output stream. One per application instance.
    output: Arc<dyn Output>,
    /// Decoded buffers, consulted at trigger time for availability.
    bank: Arc<SoundBank>,
    /// Context lifecycle state.
    state: Mutex<ContextState>,
    /// Collapses concurrent unlock calls onto one in-flight resume.
    unlock_gate: tokio::sync::Mutex<()>,
}

impl PlaybackEngine {
    /// Creates the engine over an opened output. Platforms with no usable
    /// audio pipeline fail earlier, at `Device::open`; that failure is fatal
    /// and reported once.
    pub fn new(output: Arc<dyn Output>, bank: Arc<SoundBank>) -> Self {
        let engine = Self {
            output,
            bank,
            state: Mutex::new(ContextState::Uninitialized),
            unlock_gate: tokio::sync::Mutex::new(()),
        };

        // Platforms whose streams start rendering on creation skip the
        // unlock protocol entirely.
        let initial = if engine.output.is_active() {
            ContextState::Running
        } else {
            ContextState::Suspended
        };
        *engine.state.lock() = initial;
        debug!(state = ?initial, "Playback engine created.");
        engine
    }

    /// The current context state.
    pub fn state(&self) -> ContextState {
        *self.state.lock()
    }

    /// Output sample rate, for decoding assets to match.
    pub fn sample_rate(&self) -> u32 {
        self.output.sample_rate()
    }

    /// Number of voices currently in flight.
    pub fn active_voices(&self) -> usize {
        self.output.active_voices()
    }

    /// Runs the activation protocol: prime (inside a gesture), resume, and
    /// confirm the output is rendering. Idempotent once Running; failure
    /// leaves the context Suspended for a retry on a later gesture.
    pub async fn unlock(&self, from_gesture: bool) -> Result<(), UnlockError> {
        if *self.state.lock() == ContextState::Running && self.output.is_active() {
            return Ok(());
        }

        // Concurrent unlocks collapse here: whoever holds the gate performs
        // the resume, everyone else observes the result.
        let _gate = self.unlock_gate.lock().await;
        if self.output.is_active() {
            *self.state.lock() = ContextState::Running;
            return Ok(());
        }

        *self.state.lock() = ContextState::Unlocking;
        if from_gesture {
            // Some platforms require an actual sound start within the
            // gesture call stack, independent of the resume request.
            if let Err(e) = self.output.enqueue(BufferVoice::primer(PRIMER_FRAMES)) {
                warn!(error = %e, "Could not enqueue primer voice.");
            }
        }

        let output = self.output.clone();
        let resumed = tokio::task::spawn_blocking(move || output.resume()).await;
        match resumed {
            Ok(Ok(())) if self.output.is_active() => {
                *self.state.lock() = ContextState::Running;
                info!(from_gesture, "Playback context unlocked.");
                Ok(())
            }
            Ok(Ok(())) => {
                *self.state.lock() = ContextState::Suspended;
                Err(UnlockError::ResumeRefused(
                    "resume completed but the output is not rendering".to_string(),
                ))
            }
            Ok(Err(OutputError::Closed)) => {
                *self.state.lock() = ContextState::Failed;
                Err(UnlockError::ContextClosed)
            }
            Ok(Err(e)) => {
                *self.state.lock() = ContextState::Suspended;
                Err(UnlockError::ResumeRefused(e.to_string()))
            }
            Err(e) => {
                *self.state.lock() = ContextState::Suspended;
                Err(UnlockError::ResumeRefused(format!(
                    "resume task failed: {}",
                    e
                )))
            }
        }
    }

    /// Starts one independent voice for the given sound with zero scheduling
    /// delay. Returns once the voice is enqueued, not when playback ends.
    /// Any number of triggers may be in flight concurrently; none cuts
    /// another off.
    pub async fn trigger(&self, sound: &Path, volume: f32) -> Result<(), TriggerError> {
        let buffer = self
            .bank
            .buffer_for(sound)
            .ok_or_else(|| TriggerError::SoundNotLoaded(sound.to_path_buf()))?;

        // Self-healing: a context that was Running but silently reverted to
        // suspended (e.g. after backgrounding) gets a best-effort
        // reactivation. A never-unlocked context is left alone; activation
        // belongs to the next user gesture.
        let reverted =
            *self.state.lock() == ContextState::Running && !self.output.is_active();
        if reverted {
            if let Err(e) = self.unlock(false).await {
                debug!(error = %e, "Best-effort reactivation failed.");
            }
        }

        let voice = BufferVoice::new(buffer.data(), buffer.channel_count(), volume);
        match self.output.enqueue(voice) {
            Ok(()) => {
                debug!(sound = %sound.display(), volume, "Voice enqueued.");
                Ok(())
            }
            Err(OutputError::Closed) => {
                *self.state.lock() = ContextState::Failed;
                Err(TriggerError::ContextClosed)
            }
            Err(e) => Err(TriggerError::Enqueue(e.to_string())),
        }
    }
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("state", &self.state())
            .field("active_voices", &self.active_voices())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::audio::{self, mock, Device as _};
    use crate::bank::DecodedBuffer;
    use crate::config;

    fn engine_with_mock(device: &str) -> (PlaybackEngine, Arc<mock::Output>, Arc<SoundBank>) {
        let config = config::Audio::with_device(device);
        let output = audio::get_device(&config)
            .unwrap()
            .open(&config)
            .unwrap();
        let mock = output.to_mock().unwrap();
        let bank = Arc::new(SoundBank::new(output.sample_rate()));
        (PlaybackEngine::new(output, bank.clone()), mock, bank)
    }

    fn loaded_sound(bank: &SoundBank, name: &str) -> PathBuf {
        let path = PathBuf::from(name);
        bank.insert_loaded(
            path.clone(),
            DecodedBuffer::from_samples(vec![0.5f32; 512], 1, 44100),
        );
        path
    }

    #[tokio::test]
    async fn test_unlock_transitions_to_running() {
        let (engine, mock, _) = engine_with_mock("mock");
        assert_eq!(engine.state(), ContextState::Suspended);

        engine.unlock(true).await.unwrap();
        assert_eq!(engine.state(), ContextState::Running);
        assert_eq!(mock.resume_calls(), 1);
        // The primer is enqueued inside the gesture, before the resume.
        assert_eq!(mock.log(), vec!["primer", "resume"]);
    }

    #[tokio::test]
    async fn test_unlock_is_idempotent_once_running() {
        let (engine, mock, _) = engine_with_mock("mock");
        engine.unlock(true).await.unwrap();
        engine.unlock(true).await.unwrap();
        engine.unlock(false).await.unwrap();
        assert_eq!(mock.resume_calls(), 1);
    }

    #[tokio::test]
    async fn test_unlock_without_gesture_skips_primer() {
        let (engine, mock, _) = engine_with_mock("mock");
        engine.unlock(false).await.unwrap();
        assert_eq!(mock.log(), vec!["resume"]);
    }

    #[tokio::test]
    async fn test_unlock_failure_leaves_suspended() {
        let (engine, mock, _) = engine_with_mock("mock");
        mock.set_resume_fails(true);

        assert!(engine.unlock(true).await.is_err());
        assert_eq!(engine.state(), ContextState::Suspended);

        // A later gesture retries the resume.
        mock.set_resume_fails(false);
        engine.unlock(true).await.unwrap();
        assert_eq!(engine.state(), ContextState::Running);
        assert_eq!(mock.resume_calls(), 2);
    }

    #[tokio::test]
    async fn test_already_running_platform_skips_unlock() {
        let (engine, mock, _) = engine_with_mock("mock-running");
        assert_eq!(engine.state(), ContextState::Running);

        engine.unlock(true).await.unwrap();
        assert_eq!(mock.resume_calls(), 0);
    }

    #[tokio::test]
    async fn test_trigger_not_loaded_fails_fast() {
        let (engine, mock, bank) = engine_with_mock("mock-running");

        let missing = PathBuf::from("missing.wav");
        let err = engine.trigger(&missing, 1.0).await.unwrap_err();
        assert!(matches!(err, TriggerError::SoundNotLoaded(_)));
        assert_eq!(mock.active_voices(), 0);

        // Failing repeatedly corrupts nothing; a healthy sound still plays.
        assert!(engine.trigger(&missing, 1.0).await.is_err());
        let healthy = loaded_sound(&bank, "healthy.wav");
        engine.trigger(&healthy, 1.0).await.unwrap();
        assert_eq!(mock.active_voices(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_do_not_cut_each_other() {
        let (engine, mock, bank) = engine_with_mock("mock-running");
        let kick = loaded_sound(&bank, "kick.wav");
        let snare = loaded_sound(&bank, "snare.wav");

        engine.trigger(&kick, 1.0).await.unwrap();
        engine.trigger(&kick, 1.0).await.unwrap();
        engine.trigger(&snare, 1.0).await.unwrap();
        assert_eq!(mock.active_voices(), 3);
    }

    #[tokio::test]
    async fn test_trigger_applies_volume() {
        let (engine, mock, bank) = engine_with_mock("mock-running");
        let kick = loaded_sound(&bank, "kick.wav");

        engine.trigger(&kick, 0.25).await.unwrap();
        let voices = mock.take_voices();
        assert_eq!(voices.len(), 1);
        assert!((voices[0].gain() - 0.25).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_trigger_self_heals_reverted_context() {
        let (engine, mock, bank) = engine_with_mock("mock");
        let kick = loaded_sound(&bank, "kick.wav");

        engine.unlock(true).await.unwrap();
        assert_eq!(mock.resume_calls(), 1);

        // Simulate the platform silently suspending the stream.
        mock.set_active(false);
        engine.trigger(&kick, 1.0).await.unwrap();
        assert_eq!(mock.resume_calls(), 2);
        assert_eq!(engine.state(), ContextState::Running);
    }

    #[tokio::test]
    async fn test_trigger_does_not_resume_never_unlocked_context() {
        let (engine, mock, bank) = engine_with_mock("mock");
        let kick = loaded_sound(&bank, "kick.wav");

        // Never unlocked: triggering enqueues (harmlessly, silence until
        // activation) but does not attempt a resume on its own.
        engine.trigger(&kick, 1.0).await.unwrap();
        assert_eq!(mock.resume_calls(), 0);
        assert_eq!(engine.state(), ContextState::Suspended);
    }

    #[test]
    fn test_unsupported_platform_fails_at_open() {
        let config = config::Audio::with_device("mock-unsupported");
        let device = audio::get_device(&config).unwrap();
        assert!(device.open(&config).is_err());
    }
}
