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
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::{Condvar, Mutex};
use tracing::{error, info, warn};

use super::mixer::AudioMixer;
use super::thread_priority::{
    callback_thread_priority, configure_audio_thread_priority, rt_audio_enabled,
};
use super::voice::BufferVoice;
use super::{OutputError, SourceSender};
use crate::config;

/// How long a resume request waits for the callback to report in before
/// giving up. A failed resume is non-fatal; the caller retries on the next
/// gesture.
const RESUME_WAIT: Duration = Duration::from_secs(2);

/// A small wrapper around a cpal::Device. Used for storing some extra
/// data that makes zone triggering more convenient.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
}

impl Device {
    /// Lists cpal devices as generic audio devices.
    pub fn list() -> Result<Vec<Box<dyn crate::audio::Device>>, Box<dyn Error>> {
        Ok(Self::list_cpal_devices()?
            .into_iter()
            .map(|device| Box::new(device) as Box<dyn crate::audio::Device>)
            .collect())
    }

    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        let mut devices = Vec::new();
        for host_id in cpal::available_hosts() {
            let host = cpal::host_from_id(host_id)?;
            for device in host.output_devices()? {
                devices.push(Device {
                    name: device.name()?,
                    host_id,
                    device,
                });
            }
        }
        Ok(devices)
    }

    /// Gets the device named in the audio configuration, or the platform
    /// default output device for the name "default".
    pub fn get(config: &config::Audio) -> Result<Device, Box<dyn Error>> {
        let name = config.device();
        if name == "default" {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or("no default audio output device found")?;
            return Ok(Device {
                name: device.name()?,
                host_id: host.id(),
                device,
            });
        }

        Self::list_cpal_devices()?
            .into_iter()
            .find(|device| device.name == name)
            .ok_or_else(|| format!("no audio output device found with name {}", name).into())
    }
}

impl crate::audio::Device for Device {
    fn open(
        &self,
        config: &config::Audio,
    ) -> Result<Arc<dyn crate::audio::Output>, Box<dyn Error>> {
        Ok(Arc::new(Output::open(self, config)?))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.name, self.host_id)
    }
}

/// Commands sent to the thread that owns the (non-Send) cpal stream.
enum Command {
    Resume,
}

/// State shared between the output handle, the stream thread, and the audio
/// callback.
struct StreamState {
    /// True while the callback is actively rendering.
    callback_active: AtomicBool,
    /// Total number of callback invocations, for diagnostics.
    callback_ticks: AtomicU64,
    /// Error recorded by the stream thread when a resume fails.
    resume_error: Mutex<Option<String>>,
    /// Guard/condvar pair for the resume handshake.
    signal: Mutex<()>,
    signalled: Condvar,
}

impl StreamState {
    fn new() -> Self {
        Self {
            callback_active: AtomicBool::new(false),
            callback_ticks: AtomicU64::new(0),
            resume_error: Mutex::new(None),
            signal: Mutex::new(()),
            signalled: Condvar::new(),
        }
    }

    /// Called from the audio callback on every invocation. The first call
    /// after a resume wakes any waiting resume request. The notify happens
    /// under the signal lock so a racing waiter cannot miss it.
    fn mark_active(&self) {
        self.callback_ticks.fetch_add(1, Ordering::Relaxed);
        if !self.callback_active.swap(true, Ordering::Release) {
            let _guard = self.signal.lock();
            self.signalled.notify_all();
        }
    }

    fn mark_inactive(&self) {
        self.callback_active.store(false, Ordering::Release);
        let _guard = self.signal.lock();
        self.signalled.notify_all();
    }

    fn record_resume_error(&self, error: String) {
        *self.resume_error.lock() = Some(error);
        let _guard = self.signal.lock();
        self.signalled.notify_all();
    }
}

/// A cpal-backed output stream.
///
/// The stream itself is not Send, so it lives on a dedicated thread; the
/// handle talks to it through a command channel and shared atomics. The
/// stream is built suspended and starts rendering only after a resume
/// request completes.
pub struct Output {
    name: String,
    sample_rate: u32,
    channels: u16,
    mixer: Arc<AudioMixer>,
    source_tx: SourceSender,
    cmd_tx: crossbeam_channel::Sender<Command>,
    state: Arc<StreamState>,
}

impl Output {
    /// Opens the output stream on the given device in a suspended state.
    pub fn open(device: &Device, config: &config::Audio) -> Result<Output, Box<dyn Error>> {
        let supported = device.device.default_output_config()?;
        let sample_format = supported.sample_format();
        let channels = supported.channels();
        let sample_rate = supported.sample_rate();

        let (mixer, source_tx) = AudioMixer::new(channels, sample_rate, config.master_gain());
        let mixer = Arc::new(mixer);
        let state = Arc::new(StreamState::new());
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();

        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate,
            // Explicit low-latency request. Triggers must reach the speaker
            // within one buffer of the input event.
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size()),
        };

        info!(
            device = device.name,
            sample_rate,
            channels,
            buffer_size = config.buffer_size(),
            format = ?sample_format,
            "Opening output stream."
        );

        Self::start_stream_thread(
            device.device.clone(),
            stream_config,
            sample_format,
            mixer.clone(),
            state.clone(),
            cmd_rx,
        )?;

        Ok(Output {
            name: device.name.clone(),
            sample_rate,
            channels,
            mixer,
            source_tx,
            cmd_tx,
            state,
        })
    }

    /// Spawns the thread that owns the stream. Returns once the stream has
    /// been built (or failed to build), so open can report unusable
    /// platforms synchronously.
    fn start_stream_thread(
        device: cpal::Device,
        stream_config: cpal::StreamConfig,
        sample_format: cpal::SampleFormat,
        mixer: Arc<AudioMixer>,
        state: Arc<StreamState>,
        cmd_rx: crossbeam_channel::Receiver<Command>,
    ) -> Result<(), Box<dyn Error>> {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), String>>();

        thread::spawn(move || {
            let stream = match Self::build_stream(
                &device,
                &stream_config,
                sample_format,
                mixer,
                state.clone(),
            ) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };

            // Stream commands until the output handle goes away, then let
            // the stream drop with this thread.
            while let Ok(command) = cmd_rx.recv() {
                match command {
                    Command::Resume => {
                        if let Err(e) = stream.play() {
                            warn!(error = %e, "Stream refused to start.");
                            state.record_resume_error(e.to_string());
                        }
                    }
                }
            }
        });

        ready_rx
            .recv()
            .map_err(|_| "output thread exited before reporting readiness")??;
        Ok(())
    }

    /// Builds the stream for the device's native sample format, falling back
    /// to the backend's default buffer size if the low-latency request is
    /// not supported.
    fn build_stream(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        sample_format: cpal::SampleFormat,
        mixer: Arc<AudioMixer>,
        state: Arc<StreamState>,
    ) -> Result<cpal::Stream, Box<dyn Error>> {
        let build = |config: &cpal::StreamConfig| match sample_format {
            cpal::SampleFormat::F32 => {
                Self::build_typed_stream::<f32>(device, config, mixer.clone(), state.clone())
            }
            cpal::SampleFormat::I16 => {
                Self::build_typed_stream::<i16>(device, config, mixer.clone(), state.clone())
            }
            cpal::SampleFormat::U16 => {
                Self::build_typed_stream::<u16>(device, config, mixer.clone(), state.clone())
            }
            other => Err(cpal::BuildStreamError::BackendSpecific {
                err: cpal::BackendSpecificError {
                    description: format!("unsupported sample format {:?}", other),
                },
            }),
        };

        match build(config) {
            Ok(stream) => Ok(stream),
            Err(e) => {
                warn!(
                    error = %e,
                    "Could not open stream with fixed buffer size, retrying with backend default."
                );
                let fallback = cpal::StreamConfig {
                    buffer_size: cpal::BufferSize::Default,
                    ..*config
                };
                Ok(build(&fallback)?)
            }
        }
    }

    fn build_typed_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mixer: Arc<AudioMixer>,
        state: Arc<StreamState>,
    ) -> Result<cpal::Stream, cpal::BuildStreamError>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let mut scratch: Vec<f32> = Vec::new();
        let mut priority_set = false;
        let priority = callback_thread_priority();
        let rt_audio = rt_audio_enabled();
        let err_state = state.clone();

        device.build_output_stream::<T, _, _>(
            config,
            move |data: &mut [T], _| {
                configure_audio_thread_priority(priority, rt_audio, &mut priority_set);
                state.mark_active();

                scratch.resize(data.len(), 0.0);
                mixer.mix_into(&mut scratch);
                for (out, mixed) in data.iter_mut().zip(scratch.iter()) {
                    *out = T::from_sample(*mixed);
                }
            },
            move |e| {
                error!(error = %e, "Output stream error.");
                err_state.mark_inactive();
            },
            None,
        )
    }
}

impl crate::audio::Output for Output {
    fn resume(&self) -> Result<(), OutputError> {
        if self.state.callback_active.load(Ordering::Acquire) {
            return Ok(());
        }

        self.state.resume_error.lock().take();
        self.cmd_tx
            .send(Command::Resume)
            .map_err(|_| OutputError::Closed)?;

        // Wait for the callback to actually report in. Activation is only
        // complete when the pipeline renders, not when play() returns.
        let mut guard = self.state.signal.lock();
        let deadline = std::time::Instant::now() + RESUME_WAIT;
        loop {
            if self.state.callback_active.load(Ordering::Acquire) {
                info!(
                    device = self.name,
                    ticks = self.state.callback_ticks.load(Ordering::Relaxed),
                    "Output stream running."
                );
                return Ok(());
            }
            if let Some(e) = self.state.resume_error.lock().take() {
                return Err(OutputError::Stream(e));
            }
            if self
                .state
                .signalled
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                if self.state.callback_active.load(Ordering::Acquire) {
                    return Ok(());
                }
                return Err(OutputError::Stream(
                    "stream did not start rendering".to_string(),
                ));
            }
        }
    }

    fn is_active(&self) -> bool {
        self.state.callback_active.load(Ordering::Acquire)
    }

    fn enqueue(&self, voice: BufferVoice) -> Result<(), OutputError> {
        self.source_tx.send(voice).map_err(|_| OutputError::Closed)
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn active_voices(&self) -> usize {
        self.mixer.active_voices()
    }

    #[cfg(test)]
    fn to_mock(&self) -> Result<Arc<super::mock::Output>, Box<dyn Error>> {
        Err("not a mock output".into())
    }
}
