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

//! The sound bank: decoded, ready-to-play buffers for every configured asset.
//!
//! All assets are loaded at startup with an all-settle policy so one bad
//! file never blocks the rest of the instrument. Zones bound to a failed
//! asset simply stay silent when triggered.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tokio::sync::mpsc::Sender;
use tokio::task::JoinSet;
use tracing::{info, warn};

pub mod decode;

pub use decode::{DecodeError, DecodedBuffer};

/// Load state of one sound asset. Transitions from Pending to Loaded or
/// Failed exactly once; assets are never reloaded automatically.
pub enum LoadState {
    /// Load in flight.
    Pending,
    /// Decoded and ready to play.
    Loaded(DecodedBuffer),
    /// Fetch or decode failed; the cause is kept for reporting.
    Failed(String),
}

/// Progress and error signals emitted while preloading, for any progress UI.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadEvent {
    /// Preload has started for the given number of assets.
    Started { total: usize },
    /// One more asset has settled (loaded or failed). Fires exactly once
    /// per asset.
    Progress { settled: usize, total: usize },
    /// A specific asset failed; other loads continue.
    AssetFailed { path: PathBuf, cause: String },
    /// Every asset has settled.
    Settled { loaded: usize, failed: usize },
}

/// Totals from a preload pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub failed: usize,
}

/// Holds every decoded sound buffer, keyed by asset path.
pub struct SoundBank {
    /// Asset states by path.
    assets: RwLock<HashMap<PathBuf, LoadState>>,
    /// Output sample rate each asset is resampled to.
    target_rate: u32,
}

impl SoundBank {
    /// Creates a bank that decodes to the given output sample rate.
    pub fn new(target_rate: u32) -> Self {
        Self {
            assets: RwLock::new(HashMap::new()),
            target_rate,
        }
    }

    /// Loads and decodes every path concurrently, settling all of them
    /// before returning. A failed asset records its cause and does not
    /// abort sibling loads. Progress events are sent after every settled
    /// asset when an event channel is provided.
    pub async fn preload_all(
        &self,
        paths: Vec<PathBuf>,
        events: Option<Sender<LoadEvent>>,
    ) -> LoadSummary {
        let mut unique: Vec<PathBuf> = Vec::new();
        for path in paths {
            if !unique.contains(&path) {
                unique.push(path);
            }
        }
        let total = unique.len();

        Self::emit(&events, LoadEvent::Started { total }).await;
        info!(total, "Preloading sound assets.");

        let mut loaded = 0usize;
        let mut failed = 0usize;
        let mut settled = 0usize;
        let mut tasks: JoinSet<(PathBuf, Result<DecodedBuffer, DecodeError>)> = JoinSet::new();

        for path in unique {
            // Assets settle exactly once; anything already present keeps its
            // state and just counts toward this pass.
            let existing = {
                let mut assets = self.assets.write();
                let state = match assets.get(&path) {
                    None => None,
                    Some(LoadState::Loaded(_)) => Some(true),
                    Some(LoadState::Failed(_)) => Some(false),
                    Some(LoadState::Pending) => {
                        warn!(path = %path.display(), "Asset is already loading");
                        Some(false)
                    }
                };
                if state.is_none() {
                    assets.insert(path.clone(), LoadState::Pending);
                }
                state
            };

            match existing {
                Some(was_loaded) => {
                    if was_loaded {
                        loaded += 1;
                    } else {
                        failed += 1;
                    }
                    settled += 1;
                    Self::emit(&events, LoadEvent::Progress { settled, total }).await;
                }
                None => {
                    let target_rate = self.target_rate;
                    tasks.spawn(async move {
                        let decode_path = path.clone();
                        let result = tokio::task::spawn_blocking(move || {
                            decode::decode_file(&decode_path, target_rate)
                        })
                        .await;
                        match result {
                            Ok(result) => (path, result),
                            Err(e) => (
                                path,
                                Err(DecodeError::Format(format!("decode task failed: {}", e))),
                            ),
                        }
                    });
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            let Ok((path, result)) = joined else {
                // A panicking decode task already detached from its path;
                // nothing to record.
                continue;
            };

            match result {
                Ok(buffer) => {
                    info!(
                        path = %path.display(),
                        channels = buffer.channel_count(),
                        duration_ms = buffer.duration().as_millis(),
                        memory_kb = buffer.memory_size() / 1024,
                        "Sound asset loaded."
                    );
                    self.assets
                        .write()
                        .insert(path, LoadState::Loaded(buffer));
                    loaded += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Sound asset failed to load.");
                    let cause = e.to_string();
                    self.assets
                        .write()
                        .insert(path.clone(), LoadState::Failed(cause.clone()));
                    failed += 1;
                    Self::emit(&events, LoadEvent::AssetFailed { path, cause }).await;
                }
            }
            settled += 1;
            Self::emit(&events, LoadEvent::Progress { settled, total }).await;
        }

        info!(loaded, failed, "Sound assets settled.");
        Self::emit(&events, LoadEvent::Settled { loaded, failed }).await;
        LoadSummary { loaded, failed }
    }

    /// True if the asset at the given path decoded successfully.
    pub fn is_loaded(&self, path: &Path) -> bool {
        matches!(self.assets.read().get(path), Some(LoadState::Loaded(_)))
    }

    /// The decoded buffer for the given path, if it loaded.
    pub fn buffer_for(&self, path: &Path) -> Option<DecodedBuffer> {
        match self.assets.read().get(path) {
            Some(LoadState::Loaded(buffer)) => Some(buffer.clone()),
            _ => None,
        }
    }

    /// The recorded failure cause for the given path, if it failed.
    pub fn failure_for(&self, path: &Path) -> Option<String> {
        match self.assets.read().get(path) {
            Some(LoadState::Failed(cause)) => Some(cause.clone()),
            _ => None,
        }
    }

    /// Total memory used by decoded buffers.
    pub fn memory_usage(&self) -> usize {
        self.assets
            .read()
            .values()
            .map(|state| match state {
                LoadState::Loaded(buffer) => buffer.memory_size(),
                _ => 0,
            })
            .sum()
    }

    async fn emit(events: &Option<Sender<LoadEvent>>, event: LoadEvent) {
        if let Some(events) = events {
            // A departed progress consumer never blocks loading.
            let _ = events.send(event).await;
        }
    }
}

#[cfg(test)]
impl SoundBank {
    /// Installs an already-decoded buffer (test only).
    pub fn insert_loaded(&self, path: PathBuf, buffer: DecodedBuffer) {
        self.assets.write().insert(path, LoadState::Loaded(buffer));
    }

    /// Marks an asset as failed (test only).
    pub fn insert_failed(&self, path: PathBuf, cause: &str) {
        self.assets
            .write()
            .insert(path, LoadState::Failed(cause.to_string()));
    }
}

impl std::fmt::Debug for SoundBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundBank")
            .field("assets", &self.assets.read().len())
            .field("target_rate", &self.target_rate)
            .field("memory_kb", &(self.memory_usage() / 1024))
            .finish()
    }
}
