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

//! The input dispatcher: glues raw pointer/touch/keyboard events to zone
//! triggers.
//!
//! This is where the latency contract is enforced. For every resolved input:
//! visual activation first, then (once, on the first-ever input) the
//! gesture-synchronous unlock, then the audio trigger. Nothing thrown by the
//! audio path escapes a handler; a missed sound degrades one trigger, never
//! the instrument.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::engine::PlaybackEngine;
use crate::zones::{Zone, ZoneRegistry};

/// Where a trigger came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pointer,
    Touch,
    Keyboard,
}

/// A raw input event, as delivered by the embedding shell.
#[derive(Debug, Clone, PartialEq)]
pub enum RawInput {
    /// A press on the instrument surface, in percent coordinates.
    PointerDown { x: f32, y: f32, touch: bool },
    /// A press on a named presentation element (a zone's own element or its
    /// key-hint companion).
    ElementDown { element_id: String, touch: bool },
    /// A key press. `key` is the logical key, `code` the physical one.
    KeyDown {
        key: String,
        code: String,
        ctrl: bool,
        alt: bool,
        meta: bool,
    },
}

/// Whether the dispatcher acted on an input. A consumed input's default
/// behavior (scrolling, text selection) should be suppressed by the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Ignored,
    Consumed,
}

/// Normalizes raw input into zone triggers, with focus and enablement
/// gating.
pub struct InputDispatcher {
    registry: Arc<ZoneRegistry>,
    engine: Arc<PlaybackEngine>,
    /// Master switch; disabled inputs are ignored entirely.
    enabled: AtomicBool,
    /// Keyboard gate; background instances must not absorb keystrokes.
    has_focus: AtomicBool,
    /// Latched after the first unlock attempt, successful or not, so a
    /// refusing platform cannot add unlock latency to every later event.
    audio_unlocked: AtomicBool,
    /// Whether pointer volume falls off with distance from the zone center.
    spatial_volume: bool,
}

impl InputDispatcher {
    pub fn new(
        registry: Arc<ZoneRegistry>,
        engine: Arc<PlaybackEngine>,
        spatial_volume: bool,
    ) -> InputDispatcher {
        InputDispatcher {
            registry,
            engine,
            enabled: AtomicBool::new(true),
            has_focus: AtomicBool::new(true),
            audio_unlocked: AtomicBool::new(false),
            spatial_volume,
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Tracks window focus; called by the shell on focus/blur.
    pub fn set_focus(&self, has_focus: bool) {
        debug!(has_focus, "Focus changed");
        self.has_focus.store(has_focus, Ordering::Relaxed);
    }

    pub fn has_focus(&self) -> bool {
        self.has_focus.load(Ordering::Relaxed)
    }

    /// True once the first unlock attempt has happened.
    pub fn audio_unlocked(&self) -> bool {
        self.audio_unlocked.load(Ordering::Relaxed)
    }

    /// Handles one raw input to completion. Each event is processed fully
    /// before the next is dequeued; only the one-time unlock suspends.
    pub async fn handle(&self, input: RawInput) -> Dispatch {
        if !self.enabled.load(Ordering::Relaxed) {
            return Dispatch::Ignored;
        }
        if matches!(input, RawInput::KeyDown { .. }) && !self.has_focus() {
            return Dispatch::Ignored;
        }

        // An input that resolves to no zone has no side effects at all.
        let Some((zone, source, volume)) = self.resolve(&input) else {
            return Dispatch::Ignored;
        };
        debug!(zone = zone.id(), source = ?source, volume, "Input resolved");

        // Visual feedback is unconditional and never waits on audio.
        self.registry.signal_activated(zone.id());

        if !self.audio_unlocked.load(Ordering::Relaxed) {
            // The unlock must settle within the same input callback that
            // reported the gesture, before playback is attempted.
            let unlocked = self.engine.unlock(true).await;
            self.audio_unlocked.store(true, Ordering::Relaxed);
            if let Err(e) = unlocked {
                warn!(error = %e, "Audio unlock failed; staying silent until reactivation");
            }
        }

        if let Err(e) = self.engine.trigger(zone.sound(), volume).await {
            // Swallowed: a missed sound is log-worthy, never fatal.
            warn!(zone = zone.id(), error = %e, "Trigger failed");
        }

        Dispatch::Consumed
    }

    /// Resolves an input to its zone, source kind, and final volume.
    fn resolve(&self, input: &RawInput) -> Option<(Arc<Zone>, SourceKind, f32)> {
        match input {
            RawInput::PointerDown { x, y, touch } => {
                let zone = self.registry.resolve_by_point(*x, *y)?;
                let multiplier = if self.spatial_volume {
                    zone.bounds().falloff_at(*x, *y)
                } else {
                    1.0
                };
                let volume = zone.base_volume() * multiplier;
                Some((zone, Self::pointer_kind(*touch), volume))
            }
            RawInput::ElementDown { element_id, touch } => {
                let zone = self.registry.resolve_by_element(element_id)?;
                let volume = zone.base_volume();
                Some((zone, Self::pointer_kind(*touch), volume))
            }
            RawInput::KeyDown {
                key,
                code,
                ctrl,
                alt,
                meta,
            } => {
                let binding = Self::binding_key(key, code, *ctrl, *alt, *meta)?;
                let zone = self.registry.resolve_by_key(&binding)?;
                let volume = zone.base_volume();
                Some((zone, SourceKind::Keyboard, volume))
            }
        }
    }

    fn pointer_kind(touch: bool) -> SourceKind {
        if touch {
            SourceKind::Touch
        } else {
            SourceKind::Pointer
        }
    }

    /// The binding a key press resolves against. A held ctrl/alt/meta means
    /// a shortcut for the surrounding environment, not an instrument key.
    /// The Shift keys themselves are valid primary triggers, identified by
    /// physical key code rather than the modifier flag.
    fn binding_key(key: &str, code: &str, ctrl: bool, alt: bool, meta: bool) -> Option<String> {
        if ctrl || alt || meta {
            return None;
        }
        if code == "ShiftLeft" || code == "ShiftRight" {
            return Some("shift".to_string());
        }
        Some(key.to_lowercase())
    }
}
