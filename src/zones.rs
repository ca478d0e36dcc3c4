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

//! The zone registry: resolves input keys, screen points, and presentation
//! elements to zones, and signals visual activation.
//!
//! Zones are immutable after startup. The one piece of runtime mutation is
//! key rebinding, which lives in the registry's key index rather than the
//! zones themselves.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How long the presentation layer should flash an activated zone before
/// reverting on its own.
pub const ACTIVATION_PULSE: Duration = Duration::from_millis(100);

/// A rectangle in the normalized coordinate space of the instrument surface,
/// expressed as percentages of the container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialBounds {
    pub origin_x: f32,
    pub origin_y: f32,
    pub width: f32,
    pub height: f32,
}

impl SpatialBounds {
    /// True if the given point lies within these bounds.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.origin_x
            && x < self.origin_x + self.width
            && y >= self.origin_y
            && y < self.origin_y + self.height
    }

    /// Position-based volume multiplier in [0, 1]: 1.0 at the center of the
    /// bounds, falling off linearly to 0 at the corners. Points outside the
    /// bounds clamp to 0.
    pub fn falloff_at(&self, x: f32, y: f32) -> f32 {
        let center_x = self.origin_x + self.width / 2.0;
        let center_y = self.origin_y + self.height / 2.0;
        let corner = ((self.width / 2.0).powi(2) + (self.height / 2.0).powi(2)).sqrt();
        if corner <= 0.0 {
            return 0.0;
        }

        let distance = ((x - center_x).powi(2) + (y - center_y).powi(2)).sqrt();
        let normalized = (distance / corner).min(1.0);
        (1.0 - normalized).clamp(0.0, 1.0)
    }
}

/// One triggerable zone of the instrument. Constructed once from static
/// configuration and never mutated.
pub struct Zone {
    /// Unique, stable identifier.
    id: String,
    /// Human label; not used in logic.
    display_name: String,
    /// Path of the sound asset this zone plays. Many zones may share one.
    sound: PathBuf,
    /// Input keys bound to this zone at startup. Live bindings are held by
    /// the registry's key index and may diverge after rebinding.
    bindings: Vec<String>,
    /// Hit-test rectangle on the instrument surface.
    bounds: SpatialBounds,
    /// Volume multiplier applied to every trigger of this zone.
    base_volume: f32,
    /// Element id of the zone's key-hint affordance, rendered outside the
    /// instrument surface but triggering identically.
    hint_element: Option<String>,
}

impl Zone {
    pub fn new(
        id: &str,
        display_name: &str,
        sound: PathBuf,
        bindings: Vec<String>,
        bounds: SpatialBounds,
        base_volume: f32,
        hint_element: Option<String>,
    ) -> Zone {
        Zone {
            id: id.to_string(),
            display_name: display_name.to_string(),
            sound,
            bindings,
            bounds,
            base_volume,
            hint_element,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn sound(&self) -> &std::path::Path {
        &self.sound
    }

    pub fn bounds(&self) -> &SpatialBounds {
        &self.bounds
    }

    pub fn base_volume(&self) -> f32 {
        self.base_volume
    }

    pub fn hint_element(&self) -> Option<&str> {
        self.hint_element.as_deref()
    }
}

/// Errors from building or mutating the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("key {key} is bound to both {zone_a} and {zone_b}")]
    DuplicateKey {
        key: String,
        zone_a: String,
        zone_b: String,
    },

    #[error("duplicate zone id {0}")]
    DuplicateZone(String),

    #[error("no zone with id {0}")]
    UnknownZone(String),
}

/// A visual activation request for the presentation layer: flash the zone
/// for the given duration and revert automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationPulse {
    pub zone_id: String,
    pub duration: Duration,
}

/// Optional callback invoked with the zone id on every visual activation.
pub type ActivationHook = Box<dyn Fn(&str) + Send + Sync>;

/// Maps stable zone identifiers to sounds, bounds, and key bindings, and
/// resolves raw input targets to zones.
pub struct ZoneRegistry {
    /// Zones in configuration order. Order breaks hit-test ties.
    zones: Vec<Arc<Zone>>,
    /// Zones by id.
    by_id: HashMap<String, Arc<Zone>>,
    /// Live key index: lowercase key to zone id. Injective at all times.
    key_index: RwLock<HashMap<String, String>>,
    /// Sending side of the activation pulse stream.
    pulse_tx: mpsc::UnboundedSender<ActivationPulse>,
    /// Receiving side, handed out once to the presentation layer.
    pulse_rx: Mutex<Option<mpsc::UnboundedReceiver<ActivationPulse>>>,
    /// Optional activation callback.
    hook: RwLock<Option<ActivationHook>>,
}

impl ZoneRegistry {
    /// Builds the registry from configured zones, verifying that zone ids
    /// are unique and keys form an injective key-to-zone mapping.
    pub fn new(zones: Vec<Zone>) -> Result<ZoneRegistry, RegistryError> {
        let mut by_id = HashMap::new();
        let mut key_index: HashMap<String, String> = HashMap::new();
        let mut ordered = Vec::with_capacity(zones.len());

        for zone in zones {
            let zone = Arc::new(zone);
            if by_id.contains_key(zone.id()) {
                return Err(RegistryError::DuplicateZone(zone.id().to_string()));
            }

            for key in &zone.bindings {
                let key = key.to_lowercase();
                if let Some(holder) = key_index.get(&key) {
                    return Err(RegistryError::DuplicateKey {
                        key,
                        zone_a: holder.clone(),
                        zone_b: zone.id().to_string(),
                    });
                }
                key_index.insert(key, zone.id().to_string());
            }

            by_id.insert(zone.id().to_string(), zone.clone());
            ordered.push(zone);
        }

        let (pulse_tx, pulse_rx) = mpsc::unbounded_channel();
        Ok(ZoneRegistry {
            zones: ordered,
            by_id,
            key_index: RwLock::new(key_index),
            pulse_tx,
            pulse_rx: Mutex::new(Some(pulse_rx)),
            hook: RwLock::new(None),
        })
    }

    /// All zones in configuration order.
    pub fn zones(&self) -> &[Arc<Zone>] {
        &self.zones
    }

    /// The zone with the given id.
    pub fn zone(&self, zone_id: &str) -> Option<Arc<Zone>> {
        self.by_id.get(zone_id).cloned()
    }

    /// Resolves an input key to a zone. Case-insensitive exact match.
    pub fn resolve_by_key(&self, key: &str) -> Option<Arc<Zone>> {
        let key = key.to_lowercase();
        let zone_id = self.key_index.read().get(&key)?.clone();
        self.by_id.get(&zone_id).cloned()
    }

    /// Hit-tests a point on the instrument surface against zone bounds.
    pub fn resolve_by_point(&self, x: f32, y: f32) -> Option<Arc<Zone>> {
        self.zones
            .iter()
            .find(|zone| zone.bounds.contains(x, y))
            .cloned()
    }

    /// Resolves a presentation element to a zone: either the zone's own
    /// element (identified by zone id) or its labelled key-hint companion,
    /// which lives outside the instrument surface but triggers identically.
    pub fn resolve_by_element(&self, element_id: &str) -> Option<Arc<Zone>> {
        if let Some(zone) = self.by_id.get(element_id) {
            return Some(zone.clone());
        }
        self.zones
            .iter()
            .find(|zone| zone.hint_element() == Some(element_id))
            .cloned()
    }

    /// The live key bindings of a zone.
    pub fn bindings_for(&self, zone_id: &str) -> Vec<String> {
        let index = self.key_index.read();
        let mut keys: Vec<String> = index
            .iter()
            .filter(|(_, id)| id.as_str() == zone_id)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Rebinds a zone to a new key: the key is stolen from whatever zone
    /// currently holds it, the zone's old keys are removed, and the new key
    /// installed, keeping the index injective throughout.
    pub fn rebind_key(&self, zone_id: &str, new_key: &str) -> Result<(), RegistryError> {
        if !self.by_id.contains_key(zone_id) {
            return Err(RegistryError::UnknownZone(zone_id.to_string()));
        }

        let new_key = new_key.to_lowercase();
        let mut index = self.key_index.write();
        if let Some(holder) = index.get(&new_key) {
            if holder != zone_id {
                debug!(key = %new_key, from = %holder, to = zone_id, "Stealing key binding");
            }
        }
        index.retain(|_, id| id.as_str() != zone_id);
        index.insert(new_key.clone(), zone_id.to_string());
        debug!(zone = zone_id, key = %new_key, "Key rebound");
        Ok(())
    }

    /// Installs the optional activation callback.
    pub fn set_activation_hook(&self, hook: ActivationHook) {
        *self.hook.write() = Some(hook);
    }

    /// Takes the activation pulse stream. The presentation layer consumes
    /// it to flash zones; only one consumer exists.
    pub fn take_pulses(&self) -> Option<mpsc::UnboundedReceiver<ActivationPulse>> {
        self.pulse_rx.lock().take()
    }

    /// Asks the presentation layer to flash the zone and revert after
    /// [`ACTIVATION_PULSE`]. Never blocks the caller; a missing consumer is
    /// fine.
    pub fn signal_activated(&self, zone_id: &str) {
        if !self.by_id.contains_key(zone_id) {
            warn!(zone = zone_id, "Activation signal for unknown zone");
            return;
        }

        if let Some(hook) = self.hook.read().as_ref() {
            hook(zone_id);
        }
        let _ = self.pulse_tx.send(ActivationPulse {
            zone_id: zone_id.to_string(),
            duration: ACTIVATION_PULSE,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_zone(id: &str, keys: &[&str], bounds: SpatialBounds) -> Zone {
        Zone::new(
            id,
            id,
            PathBuf::from(format!("{}.wav", id)),
            keys.iter().map(|k| k.to_string()).collect(),
            bounds,
            1.0,
            Some(format!("hint-{}", id)),
        )
    }

    fn full_surface_registry() -> ZoneRegistry {
        ZoneRegistry::new(vec![
            test_zone(
                "kick",
                &["q"],
                SpatialBounds {
                    origin_x: 0.0,
                    origin_y: 0.0,
                    width: 50.0,
                    height: 100.0,
                },
            ),
            test_zone(
                "snare",
                &["w"],
                SpatialBounds {
                    origin_x: 50.0,
                    origin_y: 0.0,
                    width: 50.0,
                    height: 100.0,
                },
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_resolve_by_key_is_case_insensitive() {
        let registry = full_surface_registry();
        assert_eq!(registry.resolve_by_key("q").unwrap().id(), "kick");
        assert_eq!(registry.resolve_by_key("Q").unwrap().id(), "kick");
        assert!(registry.resolve_by_key("z").is_none());
    }

    #[test]
    fn test_resolve_by_point() {
        let registry = full_surface_registry();
        assert_eq!(registry.resolve_by_point(25.0, 50.0).unwrap().id(), "kick");
        assert_eq!(registry.resolve_by_point(75.0, 50.0).unwrap().id(), "snare");
        assert!(registry.resolve_by_point(150.0, 50.0).is_none());
    }

    #[test]
    fn test_resolve_by_element_and_hint() {
        let registry = full_surface_registry();
        assert_eq!(registry.resolve_by_element("kick").unwrap().id(), "kick");
        // The key-hint companion element resolves to the same zone.
        assert_eq!(
            registry.resolve_by_element("hint-snare").unwrap().id(),
            "snare"
        );
        assert!(registry.resolve_by_element("unrelated").is_none());
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let bounds = SpatialBounds {
            origin_x: 0.0,
            origin_y: 0.0,
            width: 50.0,
            height: 50.0,
        };
        let result = ZoneRegistry::new(vec![
            test_zone("kick", &["q"], bounds),
            test_zone("snare", &["Q"], bounds),
        ]);
        assert!(matches!(
            result,
            Err(RegistryError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn test_rebind_key() {
        let registry = full_surface_registry();

        registry.rebind_key("kick", "e").unwrap();
        assert_eq!(registry.resolve_by_key("e").unwrap().id(), "kick");
        // The old key no longer resolves.
        assert!(registry.resolve_by_key("q").is_none());

        // Stealing a key held by another zone keeps the index injective.
        registry.rebind_key("snare", "e").unwrap();
        assert_eq!(registry.resolve_by_key("e").unwrap().id(), "snare");
        assert!(registry.bindings_for("kick").is_empty());

        assert!(matches!(
            registry.rebind_key("missing", "x"),
            Err(RegistryError::UnknownZone(_))
        ));
    }

    #[test]
    fn test_falloff_center_and_corner() {
        let bounds = SpatialBounds {
            origin_x: 0.0,
            origin_y: 0.0,
            width: 50.0,
            height: 100.0,
        };

        // Center press: full volume.
        assert!((bounds.falloff_at(25.0, 50.0) - 1.0).abs() < 1e-6);
        // Corner press: multiplier approaches 0.
        assert!(bounds.falloff_at(0.0, 0.0) < 1e-6);
        assert!(bounds.falloff_at(50.0, 100.0) < 1e-6);
        // Outside the bounds clamps to 0.
        assert_eq!(bounds.falloff_at(500.0, 500.0), 0.0);
        // Halfway to an edge lands strictly between.
        let mid = bounds.falloff_at(25.0, 75.0);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[tokio::test]
    async fn test_signal_activated_emits_pulse_and_hook() {
        let registry = full_surface_registry();
        let mut pulses = registry.take_pulses().unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let hook_seen = seen.clone();
        registry.set_activation_hook(Box::new(move |zone_id| {
            hook_seen.lock().push(zone_id.to_string());
        }));

        registry.signal_activated("kick");
        registry.signal_activated("nope");

        let pulse = pulses.recv().await.unwrap();
        assert_eq!(pulse.zone_id, "kick");
        assert_eq!(pulse.duration, ACTIVATION_PULSE);
        assert!(pulses.try_recv().is_err());
        assert_eq!(*seen.lock(), vec!["kick".to_string()]);
    }
}
