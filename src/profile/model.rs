//! Profile contents and their on-disk JSON shape
//!
//! ```json
//! {
//!   "slots": {"7": "Orbital Laser", "8": null},
//!   "hotkeys": {"7": "num 7", "8": "f8"},
//!   "direction_keys": {"Up": "w", "Down": "s", "Left": "a", "Right": "d"},
//!   "timing": {"delay": 0.05, "duration": 0.05},
//!   "panel": {"key": "ctrl", "auto": true}
//! }
//! ```
//!
//! Reading is lenient field by field: anything missing or malformed falls
//! back to its default. Only a missing `slots` object rejects the file.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::hotkey::{Key, SlotId};
use crate::player::{DirectionKeys, MacroConfig, SlotHotkeys};
use crate::state::SlotBindings;
use crate::stratagem::{Direction, TemplateStore};

use super::store::ProfileError;

/// Saved slot assignments plus macro configuration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Profile {
    /// Template names by slot; unbound slots are absent
    pub slots: BTreeMap<SlotId, String>,
    pub config: MacroConfig,
}

/// Upper bound on a stored delay or hold
const MAX_TIMING_SECS: f64 = 10.0;

#[derive(Serialize)]
struct ProfileFile<'a> {
    slots: BTreeMap<String, Option<&'a str>>,
    hotkeys: &'a SlotHotkeys,
    direction_keys: &'a DirectionKeys,
    timing: Timing,
    panel: Panel,
}

#[derive(Serialize)]
struct Timing {
    delay: f64,
    duration: f64,
}

#[derive(Serialize)]
struct Panel {
    key: Key,
    auto: bool,
}

/// Seconds as stored on disk, rounded to whole milliseconds
fn seconds(value: Option<&Value>) -> Option<Duration> {
    let secs = value.and_then(Value::as_f64)?;
    if !secs.is_finite() || secs < 0.0 || secs > MAX_TIMING_SECS {
        return None;
    }
    Some(Duration::from_millis((secs * 1000.0).round() as u64))
}

fn key_field(value: Option<&Value>) -> Option<Key> {
    value.and_then(Value::as_str).and_then(|s| s.parse().ok())
}

/// Per slot: a missing, unparsable or modifier key keeps the numpad default
fn hotkeys_field(value: Option<&Value>) -> SlotHotkeys {
    let mut hotkeys = SlotHotkeys::default();
    if let Some(data) = value.and_then(Value::as_object) {
        for slot in SlotId::LAYOUT {
            match key_field(data.get(&slot.to_string())) {
                Some(key) if !key.is_modifier() => hotkeys.set(slot, key),
                _ => {}
            }
        }
    }
    hotkeys
}

impl Profile {
    /// Snapshot the live bindings and configuration
    pub fn capture(bindings: &SlotBindings, config: &MacroConfig) -> Self {
        let slots = SlotId::LAYOUT
            .iter()
            .filter_map(|slot| bindings.name(*slot).map(|name| (*slot, name.to_string())))
            .collect();
        Self {
            slots,
            config: config.clone(),
        }
    }

    /// Resolve template names against the store.
    ///
    /// Names the store does not know leave their slot empty and are
    /// returned so the caller can report them.
    pub fn resolve(&self, store: &TemplateStore) -> (SlotBindings, Vec<String>) {
        let mut bindings = SlotBindings::default();
        let mut missing = Vec::new();
        for (slot, name) in &self.slots {
            match store.get(name) {
                Some(template) => bindings.set(*slot, Some(template)),
                None => missing.push(name.clone()),
            }
        }
        (bindings, missing)
    }

    pub fn to_json(&self) -> Value {
        let file = ProfileFile {
            slots: SlotId::LAYOUT
                .iter()
                .map(|slot| (slot.to_string(), self.slots.get(slot).map(String::as_str)))
                .collect(),
            hotkeys: &self.config.slot_hotkeys,
            direction_keys: &self.config.direction_keys,
            timing: Timing {
                delay: self.config.delay.as_secs_f64(),
                duration: self.config.hold.as_secs_f64(),
            },
            panel: Panel {
                key: self.config.panel_key,
                auto: self.config.auto_panel,
            },
        };
        // only strings, numbers and bools: cannot fail
        serde_json::to_value(file).unwrap_or(Value::Null)
    }

    pub fn from_json(value: &Value) -> Result<Self, ProfileError> {
        let slots_data = value
            .get("slots")
            .and_then(Value::as_object)
            .ok_or_else(|| ProfileError::Invalid("missing \"slots\" object".to_string()))?;

        let mut slots = BTreeMap::new();
        for slot in SlotId::LAYOUT {
            let name = slots_data
                .get(&slot.to_string())
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty());
            if let Some(name) = name {
                slots.insert(slot, name.to_string());
            }
        }

        let mut config = MacroConfig {
            slot_hotkeys: hotkeys_field(value.get("hotkeys")),
            ..MacroConfig::default()
        };

        if let Some(direction_data) = value.get("direction_keys").and_then(Value::as_object) {
            for direction in Direction::ALL {
                if let Some(key) = key_field(direction_data.get(&direction.to_string())) {
                    config.direction_keys.set(direction, key);
                }
            }
        }

        if let Some(timing) = value.get("timing").and_then(Value::as_object) {
            // both values or neither
            if let (Some(delay), Some(hold)) =
                (seconds(timing.get("delay")), seconds(timing.get("duration")))
            {
                config.delay = delay;
                config.hold = hold;
            }
        }

        if let Some(panel) = value.get("panel").and_then(Value::as_object) {
            if let Some(key) = key_field(panel.get("key")) {
                config.panel_key = key;
            }
            if let Some(auto) = panel.get("auto").and_then(Value::as_bool) {
                config.auto_panel = auto;
            }
        }

        Ok(Self { slots, config })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::stratagem::StratagemTemplate;

    fn store() -> TemplateStore {
        TemplateStore::new([
            StratagemTemplate::new("Orbital Laser", "Orbital", vec![Direction::Right]).unwrap(),
            StratagemTemplate::new("Resupply", "Supply", vec![Direction::Down]).unwrap(),
        ])
    }

    fn slot(n: u8) -> SlotId {
        SlotId::new(n).unwrap()
    }

    #[test]
    fn test_reads_full_profile() {
        let value = json!({
            "slots": {"7": "Orbital Laser", "8": null, "1": "Resupply"},
            "direction_keys": {"Up": "w", "Down": "s", "Left": "a", "Right": "d"},
            "timing": {"delay": 0.03, "duration": 0.07},
            "panel": {"key": "ctrl", "auto": true}
        });
        let profile = Profile::from_json(&value).unwrap();

        assert_eq!(profile.slots.get(&slot(7)).map(String::as_str), Some("Orbital Laser"));
        assert!(!profile.slots.contains_key(&slot(8)));
        assert_eq!(profile.config.direction_keys.up, Key::Letter('w'));
        assert_eq!(profile.config.delay, Duration::from_millis(30));
        assert_eq!(profile.config.hold, Duration::from_millis(70));
        assert!(profile.config.auto_panel);
    }

    #[test]
    fn test_lenient_fields_fall_back_to_defaults() {
        let value = json!({
            "slots": {},
            "direction_keys": {"Up": "not a key", "Down": 5},
            "timing": {"delay": -1.0, "duration": 0.2},
            "panel": {"key": "", "auto": "yes"}
        });
        let profile = Profile::from_json(&value).unwrap();
        assert_eq!(profile.config, MacroConfig::default());
    }

    #[test]
    fn test_hotkeys_fall_back_per_slot() {
        let value = json!({
            "slots": {},
            "hotkeys": {"7": "f7", "8": "not a key", "9": "shift", "1": "  G "}
        });
        let hotkeys = Profile::from_json(&value).unwrap().config.slot_hotkeys;
        assert_eq!(hotkeys.get(slot(7)), Key::Function(7));
        assert_eq!(hotkeys.get(slot(8)), Key::Numpad(8));
        assert_eq!(hotkeys.get(slot(9)), Key::Numpad(9));
        assert_eq!(hotkeys.get(slot(1)), Key::Letter('g'));
        assert_eq!(hotkeys.get(slot(2)), Key::Numpad(2));
    }

    #[test]
    fn test_hotkeys_survive_resave() {
        let mut profile = Profile::default();
        profile.config.slot_hotkeys.set(slot(3), Key::Digit(3));
        let reread = Profile::from_json(&profile.to_json()).unwrap();
        assert_eq!(reread.config.slot_hotkeys.get(slot(3)), Key::Digit(3));
        assert_eq!(reread, profile);
    }

    #[test]
    fn test_missing_slots_is_invalid() {
        let err = Profile::from_json(&json!({"timing": {}})).unwrap_err();
        assert!(matches!(err, ProfileError::Invalid(_)));
    }

    #[test]
    fn test_deleted_template_resolves_to_empty_slot() {
        let value = json!({"slots": {"7": "Orbital Laser", "9": "Deleted Strike"}});
        let profile = Profile::from_json(&value).unwrap();
        let (bindings, missing) = profile.resolve(&store());

        assert_eq!(missing, vec!["Deleted Strike".to_string()]);
        assert!(bindings.get(slot(9)).is_none());
        assert_eq!(bindings.name(slot(7)), Some("Orbital Laser"));
    }

    #[test]
    fn test_capture_writes_every_slot() {
        let store = store();
        let mut bindings = SlotBindings::default();
        bindings.set(slot(5), store.get("Resupply"));

        let profile = Profile::capture(&bindings, &MacroConfig::default());
        let json = profile.to_json();
        assert_eq!(json["slots"].as_object().unwrap().len(), 9);
        assert_eq!(json["slots"]["5"], "Resupply");
        assert!(json["slots"]["7"].is_null());
        assert_eq!(json["timing"]["delay"], 0.05);
        assert_eq!(json["panel"]["key"], "ctrl");
        assert_eq!(json["hotkeys"]["5"], "num 5");

        assert_eq!(Profile::from_json(&json).unwrap(), profile);
    }
}
