//! Playback timing and key bindings

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::hotkey::{Key, SlotId};
use crate::stratagem::Direction;

pub const DEFAULT_DELAY: Duration = Duration::from_millis(50);
pub const DEFAULT_HOLD: Duration = Duration::from_millis(50);
pub const DEFAULT_PANEL_KEY: Key = Key::Ctrl;
pub const DEFAULT_AUTO_PANEL: bool = false;

/// Which key the player presses for each direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionKeys {
    #[serde(rename = "Up")]
    pub up: Key,
    #[serde(rename = "Down")]
    pub down: Key,
    #[serde(rename = "Left")]
    pub left: Key,
    #[serde(rename = "Right")]
    pub right: Key,
}

impl DirectionKeys {
    pub fn get(&self, direction: Direction) -> Key {
        match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
            Direction::Left => self.left,
            Direction::Right => self.right,
        }
    }

    pub fn set(&mut self, direction: Direction, key: Key) {
        match direction {
            Direction::Up => self.up = key,
            Direction::Down => self.down = key,
            Direction::Left => self.left = key,
            Direction::Right => self.right = key,
        }
    }
}

impl Default for DirectionKeys {
    fn default() -> Self {
        Self {
            up: Key::Up,
            down: Key::Down,
            left: Key::Left,
            right: Key::Right,
        }
    }
}

/// Trigger key for each slot, the matching numpad digit by default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<SlotId, Key>", into = "BTreeMap<SlotId, Key>")]
pub struct SlotHotkeys {
    keys: [Key; 9],
}

impl SlotHotkeys {
    pub fn get(&self, slot: SlotId) -> Key {
        self.keys[slot.index()]
    }

    pub fn set(&mut self, slot: SlotId, key: Key) {
        self.keys[slot.index()] = key;
    }

    /// Slot triggered by `key`
    pub fn slot_for(&self, key: Key) -> Option<SlotId> {
        SlotId::LAYOUT.into_iter().find(|slot| self.get(*slot) == key)
    }
}

impl Default for SlotHotkeys {
    fn default() -> Self {
        let mut keys = [Key::Numpad(0); 9];
        for slot in SlotId::LAYOUT {
            keys[slot.index()] = slot.key();
        }
        Self { keys }
    }
}

/// Slots absent from the map keep their default key
impl From<BTreeMap<SlotId, Key>> for SlotHotkeys {
    fn from(map: BTreeMap<SlotId, Key>) -> Self {
        let mut hotkeys = Self::default();
        for (slot, key) in map {
            hotkeys.set(slot, key);
        }
        hotkeys
    }
}

impl From<SlotHotkeys> for BTreeMap<SlotId, Key> {
    fn from(hotkeys: SlotHotkeys) -> Self {
        SlotId::LAYOUT
            .into_iter()
            .map(|slot| (slot, hotkeys.get(slot)))
            .collect()
    }
}

/// Process-wide playback configuration, snapshotted per invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroConfig {
    /// Pause between one key's release and the next key's press
    #[serde(rename = "delay_ms", with = "millis")]
    pub delay: Duration,
    /// How long each key stays down
    #[serde(rename = "hold_ms", with = "millis")]
    pub hold: Duration,
    pub panel_key: Key,
    pub auto_panel: bool,
    pub direction_keys: DirectionKeys,
    pub slot_hotkeys: SlotHotkeys,
}

impl MacroConfig {
    /// Keys pressed for a sequence, panel key first when auto panel is on
    pub fn key_sequence(&self, directions: &[Direction]) -> Vec<Key> {
        let panel = self.auto_panel.then_some(self.panel_key);
        panel
            .into_iter()
            .chain(directions.iter().map(|d| self.direction_keys.get(*d)))
            .collect()
    }

    /// Expected wall time for `presses` press-release pairs
    pub fn estimated_duration(&self, presses: usize) -> Duration {
        let presses = u32::try_from(presses).unwrap_or(u32::MAX);
        self.hold * presses + self.delay * presses.saturating_sub(1)
    }
}

impl Default for MacroConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_DELAY,
            hold: DEFAULT_HOLD,
            panel_key: DEFAULT_PANEL_KEY,
            auto_panel: DEFAULT_AUTO_PANEL,
            direction_keys: DirectionKeys::default(),
            slot_hotkeys: SlotHotkeys::default(),
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
