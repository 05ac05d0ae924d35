//! Key names, keyboard events and modifier tracking
//!
//! `Key` is the symbolic vocabulary shared by the input boundary, the
//! profile format and the direction bindings. Every key round-trips
//! through its canonical name (`"num 7"`, `"ctrl"`, `"up"`, `"q"`).

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A keyboard key as seen by the listener and the injector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Key {
    /// Numeric keypad digit (distinct from the main-row digits)
    Numpad(u8),
    /// Main keyboard row digit
    Digit(u8),
    /// Latin letter, always lowercase
    Letter(char),
    Up,
    Down,
    Left,
    Right,
    /// Left or only Ctrl
    Ctrl,
    Shift,
    Alt,
    RightCtrl,
    RightShift,
    /// Right Alt, AltGr on international layouts
    RightAlt,
    Space,
    Tab,
    Enter,
    Escape,
    /// Function key F1..F12
    Function(u8),
    /// Platform key code with no symbolic name
    Unknown(u32),
}

impl Key {
    /// Modifier keys are tracked for chords and never trigger a slot
    pub fn is_modifier(&self) -> bool {
        matches!(
            self,
            Key::Ctrl | Key::Shift | Key::Alt | Key::RightCtrl | Key::RightShift | Key::RightAlt
        )
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Numpad(n) => write!(f, "num {}", n),
            Key::Digit(n) => write!(f, "{}", n),
            Key::Letter(c) => write!(f, "{}", c),
            Key::Up => write!(f, "up"),
            Key::Down => write!(f, "down"),
            Key::Left => write!(f, "left"),
            Key::Right => write!(f, "right"),
            Key::Ctrl => write!(f, "ctrl"),
            Key::Shift => write!(f, "shift"),
            Key::Alt => write!(f, "alt"),
            Key::RightCtrl => write!(f, "right ctrl"),
            Key::RightShift => write!(f, "right shift"),
            Key::RightAlt => write!(f, "right alt"),
            Key::Space => write!(f, "space"),
            Key::Tab => write!(f, "tab"),
            Key::Enter => write!(f, "enter"),
            Key::Escape => write!(f, "esc"),
            Key::Function(n) => write!(f, "f{}", n),
            Key::Unknown(code) => write!(f, "unknown {}", code),
        }
    }
}

/// Returned when a configured key name is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized key name: {0:?}")]
pub struct KeyParseError(pub String);

fn parse_digit(text: &str) -> Option<u8> {
    match text.as_bytes() {
        [b @ b'0'..=b'9'] => Some(b - b'0'),
        _ => None,
    }
}

impl FromStr for Key {
    type Err = KeyParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let name = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let key = match name.as_str() {
            "ctrl" | "control" | "left ctrl" => Key::Ctrl,
            "shift" | "left shift" => Key::Shift,
            "alt" | "left alt" => Key::Alt,
            "right ctrl" => Key::RightCtrl,
            "right shift" => Key::RightShift,
            "right alt" | "alt gr" => Key::RightAlt,
            "up" | "up arrow" => Key::Up,
            "down" | "down arrow" => Key::Down,
            "left" | "left arrow" => Key::Left,
            "right" | "right arrow" => Key::Right,
            "space" => Key::Space,
            "tab" => Key::Tab,
            "enter" | "return" => Key::Enter,
            "esc" | "escape" => Key::Escape,
            other => {
                if let Some(rest) = other
                    .strip_prefix("num ")
                    .or_else(|| other.strip_prefix("numpad "))
                    .or_else(|| other.strip_prefix("kp"))
                {
                    return parse_digit(rest.trim())
                        .map(Key::Numpad)
                        .ok_or_else(|| KeyParseError(raw.to_string()));
                }
                if let Some(code) = other.strip_prefix("unknown ") {
                    return code
                        .parse()
                        .map(Key::Unknown)
                        .map_err(|_| KeyParseError(raw.to_string()));
                }
                if let Some(digit) = parse_digit(other) {
                    return Ok(Key::Digit(digit));
                }
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_alphabetic() => Key::Letter(c),
                    (Some('f'), Some(_)) => match other[1..].parse::<u8>() {
                        Ok(n @ 1..=12) => Key::Function(n),
                        _ => return Err(KeyParseError(raw.to_string())),
                    },
                    _ => return Err(KeyParseError(raw.to_string())),
                }
            }
        };
        Ok(key)
    }
}

impl TryFrom<String> for Key {
    type Error = KeyParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

/// Whether a key went down or came back up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAction {
    Press,
    Release,
}

impl fmt::Display for KeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAction::Press => write!(f, "press"),
            KeyAction::Release => write!(f, "release"),
        }
    }
}

/// A single raw keyboard transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub action: KeyAction,
}

#[cfg(any(test, feature = "native-input"))]
impl KeyEvent {
    pub fn press(key: Key) -> Self {
        Self {
            key,
            action: KeyAction::Press,
        }
    }

    pub fn release(key: Key) -> Self {
        Self {
            key,
            action: KeyAction::Release,
        }
    }
}

/// Logical modifiers held, either side counting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
}

impl ModifierState {
    fn from_held(held: &HashSet<Key>) -> Self {
        let either = |left, right| held.contains(&left) || held.contains(&right);
        Self {
            ctrl: either(Key::Ctrl, Key::RightCtrl),
            shift: either(Key::Shift, Key::RightShift),
            alt: either(Key::Alt, Key::RightAlt),
        }
    }
}

/// A modifier combination plus one non-modifier key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chord {
    pub modifiers: ModifierState,
    pub key: Key,
}

impl Chord {
    /// Exact match: the required modifiers and no others
    pub fn matches(&self, modifiers: &ModifierState, key: Key) -> bool {
        self.key == key && self.modifiers == *modifiers
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.ctrl {
            write!(f, "ctrl+")?;
        }
        if self.modifiers.shift {
            write!(f, "shift+")?;
        }
        if self.modifiers.alt {
            write!(f, "alt+")?;
        }
        write!(f, "{}", self.key)
    }
}

/// Ctrl+Shift+Q stops listening from anywhere
pub const EXIT_CHORD: Chord = Chord {
    modifiers: ModifierState {
        ctrl: true,
        shift: true,
        alt: false,
    },
    key: Key::Letter('q'),
};

/// One of the nine numpad binding positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SlotId(u8);

impl SlotId {
    /// Display order of the numpad grid: 7 8 9 / 4 5 6 / 1 2 3
    pub const LAYOUT: [SlotId; 9] = [
        SlotId(7),
        SlotId(8),
        SlotId(9),
        SlotId(4),
        SlotId(5),
        SlotId(6),
        SlotId(1),
        SlotId(2),
        SlotId(3),
    ];

    pub fn new(digit: u8) -> Option<Self> {
        (1..=9).contains(&digit).then_some(Self(digit))
    }

    /// Default trigger key: the numpad digit
    pub fn key(self) -> Key {
        Key::Numpad(self.0)
    }

    /// Zero-based position for array storage
    pub(crate) fn index(self) -> usize {
        usize::from(self.0 - 1)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SlotId {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_digit(s.trim())
            .and_then(Self::new)
            .ok_or_else(|| KeyParseError(s.to_string()))
    }
}

impl TryFrom<u8> for SlotId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("slot must be 1-9, got {}", value))
    }
}

impl From<SlotId> for u8 {
    fn from(slot: SlotId) -> Self {
        slot.0
    }
}

/// What a key transition means to the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Nothing to do
    None,
    /// The exit chord was pressed
    Exit,
    /// Fresh press of a non-modifier key; the listener maps it to a slot
    Press(Key),
}

/// Edge detection over the raw event stream.
///
/// Keeps the set of held keys, modifiers included, so auto-repeat presses
/// collapse into one signal per press-release cycle and a modifier stays
/// held while either side is down.
#[derive(Debug, Default)]
pub struct KeyTracker {
    held: HashSet<Key>,
}

impl KeyTracker {
    pub fn observe(&mut self, event: KeyEvent) -> Signal {
        match event.action {
            KeyAction::Release => {
                self.held.remove(&event.key);
                Signal::None
            }
            KeyAction::Press => {
                if !self.held.insert(event.key) {
                    // auto-repeat
                    return Signal::None;
                }
                if event.key.is_modifier() {
                    return Signal::None;
                }
                if EXIT_CHORD.matches(&self.modifiers(), event.key) {
                    return Signal::Exit;
                }
                Signal::Press(event.key)
            }
        }
    }

    fn modifiers(&self) -> ModifierState {
        ModifierState::from_held(&self.held)
    }

    pub fn reset(&mut self) {
        self.held.clear();
    }
}
