//! Hotkey module for global keyboard event listening
//!
//! Watches the numpad through an injected `InputSource` and hands
//! triggers to the macro player.

mod keys;
mod listener;
mod native;
mod source;

pub use keys::{Key, SlotId};
pub use listener::{HotkeyListener, ListenerError};
pub use native::backend;
pub use source::{InputError, KeyInjector};

#[cfg(test)]
pub use keys::{KeyAction, KeyEvent};
#[cfg(test)]
pub use source::testing;
