//! Application state and the controller that owns it
//!
//! - `AppState`: listening flag, slot bindings, macro config, templates
//! - `Controller`: the single writer, driven by the IPC server

mod app;
mod controller;

pub use app::{AppState, SlotBindings};
pub use controller::{ControlError, Controller, StatusSnapshot};
