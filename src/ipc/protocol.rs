//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::events::ActivityEvent;
use crate::hotkey::{Key, SlotId};
use crate::state::StatusSnapshot;
use crate::stratagem::{Direction, StratagemTemplate};

/// Largest accepted message body
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Requests from UI to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    StartListening,
    StopListening,

    AssignSlot { slot: SlotId, template: String },
    ClearSlot { slot: SlotId },

    SetTiming { delay_ms: u64, hold_ms: u64 },
    SetPanel { key: Key, auto: bool },
    SetDirectionKey { direction: Direction, key: Key },
    /// Change the key that triggers a slot
    SetSlotHotkey { slot: SlotId, key: Key },

    ListTemplates,
    /// Create or replace a template; `category` defaults to the existing one
    UpdateTemplate {
        name: String,
        #[serde(default)]
        category: Option<String>,
        directions: Vec<Direction>,
    },

    ListProfiles,
    LoadProfile { name: String },
    SaveProfile { name: String },
    /// Reset to a blank profile
    NewProfile,

    /// Subscribe to activity event notifications
    Subscribe,

    /// Stop the daemon
    Shutdown,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(StatusSnapshot),

    /// Request applied, nothing to report
    Ok,

    /// Pong response to ping
    Pong,

    Templates { templates: Vec<StratagemTemplate> },

    /// Bindings that were emptied because their template no longer exists
    TemplateUpdated { dropped: Vec<String> },

    Profiles { names: Vec<String> },

    ProfileLoaded { name: String, missing: Vec<String> },

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

impl Response {
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Event { event: ActivityEvent },
}
