//! Activity events
//!
//! Everything a UI would show in its activity log: listener transitions,
//! playback progress, failures and profile changes. Broadcast to IPC
//! subscribers and mirrored to the tracing log.

use serde::{Deserialize, Serialize};

use crate::hotkey::SlotId;

/// Why the listener stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Stop requested through the control interface
    Requested,
    /// The exit chord was pressed
    ExitHotkey,
    /// Daemon is shutting down
    Shutdown,
}

/// Events emitted by the listener, player and controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityEvent {
    ListeningStarted,

    ListeningStopped { reason: StopReason },

    /// The OS refused the keyboard hook; listening stays off
    HookInstallFailed { message: String },

    /// Playback began on the player thread
    MacroStarted {
        slot: SlotId,
        name: String,
        /// Number of press-release pairs, panel key included
        keys: usize,
        /// Expected playback time for progress display
        estimated_ms: u64,
    },

    MacroCompleted {
        slot: SlotId,
        name: String,
        duration_ms: u64,
    },

    /// A synthetic key could not be delivered; the rest was abandoned
    MacroFailed {
        slot: SlotId,
        name: String,
        /// Press-release pairs completed before the failure
        completed: usize,
        message: String,
    },

    /// A trigger arrived while another macro was playing
    TriggerDropped { slot: SlotId },

    ProfileLoaded {
        name: String,
        /// Template names the profile referenced that no longer exist
        missing: Vec<String>,
    },

    ProfileSaved { name: String },

    /// Bindings and configuration reset to defaults
    ProfileReset,
}

impl std::fmt::Display for ActivityEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityEvent::ListeningStarted => write!(f, "Listener ON: waiting for numpad hotkeys"),
            ActivityEvent::ListeningStopped { reason } => {
                write!(f, "Listener OFF ({:?})", reason)
            }
            ActivityEvent::HookInstallFailed { message } => {
                write!(f, "Cannot start listening: {}", message)
            }
            ActivityEvent::MacroStarted {
                slot, name, keys, ..
            } => write!(f, "[{}] {}: running {} key presses", slot, name, keys),
            ActivityEvent::MacroCompleted {
                slot,
                name,
                duration_ms,
            } => write!(f, "[{}] {}: done ({}ms)", slot, name, duration_ms),
            ActivityEvent::MacroFailed {
                slot,
                name,
                completed,
                message,
            } => write!(
                f,
                "[{}] {}: aborted after {} keys: {}",
                slot, name, completed, message
            ),
            ActivityEvent::TriggerDropped { slot } => {
                write!(f, "[{}] ignored, another macro is playing", slot)
            }
            ActivityEvent::ProfileLoaded { name, missing } if missing.is_empty() => {
                write!(f, "Loaded profile '{}'", name)
            }
            ActivityEvent::ProfileLoaded { name, missing } => write!(
                f,
                "Loaded profile '{}', missing macros: {}",
                name,
                missing.join(", ")
            ),
            ActivityEvent::ProfileSaved { name } => write!(f, "Saved profile '{}'", name),
            ActivityEvent::ProfileReset => write!(f, "Loaded blank profile"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ActivityEvent::MacroCompleted {
            slot: SlotId::new(7).unwrap(),
            name: "Orbital Laser".to_string(),
            duration_ms: 450,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"macro_completed\""));
        assert!(json.contains("\"slot\":7"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"listening_stopped","reason":"exit_hotkey"}"#;
        let event: ActivityEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ActivityEvent::ListeningStopped {
                reason: StopReason::ExitHotkey
            }
        );
    }

    #[test]
    fn test_display_mentions_missing_macros() {
        let event = ActivityEvent::ProfileLoaded {
            name: "default".to_string(),
            missing: vec!["Old Strike".to_string()],
        };
        assert!(event.to_string().contains("Old Strike"));
    }
}
