//! Controller: the single writer of application state
//!
//! Every mutation the UI can request goes through here. The listener
//! only ever reads the state the controller publishes.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::events::{ActivityEvent, StopReason};
use crate::hotkey::{HotkeyListener, Key, ListenerError, SlotId};
use crate::player::MacroConfig;
use crate::profile::{Profile, ProfileError, ProfileStore};
use crate::stratagem::{Direction, StratagemTemplate, TemplateError};

use super::app::{AppState, SlotBindings, SlotView};

/// Category given to templates created without one
const NEW_TEMPLATE_CATEGORY: &str = "Misc";

/// Upper bound for the inter-key delay and the hold duration
pub const MAX_TIMING: Duration = Duration::from_secs(10);

/// Errors returned by controller operations
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("no template named '{0}'")]
    UnknownTemplate(String),

    #[error("timing {0:?} exceeds the {max:?} limit", max = MAX_TIMING)]
    InvalidTiming(Duration),

    #[error("modifier key '{0}' cannot trigger a slot")]
    InvalidHotkey(Key),

    #[error("key '{key}' already triggers slot {slot}")]
    HotkeyInUse { key: Key, slot: SlotId },
}

impl ControlError {
    /// Stable identifier for IPC error responses
    pub fn code(&self) -> &'static str {
        match self {
            ControlError::Listener(ListenerError::AlreadyListening) => "already_listening",
            ControlError::Listener(ListenerError::HookInstall(_)) => "hook_install_failed",
            ControlError::Listener(ListenerError::ThreadSpawn(_)) => "internal",
            ControlError::Profile(ProfileError::NotFound(_)) => "profile_not_found",
            ControlError::Profile(ProfileError::InvalidName(_)) => "invalid_profile_name",
            ControlError::Profile(ProfileError::Parse { .. } | ProfileError::Invalid(_)) => {
                "invalid_profile"
            }
            ControlError::Profile(ProfileError::Io { .. }) => "io_error",
            ControlError::Template(TemplateError::Io { .. }) => "io_error",
            ControlError::Template(_) => "invalid_template",
            ControlError::UnknownTemplate(_) => "unknown_template",
            ControlError::InvalidTiming(_) => "invalid_timing",
            ControlError::InvalidHotkey(_) => "invalid_hotkey",
            ControlError::HotkeyInUse { .. } => "hotkey_in_use",
        }
    }
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub version: String,
    pub listening: bool,
    /// A macro is queued or playing
    pub playing: bool,
    pub profile: Option<String>,
    /// Bindings or configuration differ from the last save, load or reset
    pub unsaved: bool,
    pub slots: Vec<SlotView>,
    pub config: MacroConfig,
    pub templates: usize,
    pub uptime_secs: u64,
}

pub struct Controller {
    state: Arc<AppState>,
    listener: HotkeyListener,
    profiles: ProfileStore,
    templates_path: PathBuf,
    events: broadcast::Sender<ActivityEvent>,
    started_at: Instant,
    /// Profile as last saved, loaded or reset
    baseline: Mutex<Profile>,
}

impl Controller {
    pub fn new(
        state: Arc<AppState>,
        listener: HotkeyListener,
        profiles: ProfileStore,
        templates_path: PathBuf,
        events: broadcast::Sender<ActivityEvent>,
    ) -> Self {
        let baseline = Mutex::new(Profile::capture(&state.bindings(), &state.macro_config()));
        Self {
            state,
            listener,
            profiles,
            templates_path,
            events,
            started_at: Instant::now(),
            baseline,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ActivityEvent) {
        let _ = self.events.send(event);
    }

    // -- Listening --------------------------------------------------------

    pub fn start_listening(&self) -> Result<(), ControlError> {
        self.listener.start()?;
        Ok(())
    }

    /// Returns whether the listener was running
    pub fn stop_listening(&self, reason: StopReason) -> bool {
        self.listener.stop(reason)
    }

    // -- Bindings and configuration --------------------------------------

    pub fn assign_slot(&self, slot: SlotId, template_name: &str) -> Result<(), ControlError> {
        let template = self
            .state
            .templates()
            .get(template_name)
            .ok_or_else(|| ControlError::UnknownTemplate(template_name.to_string()))?;

        info!(%slot, name = %template.name, "slot assigned");
        self.state.bindings_mut().set(slot, Some(template));
        Ok(())
    }

    pub fn clear_slot(&self, slot: SlotId) {
        info!(%slot, "slot cleared");
        self.state.bindings_mut().set(slot, None);
    }

    pub fn set_timing(&self, delay: Duration, hold: Duration) -> Result<(), ControlError> {
        if let Some(bad) = [delay, hold].into_iter().find(|d| *d > MAX_TIMING) {
            return Err(ControlError::InvalidTiming(bad));
        }
        let mut config = self.state.config_mut();
        config.delay = delay;
        config.hold = hold;
        info!(?delay, ?hold, "macro timing updated");
        Ok(())
    }

    pub fn set_panel(&self, key: Key, auto: bool) {
        let mut config = self.state.config_mut();
        config.panel_key = key;
        config.auto_panel = auto;
        info!(%key, auto, "panel key updated");
    }

    pub fn set_direction_key(&self, direction: Direction, key: Key) {
        self.state.config_mut().direction_keys.set(direction, key);
        info!(%direction, %key, "direction key updated");
    }

    /// Change the key that triggers `slot`; each key triggers at most one slot
    pub fn set_slot_hotkey(&self, slot: SlotId, key: Key) -> Result<(), ControlError> {
        if key.is_modifier() {
            return Err(ControlError::InvalidHotkey(key));
        }
        let mut config = self.state.config_mut();
        match config.slot_hotkeys.slot_for(key) {
            Some(owner) if owner != slot => {
                return Err(ControlError::HotkeyInUse { key, slot: owner });
            }
            _ => {}
        }
        config.slot_hotkeys.set(slot, key);
        info!(%slot, %key, "slot hotkey updated");
        Ok(())
    }

    // -- Templates --------------------------------------------------------

    pub fn templates(&self) -> Vec<StratagemTemplate> {
        self.state
            .templates()
            .iter()
            .map(|t| StratagemTemplate::clone(t))
            .collect()
    }

    /// Create or replace a template, persist the store and re-resolve bindings.
    ///
    /// Returns the names of bindings that no longer resolve.
    pub fn update_template(
        &self,
        name: &str,
        category: Option<&str>,
        directions: Vec<Direction>,
    ) -> Result<Vec<String>, ControlError> {
        let mut templates = self.state.templates_mut();
        let category = category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .or_else(|| templates.get(name.trim()).map(|t| t.category.clone()))
            .unwrap_or_else(|| NEW_TEMPLATE_CATEGORY.to_string());

        let template = StratagemTemplate::new(name, category, directions)?;
        let mut updated = templates.clone();
        updated.upsert(template);
        updated.save(&self.templates_path)?;
        *templates = updated;

        let dropped = self.state.bindings_mut().rebind(&templates);
        info!(name = name.trim(), count = templates.len(), "template store updated");
        Ok(dropped)
    }

    // -- Profiles ---------------------------------------------------------

    pub fn list_profiles(&self) -> Result<Vec<String>, ControlError> {
        Ok(self.profiles.list()?)
    }

    pub fn save_profile(&self, name: &str) -> Result<(), ControlError> {
        let profile = self.current_profile();
        self.profiles.save(name, &profile)?;
        *self.baseline() = profile;

        let name = name.trim().to_string();
        self.record_last_profile(&name);
        self.state.set_profile_name(Some(name.clone()));
        self.emit(ActivityEvent::ProfileSaved { name });
        Ok(())
    }

    /// Replace bindings and configuration with a saved profile.
    ///
    /// Returns template names the profile referenced that no longer exist;
    /// their slots are left empty.
    pub fn load_profile(&self, name: &str) -> Result<Vec<String>, ControlError> {
        let profile = self.profiles.load(name)?;
        let (bindings, missing) = profile.resolve(&self.state.templates());
        self.apply(bindings, profile.config);
        self.mark_saved();

        let name = name.trim().to_string();
        if missing.is_empty() {
            info!(%name, "profile loaded");
        } else {
            warn!(%name, ?missing, "profile loaded with missing macros");
        }
        self.record_last_profile(&name);
        self.state.set_profile_name(Some(name.clone()));
        self.emit(ActivityEvent::ProfileLoaded {
            name,
            missing: missing.clone(),
        });
        Ok(missing)
    }

    /// Reset to defaults and forget the last profile
    pub fn new_profile(&self) {
        self.apply(SlotBindings::default(), MacroConfig::default());
        self.mark_saved();
        self.state.set_profile_name(None);
        if let Err(e) = self.profiles.clear_last_profile() {
            warn!(%e, "failed to clear last profile pointer");
        }
        info!("blank profile loaded");
        self.emit(ActivityEvent::ProfileReset);
    }

    /// Startup auto-load; failures are logged and leave the defaults
    pub fn load_last_profile(&self) -> Option<Vec<String>> {
        let name = self.profiles.last_profile()?;
        match self.load_profile(&name) {
            Ok(missing) => Some(missing),
            Err(e) => {
                warn!(%name, %e, "last profile could not be loaded");
                None
            }
        }
    }

    fn apply(&self, bindings: SlotBindings, config: MacroConfig) {
        *self.state.bindings_mut() = bindings;
        *self.state.config_mut() = config;
    }

    fn current_profile(&self) -> Profile {
        Profile::capture(&self.state.bindings(), &self.state.macro_config())
    }

    fn baseline(&self) -> std::sync::MutexGuard<'_, Profile> {
        self.baseline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the live state as the new unsaved-changes reference
    fn mark_saved(&self) {
        let current = self.current_profile();
        *self.baseline() = current;
    }

    /// Compare the live state against the last save, load or reset
    pub fn has_unsaved_changes(&self) -> bool {
        let current = self.current_profile();
        current != *self.baseline()
    }

    fn record_last_profile(&self, name: &str) {
        if let Err(e) = self.profiles.set_last_profile(name) {
            warn!(%name, %e, "failed to record last profile");
        }
    }

    // -- Status -----------------------------------------------------------

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            listening: self.listener.is_running(),
            playing: self.listener.is_busy(),
            profile: self.state.profile_name(),
            unsaved: self.has_unsaved_changes(),
            slots: self.state.bindings().view(),
            config: self.state.macro_config(),
            templates: self.state.templates().len(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}
