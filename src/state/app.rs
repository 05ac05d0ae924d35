//! Shared application state
//!
//! The controller is the only writer. The keyboard hook callback reads
//! bindings and config through the same locks, so a trigger always sees
//! a consistent snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::hotkey::{Key, SlotId};
use crate::player::MacroConfig;
use crate::stratagem::{StratagemTemplate, TemplateStore};

/// Slot to template assignments for the nine numpad keys
#[derive(Debug, Clone, Default)]
pub struct SlotBindings {
    slots: [Option<Arc<StratagemTemplate>>; 9],
}

/// One row of the binding grid as reported to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub slot: SlotId,
    pub template: Option<String>,
}

impl SlotBindings {
    pub fn get(&self, slot: SlotId) -> Option<Arc<StratagemTemplate>> {
        self.slots[slot.index()].clone()
    }

    pub fn set(&mut self, slot: SlotId, template: Option<Arc<StratagemTemplate>>) {
        self.slots[slot.index()] = template;
    }

    /// Bound template name for a slot
    pub fn name(&self, slot: SlotId) -> Option<&str> {
        self.slots[slot.index()].as_deref().map(|t| t.name.as_str())
    }

    /// Rows in numpad layout order
    pub fn view(&self) -> Vec<SlotView> {
        SlotId::LAYOUT
            .iter()
            .map(|slot| SlotView {
                slot: *slot,
                template: self.name(*slot).map(str::to_string),
            })
            .collect()
    }

    /// Point every binding at the store's current template of the same name.
    ///
    /// Bindings whose template disappeared become empty; their names are
    /// returned.
    pub fn rebind(&mut self, store: &TemplateStore) -> Vec<String> {
        let mut dropped = Vec::new();
        for slot in self.slots.iter_mut() {
            if let Some(current) = slot.take() {
                match store.get(&current.name) {
                    Some(fresh) => *slot = Some(fresh),
                    None => dropped.push(current.name.clone()),
                }
            }
        }
        dropped
    }
}

/// Process-wide state shared by the controller and the listener
#[derive(Debug, Default)]
pub struct AppState {
    listening: AtomicBool,
    bindings: RwLock<SlotBindings>,
    config: RwLock<MacroConfig>,
    templates: RwLock<TemplateStore>,
    profile: RwLock<Option<String>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl AppState {
    pub fn new(templates: TemplateStore) -> Self {
        Self {
            templates: RwLock::new(templates),
            ..Self::default()
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Returns the previous value
    pub(crate) fn set_listening(&self, listening: bool) -> bool {
        self.listening.swap(listening, Ordering::SeqCst)
    }

    /// Flip the flag from off to on; `false` if it was already on
    pub(crate) fn claim_listening(&self) -> bool {
        self.listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn binding(&self, slot: SlotId) -> Option<Arc<StratagemTemplate>> {
        read(&self.bindings).get(slot)
    }

    pub fn bindings(&self) -> RwLockReadGuard<'_, SlotBindings> {
        read(&self.bindings)
    }

    pub(crate) fn bindings_mut(&self) -> RwLockWriteGuard<'_, SlotBindings> {
        write(&self.bindings)
    }

    /// Slot whose trigger key is `key`
    pub fn slot_for_key(&self, key: Key) -> Option<SlotId> {
        read(&self.config).slot_hotkeys.slot_for(key)
    }

    /// Snapshot taken by the listener at trigger time
    pub fn macro_config(&self) -> MacroConfig {
        read(&self.config).clone()
    }

    pub(crate) fn config_mut(&self) -> RwLockWriteGuard<'_, MacroConfig> {
        write(&self.config)
    }

    pub fn templates(&self) -> RwLockReadGuard<'_, TemplateStore> {
        read(&self.templates)
    }

    pub(crate) fn templates_mut(&self) -> RwLockWriteGuard<'_, TemplateStore> {
        write(&self.templates)
    }

    pub fn profile_name(&self) -> Option<String> {
        read(&self.profile).clone()
    }

    pub(crate) fn set_profile_name(&self, name: Option<String>) {
        *write(&self.profile) = name;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stratagem::Direction;

    fn template(name: &str, directions: Vec<Direction>) -> StratagemTemplate {
        StratagemTemplate::new(name, "Test", directions).unwrap()
    }

    #[test]
    fn test_view_follows_numpad_layout() {
        let mut bindings = SlotBindings::default();
        let slot = SlotId::new(4).unwrap();
        bindings.set(slot, Some(Arc::new(template("Eagle Strafing Run", vec![Direction::Up]))));

        let view = bindings.view();
        let digits: Vec<u8> = view.iter().map(|row| u8::from(row.slot)).collect();
        assert_eq!(digits, vec![7, 8, 9, 4, 5, 6, 1, 2, 3]);
        assert_eq!(view[3].template.as_deref(), Some("Eagle Strafing Run"));
        assert!(view[0].template.is_none());
    }

    #[test]
    fn test_rebind_refreshes_and_drops() {
        let old = TemplateStore::new([
            template("Resupply", vec![Direction::Down]),
            template("Hellbomb", vec![Direction::Down, Direction::Up]),
        ]);
        let mut bindings = SlotBindings::default();
        bindings.set(SlotId::new(1).unwrap(), old.get("Resupply"));
        bindings.set(SlotId::new(2).unwrap(), old.get("Hellbomb"));

        let new = TemplateStore::new([template("Resupply", vec![Direction::Left])]);
        let dropped = bindings.rebind(&new);

        assert_eq!(dropped, vec!["Hellbomb".to_string()]);
        assert_eq!(
            bindings.get(SlotId::new(1).unwrap()).unwrap().directions,
            vec![Direction::Left]
        );
        assert!(bindings.get(SlotId::new(2).unwrap()).is_none());
    }

    #[test]
    fn test_listening_flag_swap() {
        let state = AppState::default();
        assert!(!state.is_listening());
        assert!(!state.set_listening(true));
        assert!(state.set_listening(false));
    }

    #[test]
    fn test_claim_listening_only_once() {
        let state = AppState::default();
        assert!(state.claim_listening());
        assert!(!state.claim_listening());
        state.set_listening(false);
        assert!(state.claim_listening());
    }

    #[test]
    fn test_slot_lookup_follows_config() {
        let state = AppState::default();
        let two = SlotId::new(2).unwrap();
        assert_eq!(state.slot_for_key(Key::Numpad(2)), Some(two));

        state.config_mut().slot_hotkeys.set(two, Key::Letter('g'));
        assert_eq!(state.slot_for_key(Key::Letter('g')), Some(two));
        assert_eq!(state.slot_for_key(Key::Numpad(2)), None);
    }
}
