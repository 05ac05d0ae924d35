//! OS input boundary
//!
//! The listener only talks to the keyboard through `InputSource`
//! (global hook registration) and the player through `KeyInjector`
//! (synthetic key events), so both can be swapped for in-memory doubles.

use std::sync::Arc;

use super::keys::{Key, KeyAction, KeyEvent};

/// Callback invoked for every raw key transition while registered
pub type EventSink = Arc<dyn Fn(KeyEvent) + Send + Sync>;

/// A global keyboard hook
pub trait InputSource: Send + Sync {
    /// Install the hook and start delivering events to `sink`.
    ///
    /// Replaces any previously registered sink.
    fn register(&self, sink: EventSink) -> Result<(), InputError>;

    /// Stop delivering events. Safe to call when not registered.
    fn unregister(&self);
}

/// Synthesizes key events at the OS level
pub trait KeyInjector: Send + Sync {
    fn send(&self, key: Key, action: KeyAction) -> Result<(), InputError>;

    fn press(&self, key: Key) -> Result<(), InputError> {
        self.send(key, KeyAction::Press)
    }

    fn release(&self, key: Key) -> Result<(), InputError> {
        self.send(key, KeyAction::Release)
    }
}

/// Errors raised at the OS input boundary
#[derive(Debug, Clone, thiserror::Error)]
pub enum InputError {
    #[error("failed to install keyboard hook: {0}")]
    HookInstall(String),

    #[error("failed to inject {action} of key '{key}': {message}")]
    Injection {
        key: Key,
        action: KeyAction,
        message: String,
    },
}

/// In-memory doubles for the input boundary
#[cfg(test)]
pub mod testing {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;

    /// Input source fed by the test instead of the OS
    #[derive(Default)]
    pub struct ScriptedSource {
        sink: Mutex<Option<EventSink>>,
        deny: AtomicBool,
    }

    impl ScriptedSource {
        /// Make the next registrations fail like a missing permission
        pub fn deny_registration(&self, deny: bool) {
            self.deny.store(deny, Ordering::SeqCst);
        }

        pub fn is_registered(&self) -> bool {
            self.sink.lock().unwrap().is_some()
        }

        /// Deliver an event to the registered sink, if any
        pub fn emit(&self, event: KeyEvent) {
            let sink = self.sink.lock().unwrap().clone();
            if let Some(sink) = sink {
                sink(event);
            }
        }

        pub fn tap(&self, key: Key) {
            self.emit(KeyEvent::press(key));
            self.emit(KeyEvent::release(key));
        }
    }

    impl InputSource for ScriptedSource {
        fn register(&self, sink: EventSink) -> Result<(), InputError> {
            if self.deny.load(Ordering::SeqCst) {
                return Err(InputError::HookInstall("access denied".to_string()));
            }
            *self.sink.lock().unwrap() = Some(sink);
            Ok(())
        }

        fn unregister(&self) {
            *self.sink.lock().unwrap() = None;
        }
    }

    /// Injector that records every synthesized event with its timestamp
    #[derive(Default)]
    pub struct RecordingInjector {
        sent: Mutex<Vec<(Instant, KeyEvent)>>,
        fail_at: Mutex<Option<usize>>,
    }

    impl RecordingInjector {
        /// Fail the n-th event (zero-based) and every one after it
        pub fn fail_at(&self, index: usize) {
            *self.fail_at.lock().unwrap() = Some(index);
        }

        pub fn events(&self) -> Vec<KeyEvent> {
            self.sent.lock().unwrap().iter().map(|(_, e)| *e).collect()
        }

        pub fn timed_events(&self) -> Vec<(Instant, KeyEvent)> {
            self.sent.lock().unwrap().clone()
        }

        pub fn presses(&self) -> Vec<Key> {
            self.events()
                .into_iter()
                .filter(|e| e.action == KeyAction::Press)
                .map(|e| e.key)
                .collect()
        }
    }

    impl KeyInjector for RecordingInjector {
        fn send(&self, key: Key, action: KeyAction) -> Result<(), InputError> {
            let mut sent = self.sent.lock().unwrap();
            if let Some(limit) = *self.fail_at.lock().unwrap() {
                if sent.len() >= limit {
                    return Err(InputError::Injection {
                        key,
                        action,
                        message: "event rejected".to_string(),
                    });
                }
            }
            sent.push((Instant::now(), KeyEvent { key, action }));
            Ok(())
        }
    }
}
