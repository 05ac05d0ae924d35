//! Native keyboard hook and key injection
//!
//! With the `native-input` feature this wraps `rdev`: `rdev::listen` runs
//! on a dedicated `keyboard-hook` thread and `rdev::simulate` injects
//! events. Without it, both halves report that no backend is available.

use std::sync::Arc;

use super::source::{InputSource, KeyInjector};

/// Build the input source and injector for this platform
pub fn backend() -> (Arc<dyn InputSource>, Arc<dyn KeyInjector>) {
    #[cfg(feature = "native-input")]
    let (source, injector): (Arc<dyn InputSource>, Arc<dyn KeyInjector>) = (
        Arc::new(rdev_backend::RdevSource::new()),
        Arc::new(rdev_backend::RdevInjector),
    );
    #[cfg(not(feature = "native-input"))]
    let (source, injector): (Arc<dyn InputSource>, Arc<dyn KeyInjector>) =
        (Arc::new(unavailable::Unavailable), Arc::new(unavailable::Unavailable));

    (source, injector)
}

#[cfg(not(feature = "native-input"))]
mod unavailable {
    use super::super::keys::{Key, KeyAction};
    use super::super::source::{EventSink, InputError, InputSource, KeyInjector};

    const MESSAGE: &str = "built without native input support (enable the `native-input` feature)";

    pub struct Unavailable;

    impl InputSource for Unavailable {
        fn register(&self, _sink: EventSink) -> Result<(), InputError> {
            Err(InputError::HookInstall(MESSAGE.to_string()))
        }

        fn unregister(&self) {}
    }

    impl KeyInjector for Unavailable {
        fn send(&self, key: Key, action: KeyAction) -> Result<(), InputError> {
            Err(InputError::Injection {
                key,
                action,
                message: MESSAGE.to_string(),
            })
        }
    }
}

#[cfg(feature = "native-input")]
mod rdev_backend {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{self, RecvTimeoutError};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::thread;
    use std::time::Duration;

    use rdev::EventType;
    use tracing::{debug, error, info};

    use super::super::keys::{Key, KeyAction, KeyEvent};
    use super::super::source::{EventSink, InputError, InputSource, KeyInjector};

    /// `rdev::listen` blocks forever once installed and only returns on
    /// failure, so a hook that has not failed within this window is live.
    const HOOK_STARTUP_GRACE: Duration = Duration::from_millis(250);

    /// Global hook backed by `rdev::listen`.
    ///
    /// The hook thread cannot be torn down once started; unregistering
    /// detaches the sink so events are dropped at the source.
    pub struct RdevSource {
        sink: Arc<Mutex<Option<EventSink>>>,
        hook_alive: Arc<AtomicBool>,
        install: Mutex<()>,
    }

    impl RdevSource {
        pub fn new() -> Self {
            Self {
                sink: Arc::new(Mutex::new(None)),
                hook_alive: Arc::new(AtomicBool::new(false)),
                install: Mutex::new(()),
            }
        }

        fn spawn_hook(&self) -> Result<(), InputError> {
            let (err_tx, err_rx) = mpsc::channel::<String>();
            let sink = Arc::clone(&self.sink);
            let alive = Arc::clone(&self.hook_alive);
            alive.store(true, Ordering::SeqCst);

            thread::Builder::new()
                .name("keyboard-hook".to_string())
                .spawn(move || {
                    info!("keyboard hook thread started");
                    let result = rdev::listen(move |event| {
                        let Some(key_event) = convert_event(&event.event_type) else {
                            return;
                        };
                        // Clone out so the sink may unregister itself
                        let current = sink
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .clone();
                        if let Some(sink) = current {
                            sink(key_event);
                        }
                    });
                    alive.store(false, Ordering::SeqCst);
                    if let Err(e) = result {
                        error!(?e, "keyboard hook terminated");
                        let _ = err_tx.send(format!("{:?}", e));
                    }
                })
                .map_err(|e| {
                    self.hook_alive.store(false, Ordering::SeqCst);
                    InputError::HookInstall(format!("failed to spawn hook thread: {}", e))
                })?;

            match err_rx.recv_timeout(HOOK_STARTUP_GRACE) {
                Err(RecvTimeoutError::Timeout) => {
                    info!("keyboard hook installed");
                    Ok(())
                }
                Ok(message) => Err(InputError::HookInstall(message)),
                Err(RecvTimeoutError::Disconnected) => Err(InputError::HookInstall(
                    "hook thread exited during startup".to_string(),
                )),
            }
        }
    }

    impl InputSource for RdevSource {
        fn register(&self, sink: EventSink) -> Result<(), InputError> {
            let _guard = self.install.lock().unwrap_or_else(PoisonError::into_inner);
            if !self.hook_alive.load(Ordering::SeqCst) {
                self.spawn_hook()?;
            }
            *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
            debug!("event sink registered");
            Ok(())
        }

        fn unregister(&self) {
            *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = None;
            debug!("event sink detached");
        }
    }

    /// Injector backed by `rdev::simulate`
    pub struct RdevInjector;

    impl KeyInjector for RdevInjector {
        fn send(&self, key: Key, action: KeyAction) -> Result<(), InputError> {
            let native = to_native(key).ok_or_else(|| InputError::Injection {
                key,
                action,
                message: "no native key code".to_string(),
            })?;
            let event = match action {
                KeyAction::Press => EventType::KeyPress(native),
                KeyAction::Release => EventType::KeyRelease(native),
            };
            rdev::simulate(&event).map_err(|e| InputError::Injection {
                key,
                action,
                message: format!("{:?}", e),
            })
        }
    }

    fn convert_event(event_type: &EventType) -> Option<KeyEvent> {
        match event_type {
            EventType::KeyPress(k) => from_native(*k).map(KeyEvent::press),
            EventType::KeyRelease(k) => from_native(*k).map(KeyEvent::release),
            _ => None,
        }
    }

    const LETTERS: [(rdev::Key, char); 26] = [
        (rdev::Key::KeyA, 'a'),
        (rdev::Key::KeyB, 'b'),
        (rdev::Key::KeyC, 'c'),
        (rdev::Key::KeyD, 'd'),
        (rdev::Key::KeyE, 'e'),
        (rdev::Key::KeyF, 'f'),
        (rdev::Key::KeyG, 'g'),
        (rdev::Key::KeyH, 'h'),
        (rdev::Key::KeyI, 'i'),
        (rdev::Key::KeyJ, 'j'),
        (rdev::Key::KeyK, 'k'),
        (rdev::Key::KeyL, 'l'),
        (rdev::Key::KeyM, 'm'),
        (rdev::Key::KeyN, 'n'),
        (rdev::Key::KeyO, 'o'),
        (rdev::Key::KeyP, 'p'),
        (rdev::Key::KeyQ, 'q'),
        (rdev::Key::KeyR, 'r'),
        (rdev::Key::KeyS, 's'),
        (rdev::Key::KeyT, 't'),
        (rdev::Key::KeyU, 'u'),
        (rdev::Key::KeyV, 'v'),
        (rdev::Key::KeyW, 'w'),
        (rdev::Key::KeyX, 'x'),
        (rdev::Key::KeyY, 'y'),
        (rdev::Key::KeyZ, 'z'),
    ];

    const NUMPAD: [rdev::Key; 10] = [
        rdev::Key::Kp0,
        rdev::Key::Kp1,
        rdev::Key::Kp2,
        rdev::Key::Kp3,
        rdev::Key::Kp4,
        rdev::Key::Kp5,
        rdev::Key::Kp6,
        rdev::Key::Kp7,
        rdev::Key::Kp8,
        rdev::Key::Kp9,
    ];

    const DIGITS: [rdev::Key; 10] = [
        rdev::Key::Num0,
        rdev::Key::Num1,
        rdev::Key::Num2,
        rdev::Key::Num3,
        rdev::Key::Num4,
        rdev::Key::Num5,
        rdev::Key::Num6,
        rdev::Key::Num7,
        rdev::Key::Num8,
        rdev::Key::Num9,
    ];

    const FUNCTION: [rdev::Key; 12] = [
        rdev::Key::F1,
        rdev::Key::F2,
        rdev::Key::F3,
        rdev::Key::F4,
        rdev::Key::F5,
        rdev::Key::F6,
        rdev::Key::F7,
        rdev::Key::F8,
        rdev::Key::F9,
        rdev::Key::F10,
        rdev::Key::F11,
        rdev::Key::F12,
    ];

    fn position(table: &[rdev::Key], key: rdev::Key) -> Option<u8> {
        table.iter().position(|k| *k == key).map(|i| i as u8)
    }

    fn from_native(key: rdev::Key) -> Option<Key> {
        use rdev::Key as K;
        let mapped = match key {
            K::UpArrow => Key::Up,
            K::DownArrow => Key::Down,
            K::LeftArrow => Key::Left,
            K::RightArrow => Key::Right,
            K::ControlLeft => Key::Ctrl,
            K::ControlRight => Key::RightCtrl,
            K::ShiftLeft => Key::Shift,
            K::ShiftRight => Key::RightShift,
            K::Alt => Key::Alt,
            K::AltGr => Key::RightAlt,
            K::Space => Key::Space,
            K::Tab => Key::Tab,
            K::Return | K::KpReturn => Key::Enter,
            K::Escape => Key::Escape,
            K::Unknown(code) => Key::Unknown(code),
            other => {
                if let Some(n) = position(&NUMPAD, other) {
                    Key::Numpad(n)
                } else if let Some(n) = position(&DIGITS, other) {
                    Key::Digit(n)
                } else if let Some(n) = position(&FUNCTION, other) {
                    Key::Function(n + 1)
                } else {
                    let (_, c) = LETTERS.iter().find(|(k, _)| *k == other)?;
                    Key::Letter(*c)
                }
            }
        };
        Some(mapped)
    }

    fn to_native(key: Key) -> Option<rdev::Key> {
        use rdev::Key as K;
        let native = match key {
            Key::Numpad(n) => *NUMPAD.get(usize::from(n))?,
            Key::Digit(n) => *DIGITS.get(usize::from(n))?,
            Key::Function(n) => *FUNCTION.get(usize::from(n).checked_sub(1)?)?,
            Key::Letter(c) => LETTERS.iter().find(|(_, l)| *l == c)?.0,
            Key::Up => K::UpArrow,
            Key::Down => K::DownArrow,
            Key::Left => K::LeftArrow,
            Key::Right => K::RightArrow,
            Key::Ctrl => K::ControlLeft,
            Key::Shift => K::ShiftLeft,
            Key::Alt => K::Alt,
            Key::RightCtrl => K::ControlRight,
            Key::RightShift => K::ShiftRight,
            Key::RightAlt => K::AltGr,
            Key::Space => K::Space,
            Key::Tab => K::Tab,
            Key::Enter => K::Return,
            Key::Escape => K::Escape,
            Key::Unknown(code) => K::Unknown(code),
        };
        Some(native)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_numpad_and_main_row_stay_distinct() {
            assert_eq!(from_native(rdev::Key::Kp7), Some(Key::Numpad(7)));
            assert_eq!(from_native(rdev::Key::Num7), Some(Key::Digit(7)));
            assert_eq!(to_native(Key::Numpad(2)), Some(rdev::Key::Kp2));
        }

        #[test]
        fn test_native_mapping_round_trips() {
            for key in [
                Key::Up,
                Key::Ctrl,
                Key::RightCtrl,
                Key::Letter('w'),
                Key::Function(12),
                Key::Digit(0),
            ] {
                let native = to_native(key).unwrap();
                assert_eq!(from_native(native), Some(key));
            }
            assert_eq!(to_native(Key::Function(13)), None);
        }
    }
}
