//! Global hotkey listener
//!
//! Registers an event sink with the `InputSource` and turns numpad presses
//! into playback requests. The sink runs on the hook's own thread, so it
//! only does edge detection, a binding lookup and a non-blocking hand-off
//! to the `macro-player` thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::events::{ActivityEvent, StopReason};
use crate::player::{self, MacroPlayer, PlaybackRequest};
use crate::state::AppState;

use super::keys::{KeyEvent, KeyTracker, Signal, SlotId, EXIT_CHORD};
use super::source::{EventSink, InputError, InputSource, KeyInjector};

/// Errors that can occur when starting the listener
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("already listening")]
    AlreadyListening,

    #[error(transparent)]
    HookInstall(#[from] InputError),

    #[error("failed to spawn player thread: {0}")]
    ThreadSpawn(String),
}

/// Watches the keyboard and dispatches stratagem playback
pub struct HotkeyListener {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn InputSource>,
    state: Arc<AppState>,
    tracker: Mutex<KeyTracker>,
    /// Set while a macro is queued or playing
    busy: Arc<AtomicBool>,
    playback_tx: SyncSender<PlaybackRequest>,
    events: broadcast::Sender<ActivityEvent>,
}

impl HotkeyListener {
    /// Create the listener and its player thread
    pub fn new(
        source: Arc<dyn InputSource>,
        injector: Arc<dyn KeyInjector>,
        state: Arc<AppState>,
        events: broadcast::Sender<ActivityEvent>,
    ) -> Result<Self, ListenerError> {
        let (playback_tx, playback_rx) = mpsc::sync_channel(1);
        let busy = Arc::new(AtomicBool::new(false));

        player::spawn_worker(
            MacroPlayer::new(injector),
            playback_rx,
            Arc::clone(&busy),
            events.clone(),
        )
        .map_err(|e| ListenerError::ThreadSpawn(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                source,
                state,
                tracker: Mutex::new(KeyTracker::default()),
                busy,
                playback_tx,
                events,
            }),
        })
    }

    /// Install the keyboard hook and start accepting triggers.
    ///
    /// On failure listening stays off and nothing is retried.
    pub fn start(&self) -> Result<(), ListenerError> {
        let inner = &self.inner;
        if !inner.state.claim_listening() {
            return Err(ListenerError::AlreadyListening);
        }

        inner.tracker().reset();
        let weak: Weak<Inner> = Arc::downgrade(inner);
        let sink: EventSink = Arc::new(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_event(event);
            }
        });

        if let Err(e) = inner.source.register(sink) {
            inner.state.set_listening(false);
            error!(%e, "failed to install keyboard hook");
            let _ = inner.events.send(ActivityEvent::HookInstallFailed {
                message: e.to_string(),
            });
            return Err(e.into());
        }

        info!(exit = %EXIT_CHORD, "listening for numpad hotkeys");
        let _ = inner.events.send(ActivityEvent::ListeningStarted);
        Ok(())
    }

    /// Remove the hook. Returns whether the listener was running.
    pub fn stop(&self, reason: StopReason) -> bool {
        self.inner.stop(reason)
    }

    /// Check if the listener is currently accepting triggers
    pub fn is_running(&self) -> bool {
        self.inner.state.is_listening()
    }

    /// Check if a macro is queued or playing
    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::SeqCst)
    }
}

impl Inner {
    fn tracker(&self) -> std::sync::MutexGuard<'_, KeyTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop(&self, reason: StopReason) -> bool {
        let was_listening = self.state.set_listening(false);
        self.source.unregister();
        self.tracker().reset();

        if was_listening {
            info!(?reason, "listener stopped");
            let _ = self.events.send(ActivityEvent::ListeningStopped { reason });
        }
        was_listening
    }

    /// Hook callback: must never block
    fn handle_event(&self, event: KeyEvent) {
        if !self.state.is_listening() {
            return;
        }

        let signal = self.tracker().observe(event);
        match signal {
            Signal::None => {}
            Signal::Exit => {
                info!(chord = %EXIT_CHORD, "exit hotkey pressed");
                self.stop(StopReason::ExitHotkey);
            }
            Signal::Press(key) => {
                if let Some(slot) = self.state.slot_for_key(key) {
                    self.trigger(slot);
                }
            }
        }
    }

    fn trigger(&self, slot: SlotId) {
        let Some(template) = self.state.binding(slot) else {
            debug!(%slot, "slot unbound, ignoring");
            return;
        };

        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!(%slot, name = %template.name, "macro already playing, trigger dropped");
            let _ = self.events.send(ActivityEvent::TriggerDropped { slot });
            return;
        }

        let request = PlaybackRequest {
            slot,
            template,
            config: self.state.macro_config(),
        };
        match self.playback_tx.try_send(request) {
            Ok(()) => {}
            Err(TrySendError::Full(request)) => {
                // busy flag and channel disagree; treat as busy
                self.busy.store(false, Ordering::SeqCst);
                warn!(%slot, name = %request.template.name, "player queue full, trigger dropped");
                let _ = self.events.send(ActivityEvent::TriggerDropped { slot });
            }
            Err(TrySendError::Disconnected(_)) => {
                self.busy.store(false, Ordering::SeqCst);
                error!(%slot, "player thread is gone");
            }
        }
    }
}
