//! Macro playback
//!
//! Turns a direction sequence into timed press/release pairs through a
//! `KeyInjector`. Playback is blocking and lives on its own
//! `macro-player` thread so the keyboard hook callback never sleeps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::events::ActivityEvent;
use crate::hotkey::{InputError, KeyInjector, SlotId};
use crate::stratagem::{Direction, StratagemTemplate};

use super::config::MacroConfig;

/// Outcome of a completed playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    /// Press-release pairs issued, panel key included
    pub keys: usize,
    pub elapsed: Duration,
}

/// Errors that abort a playback
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("key injection failed after {completed} of {total} keys: {source}")]
    Injection {
        completed: usize,
        total: usize,
        #[source]
        source: InputError,
    },
}

/// Synthesizes stratagem sequences
#[derive(Clone)]
pub struct MacroPlayer {
    injector: Arc<dyn KeyInjector>,
}

impl MacroPlayer {
    pub fn new(injector: Arc<dyn KeyInjector>) -> Self {
        Self { injector }
    }

    /// Press and release every key of the sequence in order.
    ///
    /// The first failed injection abandons the rest of the sequence.
    /// Keys already pressed are not rolled back.
    pub fn play(
        &self,
        directions: &[Direction],
        config: &MacroConfig,
    ) -> Result<PlaybackReport, PlayerError> {
        let keys = config.key_sequence(directions);
        let total = keys.len();
        let started = Instant::now();

        if config.auto_panel {
            debug!(panel_key = %config.panel_key, "auto panel on, prepending panel key");
        }

        for (completed, key) in keys.iter().enumerate() {
            if completed > 0 {
                thread::sleep(config.delay);
            }
            let abort = |source| PlayerError::Injection {
                completed,
                total,
                source,
            };
            self.injector.press(*key).map_err(abort)?;
            thread::sleep(config.hold);
            self.injector.release(*key).map_err(abort)?;
        }

        Ok(PlaybackReport {
            keys: total,
            elapsed: started.elapsed(),
        })
    }
}

/// A trigger handed from the listener to the player thread
#[derive(Debug, Clone)]
pub struct PlaybackRequest {
    pub slot: SlotId,
    pub template: Arc<StratagemTemplate>,
    pub config: MacroConfig,
}

/// Run playback requests until every sender is dropped.
///
/// `busy` is set by the listener before handing a request over and cleared
/// here once playback ends, before the completion event goes out.
pub fn spawn_worker(
    player: MacroPlayer,
    requests: Receiver<PlaybackRequest>,
    busy: Arc<AtomicBool>,
    events: broadcast::Sender<ActivityEvent>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("macro-player".to_string())
        .spawn(move || {
            info!("macro player thread started");

            while let Ok(request) = requests.recv() {
                let PlaybackRequest {
                    slot,
                    template,
                    config,
                } = request;
                let keys = config.key_sequence(&template.directions).len();

                info!(%slot, name = %template.name, keys, "macro triggered");
                let _ = events.send(ActivityEvent::MacroStarted {
                    slot,
                    name: template.name.clone(),
                    keys,
                    estimated_ms: config.estimated_duration(keys).as_millis() as u64,
                });

                let result = player.play(&template.directions, &config);
                busy.store(false, Ordering::SeqCst);

                let event = match result {
                    Ok(report) => {
                        info!(%slot, name = %template.name, elapsed = ?report.elapsed, "macro done");
                        ActivityEvent::MacroCompleted {
                            slot,
                            name: template.name.clone(),
                            duration_ms: report.elapsed.as_millis() as u64,
                        }
                    }
                    Err(PlayerError::Injection {
                        completed, source, ..
                    }) => {
                        error!(%slot, name = %template.name, completed, %source, "macro aborted");
                        ActivityEvent::MacroFailed {
                            slot,
                            name: template.name.clone(),
                            completed,
                            message: source.to_string(),
                        }
                    }
                };
                let _ = events.send(event);
            }

            info!("macro player thread stopped");
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::testing::RecordingInjector;
    use crate::hotkey::{Key, KeyAction, KeyEvent};

    fn fast_config() -> MacroConfig {
        MacroConfig {
            delay: Duration::from_millis(4),
            hold: Duration::from_millis(3),
            ..MacroConfig::default()
        }
    }

    fn player() -> (MacroPlayer, Arc<RecordingInjector>) {
        let injector = Arc::new(RecordingInjector::default());
        (MacroPlayer::new(injector.clone()), injector)
    }

    const SEQUENCE: [Direction; 3] = [Direction::Down, Direction::Up, Direction::Right];

    #[test]
    fn test_plays_pairs_in_order() {
        let (player, injector) = player();
        let report = player.play(&SEQUENCE, &fast_config()).unwrap();

        assert_eq!(report.keys, 3);
        assert_eq!(
            injector.events(),
            vec![
                KeyEvent::press(Key::Down),
                KeyEvent::release(Key::Down),
                KeyEvent::press(Key::Up),
                KeyEvent::release(Key::Up),
                KeyEvent::press(Key::Right),
                KeyEvent::release(Key::Right),
            ]
        );
    }

    #[test]
    fn test_panel_key_comes_first_when_enabled() {
        let (player, injector) = player();
        let config = MacroConfig {
            auto_panel: true,
            panel_key: Key::Ctrl,
            ..fast_config()
        };
        player.play(&SEQUENCE, &config).unwrap();

        let events = injector.events();
        assert_eq!(events.len(), 2 * (SEQUENCE.len() + 1));
        assert_eq!(events[0], KeyEvent::press(Key::Ctrl));
        assert_eq!(events[1], KeyEvent::release(Key::Ctrl));
        assert_eq!(events[2], KeyEvent::press(Key::Down));
    }

    #[test]
    fn test_no_panel_key_when_disabled() {
        let (player, injector) = player();
        player.play(&SEQUENCE, &fast_config()).unwrap();

        assert_eq!(injector.events().len(), 2 * SEQUENCE.len());
        assert!(!injector.presses().contains(&Key::Ctrl));
    }

    #[test]
    fn test_timing_respects_hold_and_delay() {
        let (player, injector) = player();
        let config = fast_config();
        player.play(&SEQUENCE, &config).unwrap();

        let timed = injector.timed_events();
        for pair in timed.chunks(2) {
            let (down_at, down) = pair[0];
            let (up_at, up) = pair[1];
            assert_eq!(down.action, KeyAction::Press);
            assert_eq!(up.action, KeyAction::Release);
            assert!(up_at - down_at >= config.hold);
        }
        for gap in timed.windows(2).skip(1).step_by(2) {
            // release of one key to press of the next
            assert!(gap[1].0 - gap[0].0 >= config.delay);
        }
    }

    #[test]
    fn test_injection_failure_abandons_rest() {
        let (player, injector) = player();
        // press+release of first key succeed, second press fails
        injector.fail_at(2);

        let err = player.play(&SEQUENCE, &fast_config()).unwrap_err();
        let PlayerError::Injection {
            completed, total, ..
        } = err;
        assert_eq!(completed, 1);
        assert_eq!(total, 3);
        assert_eq!(injector.events().len(), 2);
    }

    #[test]
    fn test_worker_clears_busy_and_reports() {
        let (player, injector) = player();
        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        let busy = Arc::new(AtomicBool::new(true));
        let (events_tx, mut events_rx) = broadcast::channel(16);
        let handle = spawn_worker(player, rx, busy.clone(), events_tx).unwrap();

        let template =
            StratagemTemplate::new("Resupply", "Supply", SEQUENCE.to_vec()).unwrap();
        tx.send(PlaybackRequest {
            slot: SlotId::new(5).unwrap(),
            template: Arc::new(template),
            config: fast_config(),
        })
        .unwrap();
        drop(tx);
        handle.join().unwrap();

        assert!(!busy.load(Ordering::SeqCst));
        assert_eq!(injector.events().len(), 6);
        assert!(matches!(
            events_rx.try_recv().unwrap(),
            ActivityEvent::MacroStarted { keys: 3, .. }
        ));
        assert!(matches!(
            events_rx.try_recv().unwrap(),
            ActivityEvent::MacroCompleted { .. }
        ));
    }
}
