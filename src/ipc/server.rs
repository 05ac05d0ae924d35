//! Unix domain socket server for IPC
//!
//! Provides request-response access to the controller and pushes activity
//! events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::events::{ActivityEvent, StopReason};
use crate::lifecycle::ShutdownSignal;
use crate::state::{ControlError, Controller};

use super::protocol::{Notification, Request, Response, MAX_MESSAGE_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    controller: Arc<Controller>,
    shutdown: ShutdownSignal,
    /// Closes client connections on shutdown
    disconnect_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the socket, replacing a stale one
    pub fn new(
        socket_path: &Path,
        controller: Arc<Controller>,
        shutdown: ShutdownSignal,
    ) -> Result<Self> {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // owner-only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .context("failed to restrict socket permissions")?;
        }

        let (disconnect_tx, _) = broadcast::channel(1);
        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            controller,
            shutdown,
            disconnect_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let controller = Arc::clone(&self.controller);
                    let shutdown = self.shutdown.clone();
                    let mut disconnect_rx = self.disconnect_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, controller, shutdown) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = disconnect_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.disconnect_tx.send(());

        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Serve one client until it disconnects.
///
/// Frames are read on a separate task so a pending read never races with
/// event delivery.
async fn handle_client(
    stream: UnixStream,
    controller: Arc<Controller>,
    shutdown: ShutdownSignal,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();
    let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(8);

    let reader_task = tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(Some(body)) => {
                    if frame_tx.send(body).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(?e, "dropping client");
                    break;
                }
            }
        }
    });

    let mut events: Option<broadcast::Receiver<ActivityEvent>> = None;
    let result = loop {
        tokio::select! {
            frame = frame_rx.recv() => {
                let Some(body) = frame else {
                    debug!("client disconnected");
                    break Ok(());
                };
                let response = match serde_json::from_slice::<Request>(&body) {
                    Ok(Request::Subscribe) => {
                        if events.is_none() {
                            events = Some(controller.subscribe());
                            debug!("client subscribed to notifications");
                        }
                        Response::Subscribed
                    }
                    Ok(request) => {
                        debug!(?request, "received request");
                        process_request(request, &controller, &shutdown).await
                    }
                    Err(e) => Response::error("bad_request", e.to_string()),
                };
                if let Err(e) = write_message(&mut writer, &response).await {
                    break Err(e);
                }
            }
            event = next_event(&mut events) => {
                match event {
                    Ok(event) => {
                        if let Err(e) = write_message(&mut writer, &Notification::Event { event }).await {
                            break Err(e);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        events = None;
                    }
                }
            }
        }
    };

    reader_task.abort();
    result
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<ActivityEvent>>,
) -> Result<ActivityEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Read one length-prefixed frame; `None` on clean disconnect
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        bail!("message of {} bytes exceeds limit", len);
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .context("truncated message body")?;
    Ok(Some(body))
}

/// Send a length-prefixed JSON message
async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = u32::try_from(msg_bytes.len())
        .context("response too large")?
        .to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;
    writer.flush().await?;

    Ok(())
}

/// Run a request against the controller off the async runtime.
///
/// Controller calls may block briefly (file I/O, hook installation).
async fn process_request(
    request: Request,
    controller: &Arc<Controller>,
    shutdown: &ShutdownSignal,
) -> Response {
    match request {
        Request::Ping => Response::Pong,
        Request::Shutdown => {
            info!("shutdown requested via IPC");
            shutdown.trigger();
            Response::Ok
        }
        request => {
            let controller = Arc::clone(controller);
            match tokio::task::spawn_blocking(move || dispatch(request, &controller)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    warn!(code = e.code(), %e, "request failed");
                    Response::error(e.code(), e.to_string())
                }
                Err(e) => {
                    error!(?e, "request handler panicked");
                    Response::error("internal", e.to_string())
                }
            }
        }
    }
}

fn dispatch(request: Request, controller: &Controller) -> Result<Response, ControlError> {
    let response = match request {
        Request::Ping => Response::Pong,
        Request::GetStatus => Response::Status(controller.status()),
        Request::StartListening => {
            controller.start_listening()?;
            Response::Ok
        }
        Request::StopListening => {
            controller.stop_listening(StopReason::Requested);
            Response::Ok
        }
        Request::AssignSlot { slot, template } => {
            controller.assign_slot(slot, &template)?;
            Response::Ok
        }
        Request::ClearSlot { slot } => {
            controller.clear_slot(slot);
            Response::Ok
        }
        Request::SetTiming { delay_ms, hold_ms } => {
            controller.set_timing(
                Duration::from_millis(delay_ms),
                Duration::from_millis(hold_ms),
            )?;
            Response::Ok
        }
        Request::SetPanel { key, auto } => {
            controller.set_panel(key, auto);
            Response::Ok
        }
        Request::SetDirectionKey { direction, key } => {
            controller.set_direction_key(direction, key);
            Response::Ok
        }
        Request::SetSlotHotkey { slot, key } => {
            controller.set_slot_hotkey(slot, key)?;
            Response::Ok
        }
        Request::ListTemplates => Response::Templates {
            templates: controller.templates(),
        },
        Request::UpdateTemplate {
            name,
            category,
            directions,
        } => Response::TemplateUpdated {
            dropped: controller.update_template(&name, category.as_deref(), directions)?,
        },
        Request::ListProfiles => Response::Profiles {
            names: controller.list_profiles()?,
        },
        Request::LoadProfile { name } => {
            let missing = controller.load_profile(&name)?;
            Response::ProfileLoaded {
                name: name.trim().to_string(),
                missing,
            }
        }
        Request::SaveProfile { name } => {
            controller.save_profile(&name)?;
            Response::Ok
        }
        Request::NewProfile => {
            controller.new_profile();
            Response::Ok
        }
        // answered before dispatch
        Request::Subscribe | Request::Shutdown => Response::Ok,
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::hotkey::testing::{RecordingInjector, ScriptedSource};
    use crate::hotkey::{HotkeyListener, Key};
    use crate::profile::ProfileStore;
    use crate::state::AppState;
    use crate::stratagem::{Direction, StratagemTemplate, TemplateStore};

    fn controller(dir: &Path) -> (Arc<Controller>, Arc<ScriptedSource>) {
        let store = TemplateStore::new([StratagemTemplate::new(
            "Resupply",
            "Supply",
            vec![Direction::Down, Direction::Down, Direction::Up, Direction::Right],
        )
        .unwrap()]);
        let state = Arc::new(AppState::new(store));
        let source = Arc::new(ScriptedSource::default());
        let (events, _) = broadcast::channel(64);
        let listener = HotkeyListener::new(
            source.clone(),
            Arc::new(RecordingInjector::default()),
            Arc::clone(&state),
            events.clone(),
        )
        .unwrap();
        let controller = Controller::new(
            state,
            listener,
            ProfileStore::new(dir.join("saves")),
            dir.join("stratagems.md"),
            events,
        );
        (Arc::new(controller), source)
    }

    async fn call(stream: &mut UnixStream, request: Value) -> Value {
        write_message(stream, &request).await.unwrap();
        let body = read_frame(stream).await.unwrap().unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_request_response_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, source) = controller(dir.path());
        let (mut client, server_side) = UnixStream::pair().unwrap();
        tokio::spawn(handle_client(server_side, controller, ShutdownSignal::new()));

        assert_eq!(call(&mut client, json!({"type": "ping"})).await["type"], "pong");

        let resp = call(
            &mut client,
            json!({"type": "assign_slot", "slot": 8, "template": "Nope"}),
        )
        .await;
        assert_eq!(resp["type"], "error");
        assert_eq!(resp["code"], "unknown_template");

        let resp = call(
            &mut client,
            json!({"type": "assign_slot", "slot": 8, "template": "Resupply"}),
        )
        .await;
        assert_eq!(resp["type"], "ok");

        let resp = call(&mut client, json!({"type": "start_listening"})).await;
        assert_eq!(resp["type"], "ok");
        assert!(source.is_registered());

        let status = call(&mut client, json!({"type": "get_status"})).await;
        assert_eq!(status["type"], "status");
        assert_eq!(status["listening"], true);
        assert_eq!(status["slots"][1]["slot"], 8);
        assert_eq!(status["slots"][1]["template"], "Resupply");

        assert_eq!(status["unsaved"], true);

        let resp = call(
            &mut client,
            json!({"type": "set_slot_hotkey", "slot": 7, "key": "num 8"}),
        )
        .await;
        assert_eq!(resp["code"], "hotkey_in_use");

        let resp = call(&mut client, json!({"type": "set_mode"})).await;
        assert_eq!(resp["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, source) = controller(dir.path());
        let (mut client, server_side) = UnixStream::pair().unwrap();
        tokio::spawn(handle_client(server_side, controller, ShutdownSignal::new()));

        let resp = call(&mut client, json!({"type": "subscribe"})).await;
        assert_eq!(resp["type"], "subscribed");

        let resp = call(&mut client, json!({"type": "start_listening"})).await;
        let notification: Value = if resp["type"] == "event" {
            resp
        } else {
            let body = read_frame(&mut client).await.unwrap().unwrap();
            serde_json::from_slice(&body).unwrap()
        };
        assert_eq!(notification["type"], "event");
        assert_eq!(notification["event"]["type"], "listening_started");

        // exit chord arrives as a pushed event
        source.emit(crate::hotkey::KeyEvent::press(Key::Ctrl));
        source.emit(crate::hotkey::KeyEvent::press(Key::Shift));
        source.emit(crate::hotkey::KeyEvent::press(Key::Letter('q')));
        let mut stopped = None;
        for _ in 0..3 {
            let body = read_frame(&mut client).await.unwrap().unwrap();
            let value: Value = serde_json::from_slice(&body).unwrap();
            if value["type"] == "event" && value["event"]["type"] == "listening_stopped" {
                stopped = Some(value);
                break;
            }
        }
        assert_eq!(stopped.unwrap()["event"]["reason"], "exit_hotkey");
    }

    #[tokio::test]
    async fn test_oversized_frame_drops_client() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _source) = controller(dir.path());
        let (mut client, server_side) = UnixStream::pair().unwrap();
        let handler = tokio::spawn(handle_client(server_side, controller, ShutdownSignal::new()));

        client
            .write_all(&((MAX_MESSAGE_LEN as u32) + 1).to_le_bytes())
            .await
            .unwrap();
        assert!(handler.await.unwrap().is_ok());
        assert!(read_frame(&mut client).await.unwrap().is_none());
    }

    #[test]
    fn test_shutdown_request_triggers_signal() {
        tokio_test::block_on(async {
            let dir = tempfile::tempdir().unwrap();
            let (controller, _source) = controller(dir.path());
            let shutdown = ShutdownSignal::new();

            let response = process_request(Request::Shutdown, &controller, &shutdown).await;
            assert!(matches!(response, Response::Ok));
            shutdown.wait().await.unwrap();
        });
    }
}
