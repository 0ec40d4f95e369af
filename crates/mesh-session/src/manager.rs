// Copyright (c) 2024 Omerta Mesh Contributors

//! The tunnel manager actor: handshakes one `TunnelSession` at a time over
//! channel dispatch, preempting any session already in progress (§4.9).

use crate::config::TunnelConfig;
use crate::control::{RejectReason, TunnelControl};
use crate::error::{Result, TunnelError};
use crate::policy::TunnelPolicy;
use crate::session::{TunnelSession, TunnelState};
use mesh_channel::{ChannelDispatcher, ChannelMessage};
use mesh_common::PeerId;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

const HANDSHAKE_CHANNEL: &str = "tunnel-handshake";
const DATA_CHANNEL: &str = "tunnel-data";

/// Notifications pushed upward as the tunnel's state changes.
#[derive(Debug, Clone)]
pub enum TunnelEvent {
    SessionActive { peer_id: PeerId, session_id: Uuid },
    SessionClosed { peer_id: PeerId, session_id: Uuid },
    SessionRejected { peer_id: PeerId, session_id: Uuid },
    Data { peer_id: PeerId, bytes: Vec<u8> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TunnelManagerStats {
    pub has_active_session: bool,
}

enum Command {
    CreateSession {
        peer_id: PeerId,
        reply: oneshot::Sender<Result<Uuid>>,
    },
    SendData {
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<()>>,
    },
    CloseSession,
    Handshake {
        message: ChannelMessage,
    },
    Data {
        message: ChannelMessage,
    },
    Stats {
        reply: oneshot::Sender<TunnelManagerStats>,
    },
}

/// Handle to the running tunnel manager.
#[derive(Clone)]
#[derive(Debug)]
pub struct TunnelHandle {
    commands: mpsc::Sender<Command>,
}

impl TunnelHandle {
    /// Request a new session with `peer_id`, preempting any session
    /// already in progress. Resolves once the remote's `ack` or `reject`
    /// arrives.
    pub async fn create_session(&self, peer_id: PeerId) -> Result<Uuid> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::CreateSession { peer_id, reply })
            .await
            .map_err(|_| TunnelError::Closed)?;
        rx.await.map_err(|_| TunnelError::Closed)?
    }

    /// Send application bytes over the active session's `"tunnel-data"`
    /// channel.
    pub async fn send_data(&self, bytes: Vec<u8>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::SendData { bytes, reply })
            .await
            .map_err(|_| TunnelError::Closed)?;
        rx.await.map_err(|_| TunnelError::Closed)?
    }

    pub async fn close_session(&self) {
        let _ = self.commands.send(Command::CloseSession).await;
    }

    pub async fn stats(&self) -> TunnelManagerStats {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Stats { reply }).await.is_err() {
            return TunnelManagerStats::default();
        }
        rx.await.unwrap_or_default()
    }
}

/// Register the persistent `"tunnel-handshake"` channel and spawn the
/// manager. Fails only if `"tunnel-handshake"` is already registered by
/// another collaborator.
pub fn spawn(
    config: TunnelConfig,
    dispatcher: Arc<ChannelDispatcher>,
    policy: Arc<dyn TunnelPolicy>,
) -> Result<(TunnelHandle, mpsc::Receiver<TunnelEvent>)> {
    let handshake_rx = dispatcher
        .on_channel(HANDSHAKE_CHANNEL)
        .map_err(|_| TunnelError::ChannelUnavailable)?;
    let (command_tx, command_rx) = mpsc::channel(64);
    let (events_tx, events_rx) = mpsc::channel(64);

    tokio::spawn(forward(handshake_rx, command_tx.clone(), |message| {
        Command::Handshake { message }
    }));

    tokio::spawn(run(config, dispatcher, policy, command_rx, command_tx.clone(), events_tx));

    Ok((TunnelHandle { commands: command_tx }, events_rx))
}

async fn forward(
    mut rx: mpsc::Receiver<ChannelMessage>,
    commands: mpsc::Sender<Command>,
    wrap: fn(ChannelMessage) -> Command,
) {
    while let Some(message) = rx.recv().await {
        if commands.send(wrap(message)).await.is_err() {
            break;
        }
    }
}

/// Register `"tunnel-data"` and spawn a task forwarding every message on
/// it back into the manager's command loop as `Command::Data`.
fn spawn_data_forwarder(dispatcher: &Arc<ChannelDispatcher>, self_tx: &mpsc::Sender<Command>) -> Option<JoinHandle<()>> {
    match dispatcher.on_channel(DATA_CHANNEL) {
        Ok(rx) => Some(tokio::spawn(forward(rx, self_tx.clone(), |message| Command::Data { message }))),
        Err(_) => None,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    _config: TunnelConfig,
    dispatcher: Arc<ChannelDispatcher>,
    policy: Arc<dyn TunnelPolicy>,
    mut commands: mpsc::Receiver<Command>,
    self_tx: mpsc::Sender<Command>,
    events: mpsc::Sender<TunnelEvent>,
) {
    let mut current: Option<TunnelSession> = None;
    let mut data_forwarder: Option<JoinHandle<()>> = None;
    let mut pending_create: Option<oneshot::Sender<Result<Uuid>>> = None;

    while let Some(command) = commands.recv().await {
        match command {
            Command::CreateSession { peer_id, reply } => {
                preempt(&dispatcher, &mut current, &mut data_forwarder, &events).await;

                let session_id = Uuid::new_v4();
                let control = TunnelControl::Request { session_id };
                let sent = match control.encode() {
                    Ok(bytes) => dispatcher
                        .send_on_channel(bytes, peer_id, HANDSHAKE_CHANNEL)
                        .await
                        .map_err(|_| TunnelError::Closed),
                    Err(err) => Err(err),
                };
                match sent {
                    Ok(()) => {
                        current = Some(TunnelSession::connecting(peer_id, session_id));
                        pending_create = Some(reply);
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
            }
            Command::SendData { bytes, reply } => {
                let outcome = match &current {
                    Some(session) if session.state == TunnelState::Active => dispatcher
                        .send_on_channel(bytes, session.peer_id, DATA_CHANNEL)
                        .await
                        .map_err(|_| TunnelError::Closed),
                    _ => Err(TunnelError::NoActiveSession),
                };
                let _ = reply.send(outcome);
            }
            Command::CloseSession => {
                if let Some(session) = current.take() {
                    let control = TunnelControl::Close { session_id: session.session_id };
                    if let Ok(bytes) = control.encode() {
                        let _ = dispatcher.send_on_channel(bytes, session.peer_id, HANDSHAKE_CHANNEL).await;
                    }
                    teardown_data_channel(&dispatcher, &mut data_forwarder);
                    let _ = events
                        .send(TunnelEvent::SessionClosed {
                            peer_id: session.peer_id,
                            session_id: session.session_id,
                        })
                        .await;
                }
            }
            Command::Handshake { message } => {
                let Ok(control) = TunnelControl::decode(&message.bytes) else {
                    continue;
                };
                match control {
                    TunnelControl::Request { session_id } => {
                        let from_peer_id = message.from_peer_id;
                        if policy.accept(from_peer_id) {
                            let ack = TunnelControl::Ack { session_id };
                            if let Ok(bytes) = ack.encode() {
                                let _ = dispatcher.send_on_channel(bytes, from_peer_id, HANDSHAKE_CHANNEL).await;
                            }
                            preempt(&dispatcher, &mut current, &mut data_forwarder, &events).await;
                            current = Some(TunnelSession {
                                peer_id: from_peer_id,
                                session_id,
                                state: TunnelState::Active,
                            });
                            data_forwarder = spawn_data_forwarder(&dispatcher, &self_tx);
                            let _ = events
                                .send(TunnelEvent::SessionActive { peer_id: from_peer_id, session_id })
                                .await;
                        } else {
                            let reject = TunnelControl::Reject {
                                session_id,
                                reason: RejectReason::PolicyDenied,
                            };
                            if let Ok(bytes) = reject.encode() {
                                let _ = dispatcher.send_on_channel(bytes, from_peer_id, HANDSHAKE_CHANNEL).await;
                            }
                        }
                    }
                    TunnelControl::Ack { session_id } => {
                        if let Some(session) = current.as_mut() {
                            if session.session_id == session_id && session.state == TunnelState::Connecting {
                                session.state = TunnelState::Active;
                                let peer_id = session.peer_id;
                                data_forwarder = spawn_data_forwarder(&dispatcher, &self_tx);
                                if let Some(reply) = pending_create.take() {
                                    let _ = reply.send(Ok(session_id));
                                }
                                let _ = events
                                    .send(TunnelEvent::SessionActive { peer_id, session_id })
                                    .await;
                            }
                        }
                    }
                    TunnelControl::Reject { session_id, .. } => {
                        if current.as_ref().map(|s| s.session_id) == Some(session_id) {
                            let peer_id = current.take().map(|s| s.peer_id).unwrap();
                            if let Some(reply) = pending_create.take() {
                                let _ = reply.send(Err(TunnelError::Rejected));
                            }
                            let _ = events.send(TunnelEvent::SessionRejected { peer_id, session_id }).await;
                        }
                    }
                    TunnelControl::Close { session_id } => {
                        if current.as_ref().map(|s| s.session_id) == Some(session_id) {
                            let peer_id = current.take().map(|s| s.peer_id).unwrap();
                            teardown_data_channel(&dispatcher, &mut data_forwarder);
                            let _ = events.send(TunnelEvent::SessionClosed { peer_id, session_id }).await;
                        }
                    }
                }
            }
            Command::Data { message } => {
                if current.as_ref().map(|s| s.peer_id) == Some(message.from_peer_id) {
                    let _ = events
                        .send(TunnelEvent::Data {
                            peer_id: message.from_peer_id,
                            bytes: message.bytes,
                        })
                        .await;
                }
            }
            Command::Stats { reply } => {
                let _ = reply.send(TunnelManagerStats {
                    has_active_session: matches!(current.as_ref().map(|s| s.state), Some(TunnelState::Active)),
                });
            }
        }
    }
}

async fn preempt(
    dispatcher: &Arc<ChannelDispatcher>,
    current: &mut Option<TunnelSession>,
    data_forwarder: &mut Option<JoinHandle<()>>,
    events: &mpsc::Sender<TunnelEvent>,
) {
    if let Some(existing) = current.take() {
        info!(peer_id = ?existing.peer_id, "preempting existing tunnel session");
        teardown_data_channel(dispatcher, data_forwarder);
        let _ = events
            .send(TunnelEvent::SessionClosed {
                peer_id: existing.peer_id,
                session_id: existing.session_id,
            })
            .await;
    }
}

fn teardown_data_channel(dispatcher: &Arc<ChannelDispatcher>, data_forwarder: &mut Option<JoinHandle<()>>) {
    dispatcher.off_channel(DATA_CHANNEL);
    if let Some(handle) = data_forwarder.take() {
        handle.abort();
    }
}
