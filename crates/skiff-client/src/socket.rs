//! WebSocket driver for the persistent socket.
//!
//! A thin I/O layer around the sans-IO [`Link`] state machine: it executes
//! the machine's actions (dial, tear down), pumps inbound JSON frames into
//! a typed channel the session drains, and publishes the connection status
//! through a watch channel. All reconnection policy lives in the machine;
//! this task only supplies real time, real sockets, and real jitter.
//!
//! Frames sent while the socket is not open are dropped with a warning, as
//! the outbound contract requires. Malformed inbound payloads are logged
//! and dropped without touching the connection.

use std::{sync::Arc, time::Instant};

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use skiff_core::{Link, LinkState};
use skiff_proto::{ClientFrame, ServerFrame};
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::{
    auth::{TokenProvider, fetch_current_user},
    config::ClientConfig,
    error::ClientError,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Commands accepted by the socket driver.
#[derive(Debug, Clone)]
pub enum SocketCommand {
    /// Send an outbound frame. Dropped (with a warning) if not connected.
    Send(ClientFrame),
    /// Tear down the socket and reconnect with fresh credentials.
    Recycle,
    /// Clean shutdown; disables reconnection and stops the driver.
    Disconnect,
}

/// Handle to a running socket driver.
///
/// Provides channels for frame transport: commands flow in, decoded server
/// events flow out, and the connection status is observable through a
/// watch channel.
pub struct Socket {
    /// Send commands to the driver task.
    pub commands: mpsc::Sender<SocketCommand>,
    /// Decoded events from the server, in receipt order.
    pub events: mpsc::Receiver<ServerFrame>,
    /// Connection status, updated on every transition.
    pub status: watch::Receiver<LinkState>,
    task: JoinHandle<()>,
}

impl Socket {
    /// Spawn a socket driver that immediately starts connecting.
    pub fn spawn(config: Arc<ClientConfig>, tokens: Arc<dyn TokenProvider>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(256);
        let (status_tx, status_rx) = watch::channel(LinkState::Disconnected);

        let task = tokio::spawn(run_link(config, tokens, command_rx, event_tx, status_tx));

        Self { commands: command_tx, events: event_rx, status: status_rx, task }
    }

    /// Abort the driver task outright. Prefer [`SocketCommand::Disconnect`]
    /// for a clean shutdown.
    pub fn stop(&self) {
        self.task.abort();
    }
}

/// Why the open-socket pump returned.
enum PumpExit {
    /// The socket closed abnormally or a read/write failed.
    Lost,
    /// The caller asked for a clean shutdown.
    Disconnect,
    /// The caller replaced the token; reconnect with the new one.
    Recycle,
}

/// Drive the link state machine against real sockets until shut down.
async fn run_link(
    config: Arc<ClientConfig>,
    tokens: Arc<dyn TokenProvider>,
    mut commands: mpsc::Receiver<SocketCommand>,
    events: mpsc::Sender<ServerFrame>,
    status: watch::Sender<LinkState>,
) {
    let http = reqwest::Client::new();
    let mut link: Link<Instant> = Link::new(config.link.clone());

    if link.connect(Instant::now()).is_err() {
        return;
    }
    publish(&status, &link);

    loop {
        match link.state() {
            LinkState::Connecting => {
                match dial(&config, tokens.as_ref(), &http).await {
                    Ok(stream) => {
                        if link.opened().is_err() {
                            break;
                        }
                        publish(&status, &link);
                        tracing::debug!("socket open");

                        match pump(stream, &mut commands, &events).await {
                            PumpExit::Disconnect => {
                                link.disconnect();
                                publish(&status, &link);
                                break;
                            },
                            PumpExit::Recycle => {
                                link.token_replaced(Instant::now());
                                publish(&status, &link);
                            },
                            PumpExit::Lost => {
                                link.connection_lost(Instant::now(), jitter());
                                publish(&status, &link);
                            },
                        }
                    },
                    Err(ClientError::Unauthorized) => {
                        // The provider was already notified; retrying with
                        // the same token cannot succeed.
                        link.disconnect();
                        publish(&status, &link);
                        break;
                    },
                    Err(error) => {
                        tracing::debug!(%error, "connect attempt failed");
                        link.connection_lost(Instant::now(), jitter());
                        publish(&status, &link);
                    },
                }
            },

            LinkState::Reconnecting => {
                let deadline = link.retry_deadline().unwrap_or_else(Instant::now);
                let wake = tokio::time::Instant::from_std(deadline);

                tokio::select! {
                    _ = tokio::time::sleep_until(wake) => {
                        link.tick(Instant::now(), jitter());
                        publish(&status, &link);
                    },
                    command = commands.recv() => match command {
                        Some(SocketCommand::Recycle) => {
                            link.token_replaced(Instant::now());
                            publish(&status, &link);
                        },
                        Some(SocketCommand::Send(frame)) => {
                            tracing::warn!(?frame, "dropping outbound frame while reconnecting");
                        },
                        Some(SocketCommand::Disconnect) | None => {
                            link.disconnect();
                            publish(&status, &link);
                            break;
                        },
                    },
                }
            },

            LinkState::Error => match commands.recv().await {
                Some(SocketCommand::Recycle) => {
                    if link.connect(Instant::now()).is_ok() {
                        publish(&status, &link);
                    }
                },
                Some(SocketCommand::Send(frame)) => {
                    tracing::warn!(?frame, "dropping outbound frame, link settled in error");
                },
                Some(SocketCommand::Disconnect) | None => {
                    link.disconnect();
                    publish(&status, &link);
                    break;
                },
            },

            LinkState::Connected | LinkState::Disconnected => break,
        }
    }

    tracing::debug!("socket driver stopped");
}

/// Validate the token, then dial the socket endpoint within the connect
/// timeout.
async fn dial(
    config: &ClientConfig,
    tokens: &dyn TokenProvider,
    http: &reqwest::Client,
) -> Result<WsStream, ClientError> {
    // The REST boundary vets the token before we spend a socket on it.
    fetch_current_user(http, config, tokens).await?;

    let url = format!("{}?token={}", config.socket_url, tokens.token());
    match tokio::time::timeout(config.link.connect_timeout, connect_async(url)).await {
        Ok(Ok((stream, _response))) => Ok(stream),
        Ok(Err(error)) => Err(ClientError::Transport(error.to_string())),
        Err(_elapsed) => Err(ClientError::Timeout),
    }
}

/// Pump an open socket: decode inbound frames, encode outbound commands.
async fn pump(
    stream: WsStream,
    commands: &mut mpsc::Receiver<SocketCommand>,
    events: &mpsc::Sender<ServerFrame>,
) -> PumpExit {
    let (mut sink, mut source) = stream.split();

    loop {
        tokio::select! {
            inbound = source.next() => match inbound {
                Some(Ok(Message::Text(raw))) => match serde_json::from_str::<ServerFrame>(&raw) {
                    Ok(frame) => {
                        if events.send(frame).await.is_err() {
                            return PumpExit::Disconnect;
                        }
                    },
                    Err(error) => {
                        tracing::warn!(%error, "dropping malformed inbound payload");
                    },
                },
                Some(Ok(Message::Close(_))) | None => return PumpExit::Lost,
                Some(Ok(_)) => {},
                Some(Err(error)) => {
                    tracing::debug!(%error, "socket read failed");
                    return PumpExit::Lost;
                },
            },

            command = commands.recv() => match command {
                Some(SocketCommand::Send(frame)) => match serde_json::to_string(&frame) {
                    Ok(raw) => {
                        if let Err(error) = sink.send(Message::Text(raw)).await {
                            tracing::debug!(%error, "socket write failed");
                            return PumpExit::Lost;
                        }
                    },
                    Err(error) => {
                        tracing::warn!(%error, "failed to encode outbound frame");
                    },
                },
                Some(SocketCommand::Recycle) => {
                    let _ = sink.send(Message::Close(None)).await;
                    return PumpExit::Recycle;
                },
                Some(SocketCommand::Disconnect) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return PumpExit::Disconnect;
                },
            },
        }
    }
}

fn publish(status: &watch::Sender<LinkState>, link: &Link<Instant>) {
    status.send_replace(link.state());
}

fn jitter() -> f64 {
    rand::thread_rng().gen_range(0.0..1.0)
}
