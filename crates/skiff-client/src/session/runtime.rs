//! Session runtime: the event loop that owns the I/O.
//!
//! Orchestrates the pure [`SessionState`] against the socket driver, the
//! history client, and the room directory. Every timeline mutation happens
//! on this task, in event order, so no consumer ever observes a half-merged
//! sequence. Fetches run in abortable tasks carrying the view stamp
//! captured at request time; aborting them (or discarding their late
//! results by stamp) is how superseded views are cancelled without
//! surfacing errors.

use std::{collections::HashMap, future::Future, sync::Arc, time::Instant};

use skiff_core::{LinkState, SubscriptionAction};
use skiff_proto::{ClientFrame, RoomId, UserRef};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Duration, interval},
};

use crate::{
    auth::TokenProvider,
    config::ClientConfig,
    error::ClientError,
    history::HistoryClient,
    rooms::RoomDirectory,
    session::{
        SessionCommand, SessionUpdate,
        state::{FetchPayload, SessionState, ViewStamp},
    },
    socket::{Socket, SocketCommand},
};

/// How often typing indicators are checked for expiry.
const TYPING_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Channels for driving a spawned session.
pub struct SessionHandle {
    /// Send user intents to the session.
    pub commands: mpsc::Sender<SessionCommand>,
    /// Receive rendering updates from the session.
    pub updates: mpsc::Receiver<SessionUpdate>,
}

/// One fetch category per room; used to keep duplicates from piling up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum FetchKind {
    Initial,
    Older,
    Newer,
    Context,
    Exit,
    MarkRead,
}

/// Result of a fetch task, tagged with the stamp captured at request time.
struct FetchOutcome {
    stamp: ViewStamp,
    kind: FetchKind,
    result: Result<FetchPayload, ClientError>,
}

/// The synchronization engine's event loop.
pub struct SyncSession<R: RoomDirectory> {
    state: SessionState,
    socket: Socket,
    history: HistoryClient,
    rooms_api: R,
    config: Arc<ClientConfig>,
    updates: mpsc::Sender<SessionUpdate>,
    fetch_tx: mpsc::Sender<FetchOutcome>,
    fetch_rx: mpsc::Receiver<FetchOutcome>,
    inflight: HashMap<(RoomId, FetchKind), JoinHandle<()>>,
}

impl<R: RoomDirectory> SyncSession<R> {
    /// Spawn a session for the authenticated user and hand back its
    /// channels. The session owns its socket and every in-flight fetch;
    /// [`SessionCommand::Shutdown`] (or dropping the command sender) tears
    /// all of it down.
    pub fn spawn(
        config: ClientConfig,
        tokens: Arc<dyn TokenProvider>,
        rooms_api: R,
        self_user: UserRef,
    ) -> SessionHandle {
        let config = Arc::new(config);
        let (command_tx, command_rx) = mpsc::channel(64);
        let (update_tx, update_rx) = mpsc::channel(256);
        let (fetch_tx, fetch_rx) = mpsc::channel(64);

        let socket = Socket::spawn(config.clone(), tokens.clone());
        let history = HistoryClient::new(reqwest::Client::new(), config.clone(), tokens);

        let state = SessionState::new(
            self_user,
            config.subscription_capacity,
            config.typing_expiry,
        );

        let session = Self {
            state,
            socket,
            history,
            rooms_api,
            config,
            updates: update_tx,
            fetch_tx,
            fetch_rx,
            inflight: HashMap::new(),
        };

        tokio::spawn(session.run(command_rx));

        SessionHandle { commands: command_tx, updates: update_rx }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        let mut last_link = *self.socket.status.borrow();
        let mut typing_sweep = interval(TYPING_SWEEP_INTERVAL);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },

                Some(frame) = self.socket.events.recv() => {
                    let updates = self.state.handle_frame(frame, Instant::now());
                    self.publish(updates).await;
                },

                Some(outcome) = self.fetch_rx.recv() => {
                    self.apply_outcome(outcome).await;
                },

                changed = self.socket.status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = *self.socket.status.borrow_and_update();

                    // Subscriptions do not survive a socket replacement.
                    if status == LinkState::Connected && last_link != LinkState::Connected {
                        let actions = self.state.resubscribe_actions();
                        for action in actions {
                            self.send_subscription(action).await;
                        }
                    }
                    last_link = status;
                    self.publish(vec![SessionUpdate::Connection(status)]).await;
                },

                _ = typing_sweep.tick() => {
                    let updates = self.state.prune_typing(Instant::now());
                    self.publish(updates).await;
                },
            }
        }

        self.teardown().await;
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SelectRoom { room } => {
                let room_id = room.id;

                // Two-phase: tear down the superseded view's fetches, then
                // start the new one under a fresh stamp.
                self.abort_room_fetches(room_id);
                let (stamp, actions) = self.state.begin_view(room);

                for action in actions {
                    if let SubscriptionAction::Unsubscribe(evicted) = action {
                        self.abort_room_fetches(evicted);
                    }
                    self.send_subscription(action).await;
                }

                let history = self.history.clone();
                self.spawn_fetch(stamp, FetchKind::Initial, async move {
                    history.fetch_initial(room_id).await.map(FetchPayload::Initial)
                });
            },

            SessionCommand::DeselectRoom { room_id } => {
                self.abort_room_fetches(room_id);
                let actions = self.state.end_view(room_id);
                for action in actions {
                    self.send_subscription(action).await;
                }

                let api = self.rooms_api.clone();
                tokio::spawn(async move {
                    if let Err(error) = api.leave(room_id).await {
                        tracing::warn!(%error, room = %room_id, "leave request failed");
                    }
                });
            },

            SessionCommand::LoadOlder { room_id } => {
                let Some(view) = self.state.room(room_id) else { return };
                let Some(cursor) = view.timeline.older_cursor().cloned() else { return };
                let Some(stamp) = self.state.stamp(room_id) else { return };

                let history = self.history.clone();
                self.spawn_fetch(stamp, FetchKind::Older, async move {
                    history.fetch_older(room_id, &cursor).await.map(FetchPayload::Older)
                });
            },

            SessionCommand::LoadNewer { room_id } => {
                let Some(view) = self.state.room(room_id) else { return };
                let Some(cursor) = view.timeline.newer_cursor().cloned() else { return };
                let Some(stamp) = self.state.stamp(room_id) else { return };

                let history = self.history.clone();
                self.spawn_fetch(stamp, FetchKind::Newer, async move {
                    history.fetch_newer(room_id, &cursor).await.map(FetchPayload::Newer)
                });
            },

            SessionCommand::JumpToMessage { room_id, message_id } => {
                self.abort_room_fetches(room_id);
                let Some(stamp) = self.state.bump(room_id) else { return };

                let history = self.history.clone();
                let radius = self.config.context_radius;
                self.spawn_fetch(stamp, FetchKind::Context, async move {
                    history
                        .fetch_context(room_id, message_id, radius, radius)
                        .await
                        .map(FetchPayload::Context)
                });
            },

            SessionCommand::ExitContext { room_id } => {
                self.abort_room_fetches(room_id);
                let Some(stamp) = self.state.bump(room_id) else { return };

                let history = self.history.clone();
                self.spawn_fetch(stamp, FetchKind::Exit, async move {
                    history.fetch_initial(room_id).await.map(FetchPayload::Exit)
                });
            },

            SessionCommand::RetryInitial { room_id } => {
                let Some(stamp) = self.state.stamp(room_id) else { return };

                let history = self.history.clone();
                self.spawn_fetch(stamp, FetchKind::Initial, async move {
                    history.fetch_initial(room_id).await.map(FetchPayload::Initial)
                });
            },

            SessionCommand::SendMessage { room_id, content } => {
                self.send_socket(SocketCommand::Send(ClientFrame::SendMessage {
                    room_id,
                    content,
                }))
                .await;
            },

            SessionCommand::Typing { room_id } => {
                self.send_socket(SocketCommand::Send(ClientFrame::UserTyping { room_id })).await;
            },

            SessionCommand::MarkRead { room_id } => {
                let Some(stamp) = self.state.stamp(room_id) else { return };

                let api = self.rooms_api.clone();
                self.spawn_fetch(stamp, FetchKind::MarkRead, async move {
                    api.mark_read(room_id).await.map(FetchPayload::MarkedRead)
                });
            },

            SessionCommand::RecycleSocket => {
                self.send_socket(SocketCommand::Recycle).await;
            },

            // Handled by the run loop before dispatch.
            SessionCommand::Shutdown => {},
        }
    }

    async fn apply_outcome(&mut self, outcome: FetchOutcome) {
        self.inflight.remove(&(outcome.stamp.room_id, outcome.kind));

        match outcome.result {
            Ok(payload) => {
                let updates = self.state.apply_fetch(outcome.stamp, payload);
                self.publish(updates).await;
            },
            Err(error) => {
                if !self.state.is_current(outcome.stamp) {
                    return;
                }

                match outcome.kind {
                    // A failed initial-class load is surfaced with a manual
                    // retry; scroll-triggered pages fail silently.
                    FetchKind::Initial | FetchKind::Context | FetchKind::Exit => {
                        self.publish(vec![SessionUpdate::InitialLoadFailed {
                            room_id: outcome.stamp.room_id,
                            error: error.to_string(),
                        }])
                        .await;
                    },
                    FetchKind::Older | FetchKind::Newer | FetchKind::MarkRead => {
                        tracing::warn!(
                            %error,
                            room = %outcome.stamp.room_id,
                            kind = ?outcome.kind,
                            "fetch failed"
                        );
                    },
                }
            },
        }
    }

    /// Run a fetch in an abortable task, tagged with its stamp. At most one
    /// fetch per (room, kind) is in flight; extra requests are dropped.
    fn spawn_fetch<F>(&mut self, stamp: ViewStamp, kind: FetchKind, fetch: F)
    where
        F: Future<Output = Result<FetchPayload, ClientError>> + Send + 'static,
    {
        let key = (stamp.room_id, kind);
        if self.inflight.contains_key(&key) {
            return;
        }

        let outcomes = self.fetch_tx.clone();
        let handle = tokio::spawn(async move {
            let result = fetch.await;
            let _ = outcomes.send(FetchOutcome { stamp, kind, result }).await;
        });

        self.inflight.insert(key, handle);
    }

    /// Abort every in-flight fetch for a room being torn down or switched.
    fn abort_room_fetches(&mut self, room_id: RoomId) {
        self.inflight.retain(|(room, _), handle| {
            if *room == room_id {
                handle.abort();
                false
            } else {
                true
            }
        });
    }

    async fn send_subscription(&self, action: SubscriptionAction) {
        let frame = match action {
            SubscriptionAction::Subscribe(room_id) => ClientFrame::Subscribe { room_id },
            SubscriptionAction::Unsubscribe(room_id) => ClientFrame::Unsubscribe { room_id },
        };
        self.send_socket(SocketCommand::Send(frame)).await;
    }

    async fn send_socket(&self, command: SocketCommand) {
        if self.socket.commands.send(command).await.is_err() {
            tracing::warn!("socket driver is gone");
        }
    }

    async fn publish(&self, updates: Vec<SessionUpdate>) {
        for update in updates {
            if self.updates.send(update).await.is_err() {
                tracing::debug!("update consumer is gone");
                return;
            }
        }
    }

    async fn teardown(mut self) {
        for (_, handle) in self.inflight.drain() {
            handle.abort();
        }
        self.send_socket(SocketCommand::Disconnect).await;
    }
}
