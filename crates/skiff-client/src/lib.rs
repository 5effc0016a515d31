//! Async synchronization engine for the Skiff chat client.
//!
//! Keeps a locally rendered message timeline consistent across three
//! independently-arriving sources (paginated REST history, live socket
//! events, and jump-to-message context loads) while a bounded set of rooms
//! stays subscribed over a self-healing transport.
//!
//! The pure state machines live in `skiff-core`; this crate supplies the
//! drivers around them:
//!
//! - [`Socket`]: WebSocket driver executing the link machine's actions
//! - [`HistoryClient`]: cursor-based REST paginator with a retry policy
//! - [`SyncSession`]: the command-driven event loop owning all of the above
//! - [`TokenProvider`] / [`RoomDirectory`]: collaborator boundaries

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod auth;
mod config;
mod error;
mod history;
mod rooms;
mod session;
mod socket;

pub use auth::{StaticToken, TokenProvider, fetch_current_user};
pub use config::ClientConfig;
pub use error::ClientError;
pub use history::{HistoryClient, RetrySchedule};
pub use rooms::{RestRoomDirectory, RoomDirectory};
pub use session::{
    FetchPayload, RoomView, SessionCommand, SessionHandle, SessionState, SessionUpdate,
    SyncSession, ViewStamp,
};
pub use socket::{Socket, SocketCommand};
