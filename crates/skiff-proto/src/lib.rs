//! Wire and REST contract types for the Skiff chat client.
//!
//! Everything the server and client exchange lives here: the JSON socket
//! envelopes ([`ClientFrame`], [`ServerFrame`]), the REST pagination shapes
//! ([`MessagePage`], [`ContextWindow`]), and the primitive types they share
//! (ids, timestamps, cursors).
//!
//! This crate is pure data: no I/O, no state. Higher layers decide what the
//! contract means.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod ids;
mod rest;
mod time;
mod wire;

pub use ids::{MessageId, RoomId, UserId};
pub use rest::{ContextWindow, Cursor, Message, MessagePage, Room};
pub use time::{Timestamp, TimestampError};
pub use wire::{ClientFrame, ServerFrame, UserRef};
