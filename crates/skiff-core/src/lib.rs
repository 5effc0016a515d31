//! Pure state machines for the Skiff synchronization engine.
//!
//! Every component in this crate follows the action pattern: methods take
//! events and the current time as input and return actions for a driver to
//! execute. Nothing here performs I/O, reads a clock, or draws randomness,
//! which makes the whole engine testable with virtual time and scripted
//! event sequences.
//!
//! # Components
//!
//! - [`Link`]: socket lifecycle (connect, reconnect with backoff, timeout)
//! - [`SubscriptionSet`]: bounded LRU set of subscribed rooms
//! - [`Timeline`]: per-room message reconciliation and pagination state
//! - [`plan_scroll`]: viewport-preserving scroll corrections per mutation

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod anchor;
mod error;
mod link;
mod subscriptions;
mod timeline;

pub use anchor::{
    AnchorConfig, ScrollCorrection, ScrollPlan, Viewport, ViewportSnapshot, plan_density_change,
    plan_scroll,
};
pub use error::LinkError;
pub use link::{Link, LinkAction, LinkConfig, LinkState};
pub use subscriptions::{DEFAULT_SUBSCRIPTION_CAPACITY, SubscriptionAction, SubscriptionSet};
pub use timeline::{Timeline, TimelineMutation, TimelineSnapshot, ViewMode};
