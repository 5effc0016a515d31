//! Socket lifecycle state machine.
//!
//! Manages connect, reconnect with bounded exponential backoff, connect
//! timeout, and clean shutdown for the one persistent socket a session
//! owns. Uses the action pattern: methods take time (and a caller-supplied
//! jitter fraction where randomness is needed) and return actions for the
//! driver to execute. This keeps the machine pure and deterministic.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ connect ┌────────────┐  opened   ┌───────────┐
//! │ Disconnected │────────>│ Connecting │──────────>│ Connected │
//! └──────────────┘         └────────────┘           └───────────┘
//!        ↑                   ↑        │ lost/timeout      │ lost
//!        │ disconnect        │ tick   ↓                   ↓
//!        │ (any state)     ┌─┴────────────┐ budget   ┌───────┐
//!        └─────────────────│ Reconnecting │─────────>│ Error │
//!                          └──────────────┘ spent    └───────┘
//! ```
//!
//! A clean `disconnect` always lands in `Disconnected` and disarms retries
//! until the next `connect` re-arms them. A successful `opened` resets the
//! attempt counter, so the next failure starts again at the base delay.

use std::{
    ops::{Add, Sub},
    time::{Duration, Instant},
};

use crate::error::LinkError;

/// Base reconnect delay (doubled per consecutive failure).
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Cap on the exponential reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Consecutive failed attempts tolerated before settling at `Error`.
pub const DEFAULT_RETRY_BUDGET: u32 = 10;

/// Time allowed for a single connect attempt to open.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay before reconnecting after a token replacement.
pub const DEFAULT_REARM_DELAY: Duration = Duration::from_millis(500);

/// Link state. Exactly one live link exists per authentication token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No socket, no retries armed.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// Socket open and usable.
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
    /// Retry budget spent; a new `connect` call is required to recover.
    Error,
}

/// Actions returned by the link state machine.
///
/// The driver executes these: `Open` dials a new socket, `Close` tears the
/// current one down (including a half-open dial).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAction {
    /// Dial a new socket now.
    Open,
    /// Tear down the current socket.
    Close,
}

/// Link configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Base reconnect delay.
    pub base_delay: Duration,
    /// Cap on the exponential delay.
    pub max_delay: Duration,
    /// Consecutive failures tolerated before `Error`.
    pub retry_budget: u32,
    /// Time allowed for a connect attempt to open.
    pub connect_timeout: Duration,
    /// Delay before reconnecting after a token replacement.
    pub rearm_delay: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            retry_budget: DEFAULT_RETRY_BUDGET,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            rearm_delay: DEFAULT_REARM_DELAY,
        }
    }
}

/// Socket lifecycle state machine.
///
/// Pure: no I/O, no clock, no RNG. Time is passed to the methods that need
/// it, and the jitter fraction comes from the driver, so identical inputs
/// always produce identical transitions.
///
/// Generic over `I` (instant type) to support both real time and virtual
/// time in tests.
#[derive(Debug, Clone)]
pub struct Link<I = Instant>
where
    I: Copy + Ord + Add<Duration, Output = I> + Sub<Output = Duration>,
{
    state: LinkState,
    config: LinkConfig,
    /// Consecutive failed attempts since the last successful open.
    attempts: u32,
    /// When the in-flight connect attempt started.
    dial_started: Option<I>,
    /// When the current backoff delay expires.
    retry_at: Option<I>,
}

impl<I> Link<I>
where
    I: Copy + Ord + Add<Duration, Output = I> + Sub<Output = Duration>,
{
    /// Create a new link in [`LinkState::Disconnected`].
    pub fn new(config: LinkConfig) -> Self {
        Self { state: LinkState::Disconnected, config, attempts: 0, dial_started: None, retry_at: None }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Consecutive failed attempts since the last successful open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Deadline of the pending backoff delay, if reconnecting.
    #[must_use]
    pub fn retry_deadline(&self) -> Option<I> {
        self.retry_at
    }

    /// Arm reconnection and start the first connect attempt.
    ///
    /// # Errors
    ///
    /// - `LinkError::InvalidTransition` unless in `Disconnected` or `Error`
    pub fn connect(&mut self, now: I) -> Result<Vec<LinkAction>, LinkError> {
        match self.state {
            LinkState::Disconnected | LinkState::Error => {
                self.state = LinkState::Connecting;
                self.attempts = 0;
                self.dial_started = Some(now);
                self.retry_at = None;
                Ok(vec![LinkAction::Open])
            },
            state => Err(LinkError::InvalidTransition { state, operation: "connect" }),
        }
    }

    /// The in-flight connect attempt opened successfully.
    ///
    /// Resets the attempt counter so the next failure starts over at the
    /// base delay.
    ///
    /// # Errors
    ///
    /// - `LinkError::InvalidTransition` unless in `Connecting`
    pub fn opened(&mut self) -> Result<Vec<LinkAction>, LinkError> {
        if self.state != LinkState::Connecting {
            return Err(LinkError::InvalidTransition { state: self.state, operation: "opened" });
        }

        self.state = LinkState::Connected;
        self.attempts = 0;
        self.dial_started = None;
        Ok(vec![])
    }

    /// The socket closed abnormally, or the in-flight attempt failed.
    ///
    /// While reconnection is armed, schedules the next attempt after the
    /// current backoff delay (with `jitter` in `[0, 1)` adding up to one
    /// extra delay-length of slack). Once the retry budget is spent the
    /// state settles at `Error`. Stray loss events in `Disconnected`,
    /// `Reconnecting`, or `Error` are ignored.
    pub fn connection_lost(&mut self, now: I, jitter: f64) -> Vec<LinkAction> {
        match self.state {
            LinkState::Connected | LinkState::Connecting => {
                self.dial_started = None;

                if self.attempts >= self.config.retry_budget {
                    self.state = LinkState::Error;
                    self.retry_at = None;
                    return vec![LinkAction::Close];
                }

                let delay = self.backoff_delay(self.attempts, jitter);
                self.attempts += 1;
                self.retry_at = Some(now + delay);
                self.state = LinkState::Reconnecting;
                vec![LinkAction::Close]
            },
            LinkState::Disconnected | LinkState::Reconnecting | LinkState::Error => vec![],
        }
    }

    /// Process timers: connect timeout and backoff expiry.
    ///
    /// A connect attempt that has not opened within the configured timeout
    /// is treated as a failure and forces socket closure; an expired
    /// backoff deadline starts the next attempt.
    pub fn tick(&mut self, now: I, jitter: f64) -> Vec<LinkAction> {
        match self.state {
            LinkState::Connecting => {
                let timed_out = self
                    .dial_started
                    .is_some_and(|started| now - started > self.config.connect_timeout);

                if timed_out {
                    return self.connection_lost(now, jitter);
                }
                vec![]
            },
            LinkState::Reconnecting => {
                if self.retry_at.is_some_and(|at| now >= at) {
                    self.state = LinkState::Connecting;
                    self.dial_started = Some(now);
                    self.retry_at = None;
                    return vec![LinkAction::Open];
                }
                vec![]
            },
            _ => vec![],
        }
    }

    /// Clean caller-initiated shutdown.
    ///
    /// Always lands in `Disconnected` and disarms reconnection until the
    /// next `connect` call.
    pub fn disconnect(&mut self) -> Vec<LinkAction> {
        let had_socket =
            matches!(self.state, LinkState::Connected | LinkState::Connecting);

        self.state = LinkState::Disconnected;
        self.attempts = 0;
        self.dial_started = None;
        self.retry_at = None;

        if had_socket { vec![LinkAction::Close] } else { vec![] }
    }

    /// The authentication token was replaced.
    ///
    /// Tears down the current socket and schedules a reconnect with the new
    /// token after a short fixed delay. The fresh credentials get a fresh
    /// retry budget.
    pub fn token_replaced(&mut self, now: I) -> Vec<LinkAction> {
        let had_socket =
            matches!(self.state, LinkState::Connected | LinkState::Connecting);

        self.state = LinkState::Reconnecting;
        self.attempts = 0;
        self.dial_started = None;
        self.retry_at = Some(now + self.config.rearm_delay);

        if had_socket { vec![LinkAction::Close] } else { vec![] }
    }

    /// Backoff delay for the given attempt number.
    ///
    /// `min(base << attempt, cap)` plus `jitter` (in `[0, 1)`) times that
    /// delay. The un-jittered part is non-decreasing in `attempt`.
    fn backoff_delay(&self, attempt: u32, jitter: f64) -> Duration {
        let doubled = self.config.base_delay.saturating_mul(1_u32 << attempt.min(16));
        let capped = doubled.min(self.config.max_delay);
        capped + capped.mul_f64(jitter.clamp(0.0, 1.0))
    }
}

impl<I> Default for Link<I>
where
    I: Copy + Ord + Add<Duration, Output = I> + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new(LinkConfig::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Virtual instant for deterministic tests: milliseconds since an
    /// arbitrary epoch.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct Millis(u64);

    impl Add<Duration> for Millis {
        type Output = Millis;
        fn add(self, rhs: Duration) -> Millis {
            Millis(self.0 + rhs.as_millis() as u64)
        }
    }

    impl Sub for Millis {
        type Output = Duration;
        fn sub(self, rhs: Millis) -> Duration {
            Duration::from_millis(self.0.saturating_sub(rhs.0))
        }
    }

    fn at(ms: u64) -> Millis {
        Millis(ms)
    }

    fn link() -> Link<Millis> {
        Link::new(LinkConfig::default())
    }

    #[test]
    fn lifecycle_connect_open() {
        let mut link = link();
        assert_eq!(link.state(), LinkState::Disconnected);

        let actions = link.connect(at(0)).unwrap();
        assert_eq!(actions, vec![LinkAction::Open]);
        assert_eq!(link.state(), LinkState::Connecting);

        link.opened().unwrap();
        assert_eq!(link.state(), LinkState::Connected);
        assert_eq!(link.attempts(), 0);
    }

    #[test]
    fn connect_from_connected_is_rejected() {
        let mut link = link();
        link.connect(at(0)).unwrap();
        link.opened().unwrap();

        let result = link.connect(at(1));
        assert!(matches!(result, Err(LinkError::InvalidTransition { .. })));
    }

    #[test]
    fn loss_schedules_backoff_and_retry() {
        let mut link = link();
        link.connect(at(0)).unwrap();
        link.opened().unwrap();

        let actions = link.connection_lost(at(1_000), 0.0);
        assert_eq!(actions, vec![LinkAction::Close]);
        assert_eq!(link.state(), LinkState::Reconnecting);
        assert_eq!(link.retry_deadline(), Some(at(2_000))); // base delay 1s

        // Before the deadline: nothing happens.
        assert!(link.tick(at(1_500), 0.0).is_empty());
        assert_eq!(link.state(), LinkState::Reconnecting);

        // At the deadline: redial.
        let actions = link.tick(at(2_000), 0.0);
        assert_eq!(actions, vec![LinkAction::Open]);
        assert_eq!(link.state(), LinkState::Connecting);
    }

    #[test]
    fn backoff_is_non_decreasing_up_to_cap() {
        let mut link = link();
        link.connect(at(0)).unwrap();

        let mut now = at(0);
        let mut last_delay = Duration::ZERO;

        for _ in 0..DEFAULT_RETRY_BUDGET {
            link.connection_lost(now, 0.0);
            let deadline = link.retry_deadline().unwrap();
            let delay = deadline - now;
            assert!(delay >= last_delay, "delay shrank: {delay:?} < {last_delay:?}");
            assert!(delay <= DEFAULT_MAX_DELAY);
            last_delay = delay;

            now = deadline;
            link.tick(now, 0.0);
        }
    }

    #[test]
    fn successful_open_resets_backoff_to_base() {
        let mut link = link();
        link.connect(at(0)).unwrap();

        // Fail a few attempts to grow the delay.
        let mut now = at(0);
        for _ in 0..3 {
            link.connection_lost(now, 0.0);
            now = link.retry_deadline().unwrap();
            link.tick(now, 0.0);
        }

        link.opened().unwrap();
        assert_eq!(link.attempts(), 0);

        // The next loss starts over at the base delay.
        link.connection_lost(now, 0.0);
        assert_eq!(link.retry_deadline().unwrap() - now, DEFAULT_BASE_DELAY);
    }

    #[test]
    fn budget_exhaustion_settles_at_error() {
        let mut link = link();
        link.connect(at(0)).unwrap();

        let mut now = at(0);
        for _ in 0..DEFAULT_RETRY_BUDGET {
            link.connection_lost(now, 0.0);
            assert_eq!(link.state(), LinkState::Reconnecting);
            now = link.retry_deadline().unwrap();
            link.tick(now, 0.0);
        }

        // One loss past the budget.
        link.connection_lost(now, 0.0);
        assert_eq!(link.state(), LinkState::Error);

        // Stays in Error; further losses are ignored.
        assert!(link.connection_lost(now, 0.0).is_empty());
        assert_eq!(link.state(), LinkState::Error);

        // A fresh connect recovers.
        let actions = link.connect(now).unwrap();
        assert_eq!(actions, vec![LinkAction::Open]);
    }

    #[test]
    fn disconnect_disarms_reconnection() {
        let mut link = link();
        link.connect(at(0)).unwrap();
        link.opened().unwrap();

        let actions = link.disconnect();
        assert_eq!(actions, vec![LinkAction::Close]);
        assert_eq!(link.state(), LinkState::Disconnected);

        // A subsequent socket-closed notification must not schedule a retry.
        assert!(link.connection_lost(at(10), 0.0).is_empty());
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[test]
    fn connect_timeout_is_treated_as_failure() {
        let mut link = link();
        link.connect(at(0)).unwrap();

        // Within the timeout: still connecting.
        assert!(link.tick(at(5_000), 0.0).is_empty());
        assert_eq!(link.state(), LinkState::Connecting);

        // Past the timeout: forced closure, backoff scheduled.
        let actions = link.tick(at(10_001), 0.0);
        assert_eq!(actions, vec![LinkAction::Close]);
        assert_eq!(link.state(), LinkState::Reconnecting);
    }

    #[test]
    fn token_replacement_recycles_the_socket() {
        let mut link = link();
        link.connect(at(0)).unwrap();
        link.opened().unwrap();

        let actions = link.token_replaced(at(1_000));
        assert_eq!(actions, vec![LinkAction::Close]);
        assert_eq!(link.state(), LinkState::Reconnecting);
        assert_eq!(link.retry_deadline(), Some(at(1_500)));
        assert_eq!(link.attempts(), 0);

        let actions = link.tick(at(1_500), 0.0);
        assert_eq!(actions, vec![LinkAction::Open]);
    }

    #[test]
    fn jitter_extends_but_never_shrinks_the_delay() {
        let mut plain = link();
        let mut jittered = link();
        plain.connect(at(0)).unwrap();
        jittered.connect(at(0)).unwrap();

        plain.connection_lost(at(0), 0.0);
        jittered.connection_lost(at(0), 0.99);

        let base = plain.retry_deadline().unwrap() - at(0);
        let slack = jittered.retry_deadline().unwrap() - at(0);
        assert!(slack >= base);
        assert!(slack <= base + base);
    }
}
