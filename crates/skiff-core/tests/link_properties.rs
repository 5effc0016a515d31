//! Property-based tests for the link state machine.
//!
//! Verifies the reconnection contract under arbitrary jitter and failure
//! counts: delays never decrease across consecutive failures, stay within
//! the configured cap (plus jitter slack), and reset after a successful
//! open.

use std::{
    ops::{Add, Sub},
    time::Duration,
};

use proptest::prelude::{prop, proptest};
use skiff_core::{Link, LinkConfig, LinkState};

/// Virtual instant: milliseconds since an arbitrary epoch.
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

fn failed_delays(jitters: &[f64]) -> Vec<Duration> {
    let config = LinkConfig::default();
    let budget = config.retry_budget;
    let mut link: Link<Millis> = Link::new(config);
    let mut now = Millis(0);

    #[allow(clippy::unwrap_used)]
    link.connect(now).unwrap();

    let mut delays = Vec::new();
    for jitter in jitters.iter().take(budget as usize) {
        link.connection_lost(now, *jitter);
        let Some(deadline) = link.retry_deadline() else { break };
        delays.push(deadline - now);
        now = deadline;
        link.tick(now, 0.0);
    }
    delays
}

proptest! {
    #[test]
    fn unjittered_delays_never_decrease(failures in 1_u32..10) {
        let jitters = vec![0.0; failures as usize];
        let delays = failed_delays(&jitters);

        for pair in delays.windows(2) {
            assert!(pair[1] >= pair[0], "delay decreased: {pair:?}");
        }
    }

    #[test]
    fn jittered_delays_stay_within_twice_the_cap(
        jitters in prop::collection::vec(0.0_f64..1.0, 1..10)
    ) {
        let config = LinkConfig::default();
        for delay in failed_delays(&jitters) {
            assert!(delay >= config.base_delay);
            assert!(delay <= config.max_delay + config.max_delay);
        }
    }

    #[test]
    fn successful_open_resets_the_schedule(
        failures in 1_u32..8,
        jitter in 0.0_f64..1.0
    ) {
        let config = LinkConfig::default();
        let mut link: Link<Millis> = Link::new(config.clone());
        let mut now = Millis(0);

        #[allow(clippy::unwrap_used)]
        link.connect(now).unwrap();

        for _ in 0..failures {
            link.connection_lost(now, jitter);
            if link.state() != LinkState::Reconnecting {
                break;
            }
            if let Some(deadline) = link.retry_deadline() {
                now = deadline;
                link.tick(now, 0.0);
            }
        }

        if link.state() == LinkState::Connecting {
            #[allow(clippy::unwrap_used)]
            link.opened().unwrap();

            // The next failure starts over at the base delay.
            link.connection_lost(now, 0.0);
            if let Some(deadline) = link.retry_deadline() {
                assert_eq!(deadline - now, config.base_delay);
            }
        }
    }
}
