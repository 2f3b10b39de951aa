//! Running/blocked time accounting.

use std::time::{Duration, Instant};

use contracts::InstanceState;

/// State machine of one instance with explicit transition timestamps
///
/// Time spent in each state is settled on every transition, so running and
/// blocked time never overlap and add up to the lifetime.
#[derive(Debug, Clone)]
pub struct InstanceClock {
    state: InstanceState,
    since: Instant,
    running: Duration,
    blocked: Duration,
}

impl InstanceClock {
    /// Clock of an instance whose process started at `now`
    pub fn start(now: Instant) -> Self {
        Self {
            state: InstanceState::Running,
            since: now,
            running: Duration::ZERO,
            blocked: Duration::ZERO,
        }
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// Running -> Blocked; returns false for any other state
    pub fn block(&mut self, now: Instant) -> bool {
        self.transition(InstanceState::Running, InstanceState::Blocked, now)
    }

    /// Blocked -> Running; returns false for any other state
    pub fn unblock(&mut self, now: Instant) -> bool {
        self.transition(InstanceState::Blocked, InstanceState::Running, now)
    }

    /// Any -> Terminated; returns false if already terminated
    pub fn terminate(&mut self, now: Instant) -> bool {
        if self.state == InstanceState::Terminated {
            return false;
        }
        self.settle(now);
        self.state = InstanceState::Terminated;
        true
    }

    pub fn time_running(&self) -> Duration {
        self.running
    }

    pub fn time_blocked(&self) -> Duration {
        self.blocked
    }

    fn transition(&mut self, from: InstanceState, to: InstanceState, now: Instant) -> bool {
        if self.state != from {
            return false;
        }
        self.settle(now);
        self.state = to;
        true
    }

    fn settle(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.since);
        match self.state {
            InstanceState::Running => self.running += elapsed,
            InstanceState::Blocked => self.blocked += elapsed,
            InstanceState::Terminated => {}
        }
        self.since = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_never_blocked() {
        let t0 = Instant::now();
        let mut clock = InstanceClock::start(t0);
        assert!(clock.terminate(t0 + ms(30)));

        assert_eq!(clock.time_running(), ms(30));
        assert_eq!(clock.time_blocked(), Duration::ZERO);
        assert_eq!(clock.state(), InstanceState::Terminated);
    }

    #[test]
    fn test_block_unblock_partition_lifetime() {
        let t0 = Instant::now();
        let mut clock = InstanceClock::start(t0);
        assert!(clock.block(t0 + ms(10)));
        assert!(clock.unblock(t0 + ms(25)));
        assert!(clock.block(t0 + ms(30)));
        assert!(clock.unblock(t0 + ms(31)));
        assert!(clock.terminate(t0 + ms(40)));

        assert_eq!(clock.time_blocked(), ms(16));
        assert_eq!(clock.time_running(), ms(24));
        assert_eq!(clock.time_running() + clock.time_blocked(), ms(40));
    }

    #[test]
    fn test_invalid_transitions_are_ignored() {
        let t0 = Instant::now();
        let mut clock = InstanceClock::start(t0);
        assert!(!clock.unblock(t0 + ms(1)));
        assert!(clock.block(t0 + ms(2)));
        assert!(!clock.block(t0 + ms(3)));
        assert!(clock.terminate(t0 + ms(5)));
        assert!(!clock.terminate(t0 + ms(9)));
        assert!(!clock.block(t0 + ms(9)));

        assert_eq!(clock.time_running(), ms(2));
        assert_eq!(clock.time_blocked(), ms(3));
    }

    #[test]
    fn test_terminate_while_blocked_counts_blocked_time() {
        let t0 = Instant::now();
        let mut clock = InstanceClock::start(t0);
        clock.block(t0);
        clock.terminate(t0 + ms(7));
        assert_eq!(clock.time_blocked(), ms(7));
        assert_eq!(clock.time_running(), Duration::ZERO);
    }
}
