use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    /// The deadline passed; resubscribe and keep going.
    Resubscribe { missed: u32 },
    /// Too many consecutive deadlines passed; the link is considered dead.
    Lost { missed: u32 },
}

/// Rolling "next expected heartbeat" bookkeeping.
#[derive(Debug, Clone)]
pub struct LivenessMonitor {
    deadline: Duration,
    max_missed: u32,
    next_expected: Option<Instant>,
    missed: u32,
}

impl LivenessMonitor {
    pub fn new(deadline: Duration, max_missed: u32) -> Self {
        Self {
            deadline,
            max_missed: max_missed.max(1),
            next_expected: None,
            missed: 0,
        }
    }

    /// Starts tracking from `now`.
    pub fn arm(&mut self, now: Instant) {
        self.next_expected = Some(now + self.deadline);
        self.missed = 0;
    }

    pub fn disarm(&mut self) {
        self.next_expected = None;
        self.missed = 0;
    }

    pub fn is_armed(&self) -> bool {
        self.next_expected.is_some()
    }

    pub fn next_expected(&self) -> Option<Instant> {
        self.next_expected
    }

    pub fn heartbeat_received(&mut self, now: Instant) {
        if self.is_armed() {
            self.arm(now);
        }
    }

    pub fn check(&mut self, now: Instant) -> Liveness {
        let Some(expected) = self.next_expected else {
            return Liveness::Alive;
        };
        if now < expected {
            return Liveness::Alive;
        }
        self.missed += 1;
        self.next_expected = Some(now + self.deadline);
        if self.missed >= self.max_missed {
            Liveness::Lost { missed: self.missed }
        } else {
            Liveness::Resubscribe { missed: self.missed }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const DEADLINE: Duration = Duration::from_secs(20);

    #[test]
    fn disarmed_monitor_is_always_alive() {
        let mut monitor = LivenessMonitor::new(DEADLINE, 3);
        let now = Instant::now();
        assert_eq!(monitor.check(now + Duration::from_secs(3600)), Liveness::Alive);
    }

    #[test]
    fn heartbeat_pushes_deadline_forward() {
        let mut monitor = LivenessMonitor::new(DEADLINE, 3);
        let start = Instant::now();
        monitor.arm(start);
        monitor.heartbeat_received(start + Duration::from_secs(15));
        assert_eq!(monitor.check(start + Duration::from_secs(30)), Liveness::Alive);
        assert_eq!(monitor.next_expected(), Some(start + Duration::from_secs(35)));
    }

    #[test]
    fn missed_deadline_asks_for_resubscribe_then_gives_up() {
        let mut monitor = LivenessMonitor::new(DEADLINE, 3);
        let start = Instant::now();
        monitor.arm(start);
        let t1 = start + DEADLINE;
        assert_eq!(monitor.check(t1), Liveness::Resubscribe { missed: 1 });
        // not yet due again
        assert_eq!(monitor.check(t1 + Duration::from_secs(2)), Liveness::Alive);
        let t2 = t1 + DEADLINE;
        assert_eq!(monitor.check(t2), Liveness::Resubscribe { missed: 2 });
        assert_eq!(monitor.check(t2 + DEADLINE), Liveness::Lost { missed: 3 });
    }

    #[test]
    fn heartbeat_resets_miss_count() {
        let mut monitor = LivenessMonitor::new(DEADLINE, 2);
        let start = Instant::now();
        monitor.arm(start);
        assert_eq!(monitor.check(start + DEADLINE), Liveness::Resubscribe { missed: 1 });
        monitor.heartbeat_received(start + DEADLINE + Duration::from_secs(1));
        let later = start + DEADLINE * 2 + Duration::from_secs(1);
        assert_eq!(monitor.check(later), Liveness::Resubscribe { missed: 1 });
    }

    #[test]
    fn heartbeat_before_arm_is_ignored() {
        let mut monitor = LivenessMonitor::new(DEADLINE, 3);
        monitor.heartbeat_received(Instant::now());
        assert!(!monitor.is_armed());
    }
}
