/// Identifies one arming of the countdown.
///
/// Every `arm` and `disarm` moves the coordinator to a new generation, so a
/// tick scheduled for an older one is dropped instead of touching the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerGeneration(u64);

/// Result of delivering one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running { remaining: u32 },
    /// Remaining time just reached zero. Returned at most once per arming.
    Expired,
    /// Stale generation, dormant, disarmed or already expired.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerState {
    Dormant,
    Running { remaining: u32 },
    Stopped { remaining: u32 },
    Expired,
}

/// Single session countdown with one-second granularity.
#[derive(Debug, Clone)]
pub struct TimerCoordinator {
    generation: u64,
    state: TimerState,
}

impl Default for TimerCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            generation: 0,
            state: TimerState::Dormant,
        }
    }

    /// Start counting down from `duration_secs`.
    ///
    /// `None` or zero leaves the coordinator dormant and returns `None`.
    pub fn arm(&mut self, duration_secs: Option<u32>) -> Option<TimerGeneration> {
        self.generation += 1;
        match duration_secs.filter(|d| *d > 0) {
            Some(remaining) => {
                self.state = TimerState::Running { remaining };
                Some(TimerGeneration(self.generation))
            }
            None => {
                self.state = TimerState::Dormant;
                None
            }
        }
    }

    /// Deliver one tick scheduled for `generation`.
    pub fn tick(&mut self, generation: TimerGeneration) -> TickOutcome {
        if generation.0 != self.generation {
            return TickOutcome::Ignored;
        }
        match self.state {
            TimerState::Running { remaining } => {
                let remaining = remaining.saturating_sub(1);
                if remaining == 0 {
                    self.state = TimerState::Expired;
                    TickOutcome::Expired
                } else {
                    self.state = TimerState::Running { remaining };
                    TickOutcome::Running { remaining }
                }
            }
            TimerState::Dormant | TimerState::Stopped { .. } | TimerState::Expired => {
                TickOutcome::Ignored
            }
        }
    }

    /// Stop counting. Any tick still in flight for the old generation is dropped.
    pub fn disarm(&mut self) {
        self.generation += 1;
        if let TimerState::Running { remaining } = self.state {
            self.state = TimerState::Stopped { remaining };
        }
    }

    /// Forget everything, including the frozen remaining time.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = TimerState::Dormant;
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.state, TimerState::Running { .. })
    }

    #[must_use]
    pub fn has_expired(&self) -> bool {
        self.state == TimerState::Expired
    }

    /// Seconds left, or `None` for an untimed session.
    #[must_use]
    pub fn remaining_secs(&self) -> Option<u32> {
        match self.state {
            TimerState::Dormant => None,
            TimerState::Running { remaining } | TimerState::Stopped { remaining } => {
                Some(remaining)
            }
            TimerState::Expired => Some(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_stays_dormant() {
        let mut timer = TimerCoordinator::new();
        assert_eq!(timer.arm(None), None);
        assert_eq!(timer.arm(Some(0)), None);
        assert!(!timer.is_running());
        assert_eq!(timer.remaining_secs(), None);
    }

    #[test]
    fn counts_down_and_expires_once() {
        let mut timer = TimerCoordinator::new();
        let generation = timer.arm(Some(3)).unwrap();

        assert_eq!(timer.tick(generation), TickOutcome::Running { remaining: 2 });
        assert_eq!(timer.tick(generation), TickOutcome::Running { remaining: 1 });
        assert_eq!(timer.tick(generation), TickOutcome::Expired);
        assert_eq!(timer.tick(generation), TickOutcome::Ignored);
        assert!(timer.has_expired());
        assert_eq!(timer.remaining_secs(), Some(0));
    }

    #[test]
    fn disarm_after_expiry_does_not_fire_again() {
        let mut timer = TimerCoordinator::new();
        let generation = timer.arm(Some(1)).unwrap();
        assert_eq!(timer.tick(generation), TickOutcome::Expired);

        timer.disarm();
        assert_eq!(timer.tick(generation), TickOutcome::Ignored);
        assert!(timer.has_expired());
    }

    #[test]
    fn ticks_after_disarm_are_dropped() {
        let mut timer = TimerCoordinator::new();
        let generation = timer.arm(Some(10)).unwrap();
        timer.tick(generation);
        timer.disarm();

        assert_eq!(timer.tick(generation), TickOutcome::Ignored);
        assert_eq!(timer.remaining_secs(), Some(9));
        assert!(!timer.is_running());
    }

    #[test]
    fn rearming_invalidates_old_generation() {
        let mut timer = TimerCoordinator::new();
        let old = timer.arm(Some(5)).unwrap();
        let new = timer.arm(Some(5)).unwrap();

        assert_ne!(old, new);
        assert_eq!(timer.tick(old), TickOutcome::Ignored);
        assert_eq!(timer.tick(new), TickOutcome::Running { remaining: 4 });
    }
}
