use std::time::{Duration, Instant};

/// Fixed-period reload trigger polled from the session loop.
///
/// Fires on every period regardless of whether the config file changed.
#[derive(Debug, Clone)]
pub struct RefreshTimer {
    interval: Duration,
    next_due: Instant,
}

impl RefreshTimer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            next_due: now + interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true once per elapsed period and schedules the next one
    /// relative to `now`, so a stalled loop does not fire a burst.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due = now + self.interval;
        true
    }

    /// Restarts the period, used after an explicit reload.
    pub fn reset(&mut self, now: Instant) {
        self.next_due = now + self.interval;
    }

    pub fn time_until_due(&self, now: Instant) -> Duration {
        self.next_due.saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_period() {
        let start = Instant::now();
        let mut timer = RefreshTimer::new(Duration::from_secs(60), start);
        assert_eq!(timer.interval(), Duration::from_secs(60));
        assert!(!timer.poll(start));
        assert!(!timer.poll(start + Duration::from_secs(59)));
        assert!(timer.poll(start + Duration::from_secs(60)));
        assert!(!timer.poll(start + Duration::from_secs(61)));
        assert!(timer.poll(start + Duration::from_secs(120)));
    }

    #[test]
    fn late_poll_does_not_burst() {
        let start = Instant::now();
        let mut timer = RefreshTimer::new(Duration::from_secs(60), start);
        let late = start + Duration::from_secs(600);
        assert!(timer.poll(late));
        assert!(!timer.poll(late + Duration::from_secs(1)));
        assert_eq!(timer.time_until_due(late), Duration::from_secs(60));
    }

    #[test]
    fn reset_pushes_next_firing() {
        let start = Instant::now();
        let mut timer = RefreshTimer::new(Duration::from_secs(60), start);
        timer.reset(start + Duration::from_secs(50));
        assert!(!timer.poll(start + Duration::from_secs(60)));
        assert!(timer.poll(start + Duration::from_secs(110)));
    }
}
