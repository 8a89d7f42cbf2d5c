use std::time::{Duration, Instant};

/// A wall-clock countdown. With no limit it never expires.
pub struct CountdownTimer {
    start: Instant,
    limit: Option<Duration>,
}

impl CountdownTimer {
    pub fn new(limit: Option<Duration>) -> Self {
        CountdownTimer {
            start: Instant::now(),
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        match self.limit {
            Some(limit) => self.start.elapsed() >= limit,
            None => false,
        }
    }
}

/// Accumulates wall-clock time over several resume/stop intervals.
/// Used to attribute loop time to its phases.
#[derive(Default)]
pub struct Stopwatch {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resume(&mut self) {
        debug_assert!(self.running_since.is_none());
        self.running_since = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += since.elapsed();
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self.running_since {
            Some(since) => self.accumulated + since.elapsed(),
            None => self.accumulated,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_countdown_without_limit() {
        let timer = CountdownTimer::new(None);
        assert!(!timer.is_expired());
    }

    #[test]
    fn test_countdown_with_zero_limit() {
        let timer = CountdownTimer::new(Some(Duration::from_secs(0)));
        assert!(timer.is_expired());
    }

    #[test]
    fn test_stopwatch_accumulates() {
        let mut watch = Stopwatch::new();
        assert_eq!(watch.elapsed(), Duration::ZERO);
        watch.resume();
        watch.stop();
        watch.resume();
        watch.stop();
        assert!(watch.elapsed() < Duration::from_secs(1));
    }
}
