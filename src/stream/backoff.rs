use std::time::Duration;

/// Reconnect delay schedule for the stream client.
///
/// Delays double after every consecutive failure up to `max`. A successful
/// connect resets both the delay and the attempt counter.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
    max_attempts: u32,
}

impl Backoff {
    /// `max_attempts == 0` means retry forever.
    pub fn new(initial_ms: u64, max_ms: u64, max_attempts: u32) -> Self {
        let initial = Duration::from_millis(initial_ms);
        let max = Duration::from_millis(max_ms.max(initial_ms));
        Self {
            initial,
            max,
            current: initial,
            attempts: 0,
            max_attempts,
        }
    }

    /// Records a failure and returns how long to wait before the next
    /// attempt, or `None` once the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.max_attempts != 0 && self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        Some(delay)
    }

    /// Reset after a successful connect.
    pub fn mark_success(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }

    /// Applies a server-sent `retry:` hint as the new base delay.
    ///
    /// The hint never raises the configured `max`.
    pub fn set_initial(&mut self, initial: Duration) {
        let initial = initial.min(self.max);
        self.initial = initial;
        self.current = initial;
    }

    /// Consecutive failures since the last successful connect.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_max() {
        let mut backoff = Backoff::new(100, 500, 0);
        let delays: Vec<u64> = (0..5)
            .map(|_| backoff.next_delay().unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn test_backoff_budget_and_reset() {
        let mut backoff = Backoff::new(10, 1000, 2);
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_none());
        assert_eq!(backoff.attempts(), 2);

        backoff.mark_success();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_zero_initial_allows_immediate_retry() {
        let mut backoff = Backoff::new(0, 0, 3);
        assert_eq!(backoff.next_delay(), Some(Duration::ZERO));
        assert_eq!(backoff.next_delay(), Some(Duration::ZERO));
    }

    #[test]
    fn test_retry_hint_replaces_base_delay() {
        let mut backoff = Backoff::new(100, 5000, 0);
        backoff.set_initial(Duration::from_millis(3000));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(3000)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(5000)));

        backoff.mark_success();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(3000)));
    }

    #[test]
    fn test_retry_hint_is_clamped_to_max() {
        let mut backoff = Backoff::new(1000, 30_000, 0);
        backoff.set_initial(Duration::from_secs(86_400));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(30)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(30)));
    }
}
