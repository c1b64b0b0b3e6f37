use std::time::Duration;

pub const BACKOFF_INITIAL: Duration = Duration::from_millis(1000);
pub const BACKOFF_FACTOR: f64 = 1.5;
pub const BACKOFF_MAX: Duration = Duration::from_millis(10_000);

/// Exponential reconnect delay: 1000ms, x1.5 per failure, capped at 10s
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    factor: f64,
    max: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, factor: f64, max: Duration) -> Self {
        Self {
            initial,
            factor,
            max,
            next: initial,
        }
    }

    /// Delay to wait now; the following one grows.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        let grown = Duration::from_secs_f64(self.next.as_secs_f64() * self.factor);
        self.next = grown.min(self.max);
        delay
    }

    /// Call on a successful open
    pub fn reset(&mut self) {
        self.next = self.initial;
    }

    pub fn peek(&self) -> Duration {
        self.next
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BACKOFF_INITIAL, BACKOFF_FACTOR, BACKOFF_MAX)
    }
}

/// How a client waits between connection cycles
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    Fixed(Duration),
    Exponential(Backoff),
}

impl RetryPolicy {
    pub fn next_delay(&mut self) -> Duration {
        match self {
            RetryPolicy::Fixed(delay) => *delay,
            RetryPolicy::Exponential(backoff) => backoff.next_delay(),
        }
    }

    pub fn reset(&mut self) {
        if let RetryPolicy::Exponential(backoff) = self {
            backoff.reset();
        }
    }
}
