use std::time::Duration;

/// Decides how long to wait before reconnect attempt number `attempt`
/// (starting at 1). `None` means stop trying.
pub trait ReconnectPolicy: Send + 'static {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration>;
}

impl ReconnectPolicy for Box<dyn ReconnectPolicy> {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        (**self).next_delay(attempt)
    }
}

#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&mut self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }

        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        Some(self.initial.saturating_mul(factor).min(self.max))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NeverReconnect;

impl ReconnectPolicy for NeverReconnect {
    fn next_delay(&mut self, _attempt: u32) -> Option<Duration> {
        None
    }
}
