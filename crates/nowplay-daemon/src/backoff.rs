/// Retry-delay controller for the upstream polls.
///
/// The delay doubles on each failure up to a cap, so repeated outages never
/// turn into a retry storm against a rate-limited API, and the cap bounds
/// worst-case staleness to one minute.  A server-provided hint (Retry-After)
/// overrides the exponential path.  Any definitive upstream response resets
/// the delay to the floor.
#[derive(Debug)]
pub struct Backoff {
    delay_ms: u64,
    floor_ms: u64,
    cap_ms: u64,
}

/// What the reconciler tells the controller after each poll.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffSignal {
    /// Got a definitive response — reset to the floor.
    Success,
    /// Transient failure.  `hint_ms` carries a server-requested wait when the
    /// upstream sent one (rate limiting); otherwise the delay doubles.
    Failure { hint_ms: Option<u64> },
}

impl Backoff {
    pub fn new(floor_ms: u64, cap_ms: u64) -> Self {
        Self {
            delay_ms: floor_ms,
            floor_ms,
            cap_ms,
        }
    }

    /// Returns the delay to wait before the next attempt.
    pub fn on_failure(&mut self, hint_ms: Option<u64>) -> u64 {
        self.delay_ms = match hint_ms {
            // Honor the server's wait, but the cap still bounds staleness.
            Some(hint) => hint.min(self.cap_ms),
            None => (self.delay_ms.saturating_mul(2)).min(self.cap_ms),
        };
        self.delay_ms
    }

    pub fn on_success(&mut self) {
        self.delay_ms = self.floor_ms;
    }

    pub fn apply(&mut self, signal: &BackoffSignal) {
        match signal {
            BackoffSignal::Success => self.on_success(),
            BackoffSignal::Failure { hint_ms } => {
                self.on_failure(*hint_ms);
            }
        }
    }

    pub fn current_delay_ms(&self) -> u64 {
        self.delay_ms
    }

    /// True while an outstanding penalty should override the base poll
    /// interval.
    pub fn is_penalized(&self) -> bool {
        self.delay_ms > self.floor_ms
    }
}
