use chrono::{DateTime, Utc};

/// Wall-clock access behind a trait so staleness checks and interpolation can
/// run against a manual clock in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
