//! Timeout utilities, used by the race engine to bound the overall deadline.

use std::time::{Duration, Instant};

/// If the deadline is in the future, return the remaining time until then.
/// Otherwise return `None`, meaning the deadline has already passed.
pub(crate) fn time_until_deadline(deadline: Instant) -> Option<Duration> {
    let now = Instant::now();
    deadline.checked_duration_since(now)
}
