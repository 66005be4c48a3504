//! Monotonic millisecond timestamps for mutation ordering.
use std::cmp::max;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Returns the current time in milliseconds since the Unix epoch.
pub fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as u64
}

/// Returns a monotonically increasing timestamp: the current time if it is
/// greater than `most_recent`, otherwise `most_recent` itself. Used so that a
/// clock that runs backward (or a dense write burst within one millisecond)
/// can never produce a `ts` smaller than a previously issued one (I3).
pub fn timestamp_now_monotonic(most_recent: u64) -> u64 {
    max(most_recent, timestamp_now())
}

/// A process-local monotonic clock shared by every write against one
/// collection, so that sequenced writes are always totally ordered (I3, P2)
/// even when the wall clock does not advance between them.
#[derive(Default)]
pub struct MonotonicClock {
    latest: Mutex<u64>,
}

impl MonotonicClock {
    /// Creates a clock initialized to `latest` (typically the highest `ts`
    /// observed while replaying a collection's existing mutations/snapshot).
    pub fn starting_at(latest: u64) -> Self {
        Self {
            latest: Mutex::new(latest),
        }
    }

    /// Returns the next timestamp, strictly greater than every timestamp
    /// previously returned by this clock.
    pub async fn next(&self) -> u64 {
        let mut latest = self.latest.lock().await;
        let next = timestamp_now_monotonic(*latest).max(*latest + 1);
        *latest = next;
        next
    }

    /// Returns the most recent timestamp issued so far (0 if none yet).
    pub async fn latest(&self) -> u64 {
        *self.latest.lock().await
    }

    /// Records an externally observed timestamp (e.g. from a freshly loaded
    /// snapshot) as a lower bound for future calls to [`MonotonicClock::next`].
    pub async fn observe(&self, ts: u64) {
        let mut latest = self.latest.lock().await;
        *latest = max(*latest, ts);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn next_is_strictly_increasing() {
        let clock = MonotonicClock::default();
        let mut last = 0;
        for _ in 0..1000 {
            let ts = clock.next().await;
            assert!(ts > last);
            last = ts;
        }
    }

    #[tokio::test]
    async fn observe_raises_the_floor() {
        let clock = MonotonicClock::default();
        clock.observe(timestamp_now() + 1_000_000).await;
        let ts = clock.next().await;
        assert!(ts > timestamp_now());
    }
}
