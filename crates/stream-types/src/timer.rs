//! Task-owned one-shot timers.

use std::future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Sleep;

/// A one-shot timer owned by a task loop. Dropping it cancels it.
pub type Timer = Option<Pin<Box<Sleep>>>;

pub fn arm(delay: Duration) -> Timer {
    Some(Box::pin(tokio::time::sleep(delay)))
}

/// Resolves when the timer elapses; pending forever while unset.
pub async fn fire(timer: &mut Timer) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}

/// Whole milliseconds of `duration` for log fields, saturating.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{self, Instant};

    #[tokio::test(start_paused = true)]
    async fn test_armed_timer_fires_after_delay() {
        let start = Instant::now();
        let mut timer = arm(Duration::from_millis(1500));
        fire(&mut timer).await;
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unset_timer_never_fires() {
        let mut timer: Timer = None;
        let fired = time::timeout(Duration::from_secs(60), fire(&mut timer)).await;
        assert!(fired.is_err());
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(10_000)), 10_000);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
