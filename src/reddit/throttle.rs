use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Spaces out upstream requests by a minimum interval.
///
/// Share one instance (behind an `Arc`) between every client that uses the
/// same credentials, including clients belonging to concurrent runs.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait until this caller may issue a request
    pub async fn acquire(&self) {
        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = match *next {
                Some(t) if t > now => t,
                _ => now,
            };
            *next = Some(slot + self.min_interval);
            slot
        };
        sleep_until(slot).await;
    }
}
